use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;
use switchyard_utils::Priority;

/// Adapter kinds understood by the provider registry.
pub const KNOWN_ADAPTERS: &[&str] = &["claude-cli", "gemini-cli", "command"];

/// Where the effective configuration came from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ConfigSource {
    #[default]
    Defaults,
    File(PathBuf),
    Programmatic,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Defaults => write!(f, "defaults"),
            Self::File(path) => write!(f, "{}", path.display()),
            Self::Programmatic => write!(f, "programmatic"),
        }
    }
}

/// Complete switchyard configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub orchestrator: OrchestratorSection,
    pub retry: RetrySection,
    pub circuit_breaker: CircuitBreakerSection,
    pub health: HealthSection,
    pub queues: QueuesSection,
    /// Provider definitions. A file that declares `[providers]` replaces the
    /// built-in set entirely.
    pub providers: BTreeMap<String, ProviderSection>,
    /// Per-provider affinity overrides keyed by task type (`code-generation = 7.5`).
    pub affinity: BTreeMap<String, BTreeMap<String, f64>>,
    #[serde(skip)]
    pub source: ConfigSource,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            orchestrator: OrchestratorSection::default(),
            retry: RetrySection::default(),
            circuit_breaker: CircuitBreakerSection::default(),
            health: HealthSection::default(),
            queues: QueuesSection::default(),
            providers: builtin_providers(),
            affinity: BTreeMap::new(),
            source: ConfigSource::Defaults,
        }
    }
}

impl Config {
    /// Provider pool in registration order.
    ///
    /// Uses `[orchestrator].providers` when present, otherwise every
    /// `[providers.*]` section in name order. Registration order is also the
    /// load balancer's tie-break order.
    #[must_use]
    pub fn provider_names(&self) -> Vec<String> {
        match &self.orchestrator.providers {
            Some(names) => names.clone(),
            None => self.providers.keys().cloned().collect(),
        }
    }

    #[must_use]
    pub fn provider(&self, name: &str) -> Option<&ProviderSection> {
        self.providers.get(name)
    }

    #[must_use]
    pub fn default_timeout(&self) -> Duration {
        Duration::from_secs(self.orchestrator.default_timeout_secs)
    }

    #[must_use]
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.orchestrator.shutdown_grace_secs)
    }
}

fn builtin_providers() -> BTreeMap<String, ProviderSection> {
    let mut providers = BTreeMap::new();
    providers.insert(
        "claude".to_string(),
        ProviderSection {
            adapter: Some("claude-cli".to_string()),
            binary: Some("claude".to_string()),
            default_model: Some("sonnet".to_string()),
            ..ProviderSection::default()
        },
    );
    providers.insert(
        "gemini".to_string(),
        ProviderSection {
            adapter: Some("gemini-cli".to_string()),
            binary: Some("gemini".to_string()),
            default_model: Some("gemini-2.5-flash".to_string()),
            free_tier: true,
            ..ProviderSection::default()
        },
    );
    providers.insert(
        "codex".to_string(),
        ProviderSection {
            adapter: Some("command".to_string()),
            binary: Some("codex".to_string()),
            args: vec!["exec".to_string(), "{prompt}".to_string()],
            probe_args: vec!["--version".to_string()],
            ..ProviderSection::default()
        },
    );
    providers
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct OrchestratorSection {
    pub providers: Option<Vec<String>>,
    pub default_timeout_secs: u64,
    pub shutdown_grace_secs: u64,
    pub batch_max_concurrent: usize,
}

impl Default for OrchestratorSection {
    fn default() -> Self {
        Self {
            providers: None,
            default_timeout_secs: 120,
            shutdown_grace_secs: 5,
            batch_max_concurrent: 4,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetrySection {
    /// Total attempts including the first one.
    pub attempts: u32,
    pub factor: f64,
    pub min_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub jitter: bool,
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            attempts: 3,
            factor: 2.0,
            min_backoff_ms: 1000,
            max_backoff_ms: 5000,
            jitter: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct CircuitBreakerSection {
    pub failure_threshold: u32,
    pub reset_timeout_secs: u64,
    pub success_threshold: u32,
}

impl Default for CircuitBreakerSection {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout_secs: 60,
            success_threshold: 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct HealthSection {
    pub enabled: bool,
    pub interval_secs: u64,
    pub probe_timeout_secs: u64,
    pub healthy_threshold: u32,
    pub unhealthy_threshold: u32,
}

impl Default for HealthSection {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 30,
            probe_timeout_secs: 10,
            healthy_threshold: 2,
            unhealthy_threshold: 3,
        }
    }
}

/// Overrides for one priority queue; unset fields fall back to that
/// priority's defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct QueueSection {
    pub concurrency: Option<usize>,
    pub interval_cap: Option<u32>,
    pub interval_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct QueuesSection {
    pub high: QueueSection,
    pub normal: QueueSection,
    pub low: QueueSection,
}

/// Effective admission limits for one priority queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueLimits {
    /// Tasks of this priority allowed to run at once.
    pub concurrency: usize,
    /// Admissions allowed per `interval`.
    pub interval_cap: u32,
    pub interval: Duration,
}

impl QueueLimits {
    #[must_use]
    pub const fn default_for(priority: Priority) -> Self {
        match priority {
            Priority::High => Self {
                concurrency: 5,
                interval_cap: 10,
                interval: Duration::from_millis(1000),
            },
            Priority::Normal => Self {
                concurrency: 3,
                interval_cap: 5,
                interval: Duration::from_millis(1000),
            },
            Priority::Low => Self {
                concurrency: 1,
                interval_cap: 2,
                interval: Duration::from_millis(2000),
            },
        }
    }
}

impl QueuesSection {
    #[must_use]
    pub fn section(&self, priority: Priority) -> &QueueSection {
        match priority {
            Priority::High => &self.high,
            Priority::Normal => &self.normal,
            Priority::Low => &self.low,
        }
    }

    pub(crate) fn section_mut(&mut self, priority: Priority) -> &mut QueueSection {
        match priority {
            Priority::High => &mut self.high,
            Priority::Normal => &mut self.normal,
            Priority::Low => &mut self.low,
        }
    }

    #[must_use]
    pub fn limits(&self, priority: Priority) -> QueueLimits {
        let defaults = QueueLimits::default_for(priority);
        let section = self.section(priority);
        QueueLimits {
            concurrency: section.concurrency.unwrap_or(defaults.concurrency),
            interval_cap: section.interval_cap.unwrap_or(defaults.interval_cap),
            interval: section
                .interval_ms
                .map_or(defaults.interval, Duration::from_millis),
        }
    }
}

/// One `[providers.<name>]` section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProviderSection {
    /// Adapter kind; inferred from the provider name when omitted.
    pub adapter: Option<String>,
    /// Executable name or path; defaults to the provider name.
    pub binary: Option<String>,
    pub default_model: Option<String>,
    pub base_url: Option<String>,
    /// Environment variable holding the credential, if the CLI needs one.
    pub api_key_env: Option<String>,
    pub free_tier: bool,
    pub env: BTreeMap<String, String>,
    /// Argument template for the `command` adapter.
    pub args: Vec<String>,
    /// Arguments for the health probe invocation.
    pub probe_args: Vec<String>,
}

impl ProviderSection {
    /// Section for a generic templated command.
    #[must_use]
    pub fn command<I, S>(binary: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            adapter: Some("command".to_string()),
            binary: Some(binary.into()),
            args: args.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_adapter(mut self, adapter: impl Into<String>) -> Self {
        self.adapter = Some(adapter.into());
        self
    }

    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = Some(model.into());
        self
    }

    #[must_use]
    pub fn with_api_key_env(mut self, var: impl Into<String>) -> Self {
        self.api_key_env = Some(var.into());
        self
    }

    #[must_use]
    pub fn with_free_tier(mut self, free_tier: bool) -> Self {
        self.free_tier = free_tier;
        self
    }

    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_probe_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.probe_args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Adapter kind for provider `name`.
    #[must_use]
    pub fn adapter_kind(&self, name: &str) -> String {
        if let Some(adapter) = &self.adapter {
            return adapter.clone();
        }
        match name {
            "claude" => "claude-cli".to_string(),
            "gemini" => "gemini-cli".to_string(),
            _ => "command".to_string(),
        }
    }

    #[must_use]
    pub fn binary_or<'a>(&'a self, name: &'a str) -> &'a str {
        self.binary.as_deref().unwrap_or(name)
    }
}
