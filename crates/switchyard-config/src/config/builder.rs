use std::collections::BTreeMap;
use std::time::Duration;
use switchyard_utils::{Priority, TaskType};

use super::{Config, ConfigSource, ProviderSection, QueueSection};
use crate::error::ConfigError;

impl Config {
    /// Create a builder for programmatic configuration.
    ///
    /// The builder starts from the built-in defaults but with an empty
    /// provider set, so embedders declare exactly the providers they run.
    ///
    /// ```rust
    /// use switchyard_config::{Config, ProviderSection};
    /// use std::time::Duration;
    ///
    /// let config = Config::builder()
    ///     .provider("local", ProviderSection::command("my-llm", ["--prompt", "{prompt}"]))
    ///     .retry_attempts(2)
    ///     .health_interval(Duration::from_secs(5))
    ///     .build()
    ///     .expect("valid config");
    /// assert_eq!(config.provider_names(), vec!["local"]);
    /// ```
    #[must_use]
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::new()
    }
}

/// Fluent construction of a [`Config`] without files or environment.
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    config: Config,
    order: Vec<String>,
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigBuilder {
    #[must_use]
    pub fn new() -> Self {
        let config = Config {
            providers: BTreeMap::new(),
            source: ConfigSource::Programmatic,
            ..Config::default()
        };
        Self {
            config,
            order: Vec::new(),
        }
    }

    /// Register a provider. Registration order is the candidate order.
    #[must_use]
    pub fn provider(mut self, name: impl Into<String>, section: ProviderSection) -> Self {
        let name = name.into();
        if !self.order.contains(&name) {
            self.order.push(name.clone());
        }
        self.config.providers.insert(name, section);
        self
    }

    #[must_use]
    pub fn default_timeout(mut self, timeout: Duration) -> Self {
        self.config.orchestrator.default_timeout_secs = timeout.as_secs();
        self
    }

    #[must_use]
    pub fn shutdown_grace(mut self, grace: Duration) -> Self {
        self.config.orchestrator.shutdown_grace_secs = grace.as_secs();
        self
    }

    #[must_use]
    pub fn batch_max_concurrent(mut self, n: usize) -> Self {
        self.config.orchestrator.batch_max_concurrent = n;
        self
    }

    #[must_use]
    pub fn retry_attempts(mut self, attempts: u32) -> Self {
        self.config.retry.attempts = attempts;
        self
    }

    #[must_use]
    pub fn backoff(mut self, min: Duration, max: Duration, factor: f64) -> Self {
        self.config.retry.min_backoff_ms = min.as_millis() as u64;
        self.config.retry.max_backoff_ms = max.as_millis() as u64;
        self.config.retry.factor = factor;
        self
    }

    #[must_use]
    pub fn jitter(mut self, enabled: bool) -> Self {
        self.config.retry.jitter = enabled;
        self
    }

    #[must_use]
    pub fn circuit_breaker(
        mut self,
        failure_threshold: u32,
        reset_timeout: Duration,
        success_threshold: u32,
    ) -> Self {
        self.config.circuit_breaker.failure_threshold = failure_threshold;
        self.config.circuit_breaker.reset_timeout_secs = reset_timeout.as_secs();
        self.config.circuit_breaker.success_threshold = success_threshold;
        self
    }

    #[must_use]
    pub fn health_enabled(mut self, enabled: bool) -> Self {
        self.config.health.enabled = enabled;
        self
    }

    #[must_use]
    pub fn health_interval(mut self, interval: Duration) -> Self {
        self.config.health.interval_secs = interval.as_secs().max(1);
        self
    }

    #[must_use]
    pub fn probe_timeout(mut self, timeout: Duration) -> Self {
        self.config.health.probe_timeout_secs = timeout.as_secs().max(1);
        self
    }

    #[must_use]
    pub fn health_thresholds(mut self, healthy: u32, unhealthy: u32) -> Self {
        self.config.health.healthy_threshold = healthy;
        self.config.health.unhealthy_threshold = unhealthy;
        self
    }

    #[must_use]
    pub fn queue(
        mut self,
        priority: Priority,
        concurrency: usize,
        interval_cap: u32,
        interval: Duration,
    ) -> Self {
        *self.config.queues.section_mut(priority) = QueueSection {
            concurrency: Some(concurrency),
            interval_cap: Some(interval_cap),
            interval_ms: Some(interval.as_millis() as u64),
        };
        self
    }

    #[must_use]
    pub fn affinity(mut self, provider: impl Into<String>, task_type: TaskType, bonus: f64) -> Self {
        self.config
            .affinity
            .entry(provider.into())
            .or_default()
            .insert(task_type.as_str().to_string(), bonus);
        self
    }

    /// Validate and produce the configuration.
    pub fn build(mut self) -> Result<Config, ConfigError> {
        if !self.order.is_empty() {
            self.config.orchestrator.providers = Some(self.order);
        }
        self.config.validate()?;
        Ok(self.config)
    }
}
