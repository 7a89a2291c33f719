//! Core types for the adapter seam

use serde::{Deserialize, Serialize};
use std::fmt;
use switchyard_config::ProviderConfig;
use switchyard_runner::{CommandSpec, ProcessOutput};
use switchyard_utils::Task;
use thiserror::Error;

/// Model name reported when neither the config nor the output names one.
pub const DEFAULT_MODEL_LABEL: &str = "default";

/// Why a provider invocation failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureKind {
    /// Credentials missing, expired or rejected.
    Auth,
    /// Rate limit or usage quota exhausted.
    Quota,
    /// Provider-side outage or network failure.
    Outage,
    /// Non-zero exit or signal with no better explanation.
    Crash,
    /// The CLI rejected its arguments or model.
    Misconfigured,
    /// Exit was clean but the output could not be understood.
    Malformed,
    /// The process could not be started.
    Spawn,
    /// The task payload cannot be turned into a prompt.
    InvalidPayload,
}

impl FailureKind {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Auth => "auth",
            Self::Quota => "quota",
            Self::Outage => "outage",
            Self::Crash => "crash",
            Self::Misconfigured => "misconfigured",
            Self::Malformed => "malformed",
            Self::Spawn => "spawn",
            Self::InvalidPayload => "invalid-payload",
        }
    }

    /// Whether another attempt (possibly on another provider) can help.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        !matches!(self, Self::InvalidPayload)
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classified failure from building an invocation or reading its output.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct AdapterError {
    pub kind: FailureKind,
    /// Already redacted and truncated.
    pub message: String,
    pub exit_code: Option<i32>,
}

impl AdapterError {
    #[must_use]
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            exit_code: None,
        }
    }

    #[must_use]
    pub fn with_exit_code(mut self, exit_code: Option<i32>) -> Self {
        self.exit_code = exit_code;
        self
    }
}

/// A fully specified child process for one task or probe.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub command: CommandSpec,
    /// Written to the child's stdin and then closed.
    pub stdin: Option<String>,
    /// Model the invocation asks for.
    pub model: String,
}

impl Invocation {
    #[must_use]
    pub fn new(command: CommandSpec, model: impl Into<String>) -> Self {
        Self {
            command,
            stdin: None,
            model: model.into(),
        }
    }

    #[must_use]
    pub fn with_stdin(mut self, stdin: impl Into<String>) -> Self {
        self.stdin = Some(stdin.into());
        self
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input: Option<u64>,
    pub output: Option<u64>,
}

/// Successful, parsed provider output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdapterOutput {
    pub text: String,
    /// Model that actually answered, when the output says so.
    pub model: String,
    pub tokens: Option<TokenUsage>,
}

impl AdapterOutput {
    #[must_use]
    pub fn text(text: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            model: model.into(),
            tokens: None,
        }
    }
}

/// Knows how to drive one kind of provider CLI.
pub trait ProviderAdapter: Send + Sync + fmt::Debug {
    /// Adapter kind as written in configuration (`claude-cli`, ...).
    fn kind(&self) -> &'static str;

    /// Build the child process for `task`.
    fn build_invocation(
        &self,
        task: &Task,
        config: &ProviderConfig,
    ) -> Result<Invocation, AdapterError>;

    /// Cheapest invocation that proves the provider is reachable.
    fn probe_invocation(&self, config: &ProviderConfig) -> Invocation {
        let args = if config.probe_args.is_empty() {
            vec!["--version".to_string()]
        } else {
            config.probe_args.clone()
        };
        let command = CommandSpec::new(&config.binary)
            .args(args)
            .envs(config.invocation_env());
        Invocation::new(command, model_label(config))
    }

    /// Interpret a finished process. Non-zero exits are classified failures.
    fn parse_output(
        &self,
        output: &ProcessOutput,
        model: &str,
    ) -> Result<AdapterOutput, AdapterError> {
        if !output.success() {
            return Err(crate::classify::classify_output(output));
        }
        Ok(AdapterOutput::text(output.stdout.trim_end(), model))
    }
}

/// The configured model, or [`DEFAULT_MODEL_LABEL`].
pub(crate) fn model_label(config: &ProviderConfig) -> String {
    config
        .default_model
        .clone()
        .unwrap_or_else(|| DEFAULT_MODEL_LABEL.to_string())
}
