//! Dispatch error taxonomy.

use serde::Serialize;
use switchyard_providers::{AdapterError, FailureKind};
use switchyard_utils::{ErrorCategory, TaskValidationError, UserFriendlyError};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DispatchError {
    #[error("Invalid task: {reason}")]
    Validation { reason: String },

    #[error("Orchestrator is not initialized")]
    NotInitialized,

    #[error("{}", no_healthy_message(.requested.as_deref()))]
    NoHealthyProvider { requested: Option<String> },

    #[error("Task timed out after {timeout_ms}ms on provider '{provider}'")]
    TaskTimeout { provider: String, timeout_ms: u64 },

    #[error("Provider '{provider}' failed ({failure}): {message}")]
    ProviderExecution {
        provider: String,
        failure: FailureKind,
        message: String,
        exit_code: Option<i32>,
    },

    #[error("No provider could be registered (rejected: {})", .rejected.join(", "))]
    EmptyPool { rejected: Vec<String> },

    #[error("Orchestrator is shutting down")]
    Shutdown,
}

fn no_healthy_message(requested: Option<&str>) -> String {
    match requested {
        Some(name) => format!("Provider '{name}' is unhealthy or its circuit is open"),
        None => "No healthy provider available".to_string(),
    }
}

impl DispatchError {
    pub(crate) fn validation(reason: impl Into<String>) -> Self {
        Self::Validation {
            reason: reason.into(),
        }
    }

    pub(crate) fn from_adapter(provider: &str, err: AdapterError) -> Self {
        Self::ProviderExecution {
            provider: provider.to_string(),
            failure: err.kind,
            message: err.message,
            exit_code: err.exit_code,
        }
    }

    /// Whether the retry loop may try again after this error.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::TaskTimeout { .. } | Self::NoHealthyProvider { .. } => true,
            Self::ProviderExecution { failure, .. } => failure.is_retryable(),
            Self::Validation { .. }
            | Self::NotInitialized
            | Self::EmptyPool { .. }
            | Self::Shutdown => false,
        }
    }

    /// Whether this failure says something about the provider's health.
    /// A payload the adapter cannot render is the caller's fault.
    #[must_use]
    pub fn counts_against_provider(&self) -> bool {
        !matches!(
            self,
            Self::Shutdown
                | Self::ProviderExecution {
                    failure: FailureKind::InvalidPayload,
                    ..
                }
        )
    }
}

impl From<TaskValidationError> for DispatchError {
    fn from(err: TaskValidationError) -> Self {
        Self::validation(err.to_string())
    }
}

impl UserFriendlyError for DispatchError {
    fn user_message(&self) -> String {
        self.to_string()
    }

    fn context(&self) -> Option<String> {
        match self {
            Self::ProviderExecution {
                exit_code: Some(code),
                ..
            } => Some(format!("Exit code: {code}")),
            Self::EmptyPool { rejected } if !rejected.is_empty() => Some(format!(
                "{} configured provider(s) failed validation",
                rejected.len()
            )),
            _ => None,
        }
    }

    fn suggestions(&self) -> Vec<String> {
        match self {
            Self::Validation { .. } => vec![
                "Priorities are high, normal or low".to_string(),
                "Payloads must be a string or an object with a 'prompt' field".to_string(),
            ],
            Self::NotInitialized => vec!["Call initialize() before submitting tasks".to_string()],
            Self::NoHealthyProvider { .. } => vec![
                "Run 'switchyard status --probe' to see provider health".to_string(),
                "Wait for open circuits to reach their reset timeout".to_string(),
            ],
            Self::TaskTimeout { .. } => {
                vec!["Increase the task timeout or split the task".to_string()]
            }
            Self::ProviderExecution { failure, .. } => match failure {
                FailureKind::Auth => vec!["Check the provider's API key variable".to_string()],
                FailureKind::Quota => vec!["Wait for the rate limit window to pass".to_string()],
                FailureKind::Spawn | FailureKind::Misconfigured => vec![
                    "Check the provider binary and arguments in [providers.*]".to_string(),
                ],
                _ => vec!["Retry later or route to another provider".to_string()],
            },
            Self::EmptyPool { .. } => vec![
                "Install at least one provider CLI and put it on PATH".to_string(),
                "Export the credential variables named by api_key_env".to_string(),
            ],
            Self::Shutdown => Vec::new(),
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Validation { .. } => ErrorCategory::Validation,
            Self::NotInitialized | Self::Shutdown => ErrorCategory::Lifecycle,
            Self::NoHealthyProvider { .. } | Self::EmptyPool { .. } => {
                ErrorCategory::ProviderAvailability
            }
            Self::TaskTimeout { .. } => ErrorCategory::ResourceLimits,
            Self::ProviderExecution { .. } => ErrorCategory::ProviderExecution,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryability() {
        assert!(
            DispatchError::TaskTimeout {
                provider: "p".into(),
                timeout_ms: 50
            }
            .is_retryable()
        );
        assert!(!DispatchError::Shutdown.is_retryable());
        assert!(
            !DispatchError::ProviderExecution {
                provider: "p".into(),
                failure: FailureKind::InvalidPayload,
                message: "no prompt".into(),
                exit_code: None,
            }
            .is_retryable()
        );
    }

    #[test]
    fn test_invalid_payload_does_not_count_against_provider() {
        let invalid = DispatchError::ProviderExecution {
            provider: "p".into(),
            failure: FailureKind::InvalidPayload,
            message: "no prompt".into(),
            exit_code: None,
        };
        let crash = DispatchError::ProviderExecution {
            provider: "p".into(),
            failure: FailureKind::Crash,
            message: "exit 1".into(),
            exit_code: Some(1),
        };
        assert!(!invalid.counts_against_provider());
        assert!(crash.counts_against_provider());
        assert!(
            DispatchError::TaskTimeout {
                provider: "p".into(),
                timeout_ms: 50
            }
            .counts_against_provider()
        );
    }

    #[test]
    fn test_serializes_with_kind_tag() {
        let json = serde_json::to_value(DispatchError::TaskTimeout {
            provider: "claude".into(),
            timeout_ms: 50,
        })
        .unwrap();
        assert_eq!(json["kind"], "task_timeout");
        assert_eq!(json["timeout_ms"], 50);
    }

    #[test]
    fn test_no_healthy_message_names_provider() {
        let err = DispatchError::NoHealthyProvider {
            requested: Some("gemini".into()),
        };
        assert!(err.to_string().contains("gemini"));
        assert_eq!(err.category(), ErrorCategory::ProviderAvailability);
    }
}
