use std::path::PathBuf;
use switchyard_utils::{ErrorCategory, UserFriendlyError};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Invalid configuration value for '{key}': {value}")]
    InvalidValue { key: String, value: String },

    #[error("Configuration file not found: {}", path.display())]
    NotFound { path: PathBuf },

    #[error("Failed to parse configuration file {}: {reason}", path.display())]
    Parse { path: PathBuf, reason: String },

    #[error("Unknown provider '{name}'")]
    UnknownProvider { name: String },
}

impl ConfigError {
    pub(crate) fn invalid(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::InvalidValue {
            key: key.into(),
            value: value.into(),
        }
    }
}

impl UserFriendlyError for ConfigError {
    fn user_message(&self) -> String {
        match self {
            Self::InvalidValue { key, .. } => format!("Configuration value '{key}' is invalid"),
            Self::NotFound { path } => {
                format!("Configuration file {} does not exist", path.display())
            }
            Self::Parse { path, .. } => {
                format!("Configuration file {} is not valid TOML", path.display())
            }
            Self::UnknownProvider { name } => format!("Provider '{name}' is not configured"),
        }
    }

    fn context(&self) -> Option<String> {
        match self {
            Self::InvalidValue { value, .. } => Some(value.clone()),
            Self::Parse { reason, .. } => Some(reason.clone()),
            _ => None,
        }
    }

    fn suggestions(&self) -> Vec<String> {
        match self {
            Self::NotFound { .. } => vec![
                "Check the --config argument or the SWITCHYARD_CONFIG variable".to_string(),
                "Run without --config to fall back to discovery and built-in defaults".to_string(),
            ],
            Self::UnknownProvider { name } => vec![format!(
                "Add a [providers.{name}] section or remove it from [orchestrator].providers"
            )],
            Self::InvalidValue { .. } | Self::Parse { .. } => {
                vec!["Fix the value in your switchyard.toml and retry".to_string()]
            }
        }
    }

    fn category(&self) -> ErrorCategory {
        ErrorCategory::Configuration
    }
}
