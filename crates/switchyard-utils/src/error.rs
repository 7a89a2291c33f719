//! Shared error reporting vocabulary.
//!
//! Each crate owns its own error enum; this module only defines the trait the
//! CLI uses to render any of them with context and suggestions.

use std::fmt;

/// Trait for providing user-friendly error reporting with context and suggestions
pub trait UserFriendlyError {
    /// Get a user-friendly error message
    fn user_message(&self) -> String;

    /// Get contextual information about the error
    fn context(&self) -> Option<String>;

    /// Get suggested actions to resolve the error
    fn suggestions(&self) -> Vec<String>;

    /// Get the error category for grouping similar errors
    fn category(&self) -> ErrorCategory;
}

/// Categories of errors for better organization and handling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    Validation,
    ProviderExecution,
    ProviderAvailability,
    ResourceLimits,
    Lifecycle,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Configuration => write!(f, "Configuration"),
            Self::Validation => write!(f, "Validation"),
            Self::ProviderExecution => write!(f, "Provider Execution"),
            Self::ProviderAvailability => write!(f, "Provider Availability"),
            Self::ResourceLimits => write!(f, "Resource Limits"),
            Self::Lifecycle => write!(f, "Lifecycle"),
        }
    }
}

/// Render an error as a multi-line report: message, context and suggestions.
#[must_use]
pub fn render_report(err: &dyn UserFriendlyError) -> String {
    let mut out = format!("error [{}]: {}", err.category(), err.user_message());
    if let Some(context) = err.context() {
        out.push_str("\n  ");
        out.push_str(&context);
    }
    let suggestions = err.suggestions();
    if !suggestions.is_empty() {
        out.push_str("\n\nsuggestions:");
        for suggestion in suggestions {
            out.push_str("\n  - ");
            out.push_str(&suggestion);
        }
    }
    out
}
