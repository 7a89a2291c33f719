//! Foundation types and utilities shared by every switchyard crate.

pub mod error;
pub mod logging;
pub mod redaction;
pub mod types;

pub use error::{ErrorCategory, UserFriendlyError, render_report};
pub use types::{
    Priority, ProviderChoice, RetryPolicy, Task, TaskRequest, TaskType, TaskValidationError,
    DEFAULT_TASK_TIMEOUT,
};
