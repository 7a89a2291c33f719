//! switchyard: priority-aware dispatch of tasks to CLI-driven LLM providers.
//!
//! The library is split into workspace crates; this root crate re-exports the
//! public surface and hosts the `switchyard` command-line interface.
//!
//! ```no_run
//! use serde_json::json;
//! use switchyard::{Config, Orchestrator, Priority, Task, TaskType};
//!
//! # async fn demo() -> anyhow::Result<()> {
//! let orchestrator = Orchestrator::from_config(Config::discover(None)?)?;
//! orchestrator.initialize().await?;
//!
//! let task = Task::new(TaskType::CodeReview, json!("Review this diff"))
//!     .with_priority(Priority::High);
//! let result = orchestrator.execute_task(task).await?;
//! println!("{:?}", result.output);
//!
//! orchestrator.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod exit_codes;

pub use exit_codes::ExitCode;

pub use switchyard_config::{
    AuthProvider, Config, ConfigAuthProvider, ConfigBuilder, ConfigError, ProviderConfig,
    ProviderSection,
};
pub use switchyard_dispatch::{
    CircuitState, DispatchError, HealthProbe, Orchestrator, QueueStatus, TaskResult,
    WorkerStatus,
};
pub use switchyard_providers::{
    AdapterError, AdapterOutput, AdapterRegistry, FailureKind, Invocation, ProviderAdapter,
};
pub use switchyard_runner::CommandSpec;
pub use switchyard_utils::{
    Priority, ProviderChoice, RetryPolicy, Task, TaskRequest, TaskType, UserFriendlyError,
};
