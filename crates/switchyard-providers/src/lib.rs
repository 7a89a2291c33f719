//! Provider adapters.
//!
//! An adapter is the only code that knows how a particular CLI wants to be
//! called. Given a task and a resolved [`ProviderConfig`] it produces an
//! [`Invocation`]; given the finished process it produces an
//! [`AdapterOutput`] or a classified [`AdapterError`]. Adapters never spawn
//! anything themselves.

mod classify;
mod claude_cli;
mod command;
mod gemini_cli;
mod prompt;
mod registry;
mod types;

pub use classify::{classify_failure, classify_output};
pub use claude_cli::ClaudeCliAdapter;
pub use command::CommandAdapter;
pub use gemini_cli::GeminiCliAdapter;
pub use prompt::{Prompt, extract_prompt};
pub use registry::{AdapterRegistry, RegistryError, construct_adapter};
pub use types::DEFAULT_MODEL_LABEL;
pub use types::{AdapterError, AdapterOutput, FailureKind, Invocation, ProviderAdapter, TokenUsage};

pub use switchyard_config::ProviderConfig;
