//! Child process execution for provider CLIs.
//!
//! Every invocation goes through [`CommandSpec`] so arguments stay argv-style.
//! Spawned children lead their own process group, which lets timeouts and
//! shutdown take down the whole tree instead of only the direct child.

pub mod command_spec;
pub mod error;
pub mod process;

#[cfg(unix)]
mod unix;

pub use command_spec::CommandSpec;
pub use error::RunnerError;
pub use process::{DEFAULT_GRACE_PERIOD, ProcessOutput, RunningProcess, spawn, terminate_pid};
