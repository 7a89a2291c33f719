//! Configuration model and loading.
//!
//! ```toml
//! [orchestrator]
//! providers = ["claude", "gemini"]
//!
//! [queues.low]
//! concurrency = 2
//!
//! [providers.claude]
//! adapter = "claude-cli"
//! api_key_env = "ANTHROPIC_API_KEY"
//! ```

mod builder;
mod discovery;
mod model;
mod validation;

pub use builder::ConfigBuilder;
pub use discovery::{CONFIG_ENV, SearchPaths};
pub use model::*;
