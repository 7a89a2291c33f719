//! Configuration for switchyard.
//!
//! Hierarchical discovery (explicit path > `SWITCHYARD_CONFIG` > project file >
//! user config dir > defaults), validation, a programmatic builder, and the
//! [`AuthProvider`] collaborator that turns a provider section into the
//! resolved [`ProviderConfig`] a worker runs with.

pub mod auth;
pub mod config;
pub mod error;

pub use auth::{AuthProvider, ConfigAuthProvider, Credentials, ProviderConfig};
pub use config::{
    CONFIG_ENV, CircuitBreakerSection, Config, ConfigBuilder, ConfigSource, HealthSection,
    KNOWN_ADAPTERS, OrchestratorSection, ProviderSection, QueueLimits, QueueSection,
    QueuesSection, RetrySection, SearchPaths,
};
pub use error::ConfigError;
