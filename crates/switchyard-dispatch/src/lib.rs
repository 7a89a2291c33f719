//! Dispatch core: priority queues, provider selection, circuit breaking,
//! health probing, and the orchestrator tying them together.

pub mod affinity;
pub mod circuit_breaker;
pub mod error;
pub mod health;
pub mod load_balancer;
pub mod orchestrator;
pub mod queue;
pub mod result;
pub mod retry;
pub mod stats;
pub mod worker;

pub use affinity::AffinityTable;
pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use error::DispatchError;
pub use health::{
    AdapterProbe, HealthListener, HealthMonitor, HealthProbe, HealthSettings, HealthStatus,
};
pub use load_balancer::{LoadBalancer, ProviderSnapshot};
pub use orchestrator::{Orchestrator, WorkerStatus};
pub use queue::{PriorityQueue, QueueStatus};
pub use result::{TaskResult, WorkerResult};
pub use retry::RetryConfig;
pub use stats::ProviderStats;
pub use worker::Worker;
