//! Task admission, provider resolution, retries, and lifecycle.

use chrono::{DateTime, Utc};
use futures::StreamExt;
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};
use strum::IntoEnumIterator;
use switchyard_config::{AuthProvider, Config, ConfigAuthProvider};
use switchyard_providers::{AdapterRegistry, RegistryError};
use switchyard_utils::logging::task_span;
use switchyard_utils::{Priority, ProviderChoice, RetryPolicy, Task, TaskRequest};
use tokio::sync::watch;
use tracing::Instrument;

use crate::affinity::AffinityTable;
use crate::circuit_breaker::{CircuitBreakerConfig, CircuitState};
use crate::error::DispatchError;
use crate::health::{AdapterProbe, HealthListener, HealthMonitor, HealthProbe, HealthSettings};
use crate::load_balancer::LoadBalancer;
use crate::queue::{PriorityQueue, QueueStatus};
use crate::result::TaskResult;
use crate::retry::RetryConfig;
use crate::worker::{Reservation, Worker};

/// Routing and activity snapshot for one registered provider.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkerStatus {
    pub healthy: bool,
    pub last_used: Option<DateTime<Utc>>,
    pub success_rate: f64,
    pub avg_latency_ms: f64,
    pub circuit_state: CircuitState,
    pub total_requests: u64,
    pub in_flight: bool,
}

#[derive(Debug)]
struct Queues {
    high: PriorityQueue,
    normal: PriorityQueue,
    low: PriorityQueue,
}

impl Queues {
    fn from_config(config: &Config) -> Self {
        let queue = |p| PriorityQueue::new(p, config.queues.limits(p));
        Self {
            high: queue(Priority::High),
            normal: queue(Priority::Normal),
            low: queue(Priority::Low),
        }
    }

    fn get(&self, priority: Priority) -> &PriorityQueue {
        match priority {
            Priority::High => &self.high,
            Priority::Normal => &self.normal,
            Priority::Low => &self.low,
        }
    }
}

/// Everything that exists between `initialize()` and `shutdown()`.
struct Active {
    providers: Vec<String>,
    workers: HashMap<String, Arc<Worker>>,
    balancer: Arc<LoadBalancer>,
    monitor: Option<Arc<HealthMonitor>>,
    queues: Queues,
    retry: RetryConfig,
    shutdown: watch::Sender<bool>,
}

pub struct Orchestrator {
    config: Arc<Config>,
    auth: Arc<dyn AuthProvider>,
    adapters: AdapterRegistry,
    probe: Option<Arc<dyn HealthProbe>>,
    state: RwLock<Option<Arc<Active>>>,
    lifecycle: tokio::sync::Mutex<()>,
}

impl Orchestrator {
    #[must_use]
    pub fn new(config: Config, auth: Arc<dyn AuthProvider>, adapters: AdapterRegistry) -> Self {
        Self {
            config: Arc::new(config),
            auth,
            adapters,
            probe: None,
            state: RwLock::new(None),
            lifecycle: tokio::sync::Mutex::new(()),
        }
    }

    /// Orchestrator using the config-backed auth provider and built-in adapters.
    pub fn from_config(config: Config) -> Result<Self, RegistryError> {
        let adapters = AdapterRegistry::from_config(&config)?;
        let config = Arc::new(config);
        let auth: Arc<dyn AuthProvider> = Arc::new(ConfigAuthProvider::new(Arc::clone(&config)));
        Ok(Self {
            config,
            auth,
            adapters,
            probe: None,
            state: RwLock::new(None),
            lifecycle: tokio::sync::Mutex::new(()),
        })
    }

    /// Replace the adapter-driven health probe.
    #[must_use]
    pub fn with_probe(mut self, probe: Arc<dyn HealthProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    fn active(&self) -> Result<Arc<Active>, DispatchError> {
        self.state.read().clone().ok_or(DispatchError::NotInitialized)
    }

    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.state.read().is_some()
    }

    /// Register a worker per usable provider, start health monitoring, and
    /// open the queues.
    ///
    /// Providers without an adapter or failing validation are skipped with a
    /// warning. Fails only when no provider survives. Idempotent.
    pub async fn initialize(&self) -> Result<(), DispatchError> {
        let _lifecycle = self.lifecycle.lock().await;
        if self.is_initialized() {
            return Ok(());
        }

        let grace = self.config.shutdown_grace();
        let mut providers = Vec::new();
        let mut workers = HashMap::new();
        let mut rejected = Vec::new();

        for name in self.config.provider_names() {
            let Some(adapter) = self.adapters.get(&name) else {
                tracing::warn!(provider = %name, "no adapter registered, skipping provider");
                rejected.push(name);
                continue;
            };
            if !self.auth.validate_provider(&name).await {
                tracing::warn!(provider = %name, "provider failed validation, skipping");
                rejected.push(name);
                continue;
            }
            let worker = Worker::new(name.clone(), adapter, Arc::clone(&self.auth))
                .with_grace_period(grace);
            workers.insert(name.clone(), Arc::new(worker));
            providers.push(name);
        }

        if providers.is_empty() {
            tracing::error!(rejected = ?rejected, "provider pool is empty");
            return Err(DispatchError::EmptyPool { rejected });
        }

        let balancer = Arc::new(LoadBalancer::new(
            CircuitBreakerConfig::from(&self.config.circuit_breaker),
            AffinityTable::from_config(&self.config),
        ));

        let monitor = self.config.health.enabled.then(|| {
            let settings = HealthSettings::from(&self.config.health);
            let probe = self.probe.clone().unwrap_or_else(|| {
                Arc::new(AdapterProbe::new(
                    Arc::clone(&self.auth),
                    self.adapters.clone(),
                    settings.probe_timeout,
                ))
            });
            let listener: Arc<dyn HealthListener> = balancer.clone();
            let monitor = HealthMonitor::new(providers.clone(), probe, listener, settings);
            monitor.start();
            monitor
        });

        let (shutdown, _) = watch::channel(false);
        tracing::info!(
            providers = ?providers,
            rejected = rejected.len(),
            health = monitor.is_some(),
            "orchestrator initialized"
        );

        *self.state.write() = Some(Arc::new(Active {
            providers,
            workers,
            balancer,
            monitor,
            queues: Queues::from_config(&self.config),
            retry: RetryConfig::from(&self.config.retry),
            shutdown,
        }));
        Ok(())
    }

    /// Queue `task` on its priority and run it to a terminal result.
    ///
    /// Returns `Err` only for an uninitialized orchestrator or a task that
    /// fails validation; every failure after admission is reported in the
    /// returned [`TaskResult`].
    pub async fn execute_task(&self, task: Task) -> Result<TaskResult, DispatchError> {
        let active = self.active()?;
        task.validate()?;
        if let Some(name) = task.provider.explicit()
            && !active.workers.contains_key(name)
        {
            return Err(DispatchError::validation(format!(
                "provider '{name}' is not registered"
            )));
        }

        let task = task.ensure_id();
        let span = task_span(
            task.id_or_placeholder(),
            task.priority.as_str(),
            task.task_type.as_str(),
        );
        Ok(active.run(task).instrument(span).await)
    }

    /// Convert and run a loosely typed request. A request without a timeout
    /// gets `[orchestrator].default_timeout_secs`.
    pub async fn execute_request(&self, request: TaskRequest) -> Result<TaskResult, DispatchError> {
        let use_default_timeout = request.timeout_ms.is_none();
        let mut task = Task::try_from(request)?;
        if use_default_timeout {
            task.timeout = self.config.default_timeout();
        }
        self.execute_task(task).await
    }

    /// Run `tasks` with at most `max_concurrent` in flight; results are
    /// index-aligned with the input. Per-task validation failures become
    /// failed results rather than aborting the batch.
    pub async fn execute_batch(
        &self,
        tasks: Vec<Task>,
        max_concurrent: usize,
    ) -> Result<Vec<TaskResult>, DispatchError> {
        self.active()?;
        let results = futures::stream::iter(tasks.into_iter().map(|task| async move {
            let task = task.ensure_id();
            let id = task.id_or_placeholder().to_string();
            match self.execute_task(task).await {
                Ok(result) => result,
                Err(e) => TaskResult::failed(id, e, None, Duration::ZERO, 0),
            }
        }))
        .buffered(max_concurrent.max(1))
        .collect()
        .await;
        Ok(results)
    }

    pub fn get_worker_status(&self) -> Result<BTreeMap<String, WorkerStatus>, DispatchError> {
        let active = self.active()?;
        Ok(active
            .providers
            .iter()
            .map(|name| {
                let snap = active.balancer.snapshot(name);
                let in_flight = active.workers.get(name).is_some_and(|w| w.is_busy());
                let status = WorkerStatus {
                    healthy: snap.stats.is_healthy,
                    last_used: snap.stats.last_used_at,
                    success_rate: snap.stats.success_rate,
                    avg_latency_ms: snap.stats.avg_latency_ms,
                    circuit_state: snap.circuit_state,
                    total_requests: snap.stats.total_requests,
                    in_flight,
                };
                (name.clone(), status)
            })
            .collect())
    }

    pub fn get_queue_status(&self) -> Result<BTreeMap<Priority, QueueStatus>, DispatchError> {
        let active = self.active()?;
        Ok(Priority::iter()
            .map(|p| (p, active.queues.get(p).status()))
            .collect())
    }

    /// Stop admitting tasks of `priority`; running tasks are unaffected.
    pub fn pause_queue(&self, priority: Priority) -> Result<(), DispatchError> {
        self.active()?.queues.get(priority).pause();
        Ok(())
    }

    pub fn resume_queue(&self, priority: Priority) -> Result<(), DispatchError> {
        self.active()?.queues.get(priority).resume();
        Ok(())
    }

    /// Reset counters and circuit breaker for a registered provider.
    pub fn reset_stats(&self, provider: &str) -> Result<(), DispatchError> {
        let active = self.active()?;
        if !active.workers.contains_key(provider) {
            return Err(DispatchError::validation(format!(
                "provider '{provider}' is not registered"
            )));
        }
        active.balancer.reset_stats(provider);
        Ok(())
    }

    /// Run one probe round now. `Ok(false)` when health monitoring is
    /// disabled or a round is already running.
    pub async fn check_health_now(&self) -> Result<bool, DispatchError> {
        let active = self.active()?;
        match &active.monitor {
            Some(monitor) => Ok(monitor.check_now().await),
            None => Ok(false),
        }
    }

    /// Stop the health monitor, drop queued tasks, and terminate in-flight
    /// invocations. The orchestrator can be initialized again afterwards.
    pub async fn shutdown(&self) {
        let _lifecycle = self.lifecycle.lock().await;
        let taken = self.state.write().take();
        let Some(active) = taken else {
            return;
        };

        active.shutdown.send_replace(true);
        if let Some(monitor) = &active.monitor {
            monitor.stop();
        }
        for priority in Priority::iter() {
            active.queues.get(priority).close();
        }
        futures::future::join_all(active.workers.values().map(|w| w.terminate())).await;
        tracing::info!("orchestrator shut down");
    }
}

/// A resolved provider, holding its worker slot when one was free.
struct Claim {
    provider: String,
    reservation: Option<Reservation>,
}

impl Active {
    fn is_shutting_down(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Sleep for `delay`; `false` if shutdown began first.
    async fn backoff(&self, delay: Duration) -> bool {
        let mut shutdown = self.shutdown.subscribe();
        tokio::select! {
            () = tokio::time::sleep(delay) => true,
            _ = shutdown.wait_for(|stopping| *stopping) => false,
        }
    }

    /// An explicitly requested provider, if it is currently selectable.
    fn explicit(&self, name: &str) -> Result<String, DispatchError> {
        if self.balancer.is_selectable(name) {
            Ok(name.to_string())
        } else {
            Err(DispatchError::NoHealthyProvider {
                requested: Some(name.to_string()),
            })
        }
    }

    /// Provider for `attempt` (1-based) under the task's retry policy.
    fn resolve_provider(&self, task: &Task, attempt: u32) -> Result<Claim, DispatchError> {
        match (&task.provider, task.retry_policy()) {
            (ProviderChoice::Explicit(name), RetryPolicy::SameProvider) => {
                self.explicit(name).map(|name| self.claim(name))
            }
            (ProviderChoice::Explicit(name), RetryPolicy::Reselect) if attempt == 1 => {
                match self.explicit(name) {
                    Ok(name) => Ok(self.claim(name)),
                    Err(_) => self.select_idle_first(task),
                }
            }
            _ => self.select_idle_first(task),
        }
    }

    /// Reserve the provider's slot if it is free; otherwise the attempt waits
    /// for it in `Worker::execute_task`.
    fn claim(&self, provider: String) -> Claim {
        let reservation = self.workers.get(&provider).and_then(|w| w.try_reserve());
        Claim {
            provider,
            reservation,
        }
    }

    /// Score only providers with a free slot while any selectable one has
    /// one, and claim the winner's slot before returning it.
    fn select_idle_first(&self, task: &Task) -> Result<Claim, DispatchError> {
        for _ in 0..=self.providers.len() {
            let idle: Vec<String> = self
                .providers
                .iter()
                .filter(|p| self.workers.get(*p).is_some_and(|w| w.is_idle()))
                .cloned()
                .collect();
            let narrowed = idle.iter().any(|p| self.balancer.is_selectable(p));
            let pool = if narrowed { &idle } else { &self.providers };

            let claim = self.claim(self.balancer.select_provider(task, pool)?);
            if claim.reservation.is_some() || !narrowed {
                return Ok(claim);
            }
            // Another task took the slot between the idle check and the claim.
        }
        self.balancer
            .select_provider(task, &self.providers)
            .map(|provider| self.claim(provider))
    }

    async fn run(&self, task: Task) -> TaskResult {
        let started = Instant::now();
        let id = task.id_or_placeholder().to_string();

        let queue = self.queues.get(task.priority);
        let admission = match queue.admit().await {
            Ok(admission) => admission,
            Err(e) => {
                tracing::debug!("task dropped before admission");
                return TaskResult::failed(id, e, None, started.elapsed(), 0);
            }
        };
        tracing::debug!(waited_ms = started.elapsed().as_millis() as u64, "task admitted");

        let result = self.run_attempts(&task, id, started).await;
        drop(admission);
        result
    }

    async fn run_attempts(&self, task: &Task, id: String, started: Instant) -> TaskResult {
        let max_attempts = self.retry.attempts.max(1);
        let mut last_error = DispatchError::NoHealthyProvider { requested: None };
        let mut last_provider = None;
        let mut attempts = 0;

        for attempt in 1..=max_attempts {
            if self.is_shutting_down() {
                last_error = DispatchError::Shutdown;
                break;
            }
            attempts = attempt;

            let error = match self.resolve_provider(task, attempt) {
                Ok(Claim {
                    provider,
                    reservation,
                }) => {
                    let outcome = match (self.workers.get(&provider), reservation) {
                        (Some(worker), Some(reservation)) => {
                            worker.execute_reserved(task, reservation).await
                        }
                        (Some(worker), None) => worker.execute_task(task).await,
                        (None, _) => Err(DispatchError::NoHealthyProvider {
                            requested: Some(provider.clone()),
                        }),
                    };
                    match outcome {
                        Ok(output) => {
                            self.balancer.report_success(&provider, output.duration);
                            tracing::info!(
                                provider = %provider,
                                attempt,
                                duration_ms = started.elapsed().as_millis() as u64,
                                "task succeeded"
                            );
                            return TaskResult::succeeded(id, output, started.elapsed(), attempt);
                        }
                        Err(DispatchError::Shutdown) => DispatchError::Shutdown,
                        Err(e) => {
                            if e.counts_against_provider() {
                                self.balancer.report_failure(&provider, &e.to_string());
                            }
                            last_provider = Some(provider);
                            e
                        }
                    }
                }
                Err(e) => e,
            };

            tracing::warn!(attempt, max_attempts, error = %error, "attempt failed");

            // A pinned provider that is excluded fails without retrying.
            let explicit_excluded = matches!(
                &error,
                DispatchError::NoHealthyProvider { requested: Some(_) }
            ) && task.retry_policy() == RetryPolicy::SameProvider;
            let retryable = error.is_retryable() && !explicit_excluded;
            last_error = error;

            if !retryable || attempt == max_attempts {
                break;
            }
            if !self.backoff(self.retry.backoff(attempt)).await {
                last_error = DispatchError::Shutdown;
                break;
            }
        }

        tracing::warn!(attempts, error = %last_error, "task failed");
        TaskResult::failed(id, last_error, last_provider, started.elapsed(), attempts)
    }
}
