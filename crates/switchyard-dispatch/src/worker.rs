//! Executes one task against one provider.

use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use switchyard_config::AuthProvider;
use switchyard_providers::{AdapterError, FailureKind, ProviderAdapter};
use switchyard_runner::{DEFAULT_GRACE_PERIOD, RunnerError};
use switchyard_utils::Task;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::error::DispatchError;
use crate::result::WorkerResult;

/// Per-provider executor with a single in-flight slot.
///
/// Callers either claim the slot up front ([`Worker::try_reserve`]) or queue
/// on it in FIFO order, so at most one child process per provider is ever
/// running and the in-flight handle is never overwritten.
pub struct Worker {
    provider: String,
    adapter: Arc<dyn ProviderAdapter>,
    auth: Arc<dyn AuthProvider>,
    slot: Arc<Semaphore>,
    in_flight: Mutex<Option<u32>>,
    closed: AtomicBool,
    grace: Duration,
}

/// A claimed worker slot. Released on drop.
#[derive(Debug)]
pub struct Reservation {
    _permit: OwnedSemaphorePermit,
}

/// Clears the in-flight pid on every exit path.
struct InFlight<'a>(&'a Mutex<Option<u32>>);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        *self.0.lock() = None;
    }
}

impl Worker {
    #[must_use]
    pub fn new(
        provider: impl Into<String>,
        adapter: Arc<dyn ProviderAdapter>,
        auth: Arc<dyn AuthProvider>,
    ) -> Self {
        Self {
            provider: provider.into(),
            adapter,
            auth,
            slot: Arc::new(Semaphore::new(1)),
            in_flight: Mutex::new(None),
            closed: AtomicBool::new(false),
            grace: DEFAULT_GRACE_PERIOD,
        }
    }

    #[must_use]
    pub fn with_grace_period(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    #[must_use]
    pub fn provider(&self) -> &str {
        &self.provider
    }

    /// Whether a child process is currently running for this provider.
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.in_flight.lock().is_some()
    }

    /// Whether the slot is free to claim right now.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.slot.available_permits() > 0
    }

    /// Claim the slot without waiting.
    pub fn try_reserve(&self) -> Option<Reservation> {
        Arc::clone(&self.slot)
            .try_acquire_owned()
            .ok()
            .map(|permit| Reservation { _permit: permit })
    }

    async fn reserve(&self) -> Result<Reservation, DispatchError> {
        Arc::clone(&self.slot)
            .acquire_owned()
            .await
            .map(|permit| Reservation { _permit: permit })
            .map_err(|_| DispatchError::Shutdown)
    }

    /// Wait for the slot, then run `task`.
    pub async fn execute_task(&self, task: &Task) -> Result<WorkerResult, DispatchError> {
        let reservation = self.reserve().await?;
        self.execute_reserved(task, reservation).await
    }

    /// Run `task` in a slot already claimed from this worker.
    pub async fn execute_reserved(
        &self,
        task: &Task,
        reservation: Reservation,
    ) -> Result<WorkerResult, DispatchError> {
        let _reservation = reservation;
        if self.closed.load(Ordering::Acquire) {
            return Err(DispatchError::Shutdown);
        }

        let config = self.auth.provider_config(&self.provider).await.map_err(|e| {
            self.adapter_error(AdapterError::new(FailureKind::Misconfigured, e.to_string()))
        })?;
        let invocation = self
            .adapter
            .build_invocation(task, &config)
            .map_err(|e| self.adapter_error(e))?;
        if self.closed.load(Ordering::Acquire) {
            return Err(DispatchError::Shutdown);
        }

        tracing::debug!(
            provider = %self.provider,
            task_id = %task.id_or_placeholder(),
            model = %invocation.model,
            "starting invocation"
        );

        let started = Instant::now();
        let process = switchyard_runner::spawn(&invocation.command, invocation.stdin.clone())
            .map_err(|e| self.adapter_error(AdapterError::new(FailureKind::Spawn, e.to_string())))?
            .with_grace_period(self.grace);

        // `terminate()` sets `closed` before reading the pid under this lock,
        // so either it sees the pid or we see `closed`.
        let raced_shutdown = {
            let mut pid = self.in_flight.lock();
            if self.closed.load(Ordering::Acquire) {
                true
            } else {
                *pid = process.pid();
                false
            }
        };
        if raced_shutdown {
            tracing::debug!(provider = %self.provider, "shutdown raced spawn, killing child");
            if let Some(pid) = process.pid() {
                switchyard_runner::terminate_pid(pid, Duration::ZERO).await;
            }
            drop(process);
            return Err(DispatchError::Shutdown);
        }
        let _in_flight = InFlight(&self.in_flight);

        let output = match process.wait(task.timeout).await {
            Ok(output) => output,
            Err(RunnerError::Timeout { timeout }) => {
                return Err(DispatchError::TaskTimeout {
                    provider: self.provider.clone(),
                    timeout_ms: timeout.as_millis() as u64,
                });
            }
            Err(e) => {
                return Err(
                    self.adapter_error(AdapterError::new(FailureKind::Crash, e.to_string()))
                );
            }
        };

        if self.closed.load(Ordering::Acquire) {
            return Err(DispatchError::Shutdown);
        }

        let parsed = self
            .adapter
            .parse_output(&output, &invocation.model)
            .map_err(|e| self.adapter_error(e))?;

        Ok(WorkerResult {
            output: parsed.text,
            provider: self.provider.clone(),
            model: parsed.model,
            exit_code: output.exit_code.unwrap_or_default(),
            duration: started.elapsed(),
            tokens: parsed.tokens,
        })
    }

    fn adapter_error(&self, err: AdapterError) -> DispatchError {
        DispatchError::from_adapter(&self.provider, err)
    }

    /// Refuse new work, release queued callers, and terminate the in-flight
    /// process group, if any.
    pub async fn terminate(&self) {
        self.closed.store(true, Ordering::Release);
        self.slot.close();
        let pid = *self.in_flight.lock();
        if let Some(pid) = pid {
            tracing::info!(provider = %self.provider, pid, "terminating in-flight invocation");
            switchyard_runner::terminate_pid(pid, self.grace).await;
        }
    }
}

impl std::fmt::Debug for Worker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Worker")
            .field("provider", &self.provider)
            .field("adapter", &self.adapter.kind())
            .field("in_flight", &*self.in_flight.lock())
            .finish_non_exhaustive()
    }
}
