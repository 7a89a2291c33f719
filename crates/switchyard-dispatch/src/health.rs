//! Periodic provider health probing with hysteresis.
//!
//! Independent of live traffic and of the circuit breaker. Flips are pushed to
//! a [`HealthListener`] (the load balancer) as they happen.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use switchyard_config::{AuthProvider, HealthSection};
use switchyard_providers::AdapterRegistry;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Receives healthy/unhealthy flips from the monitor.
pub trait HealthListener: Send + Sync {
    fn provider_healthy(&self, provider: &str);
    fn provider_unhealthy(&self, provider: &str);
}

/// One lightweight round-trip to a provider.
#[async_trait]
pub trait HealthProbe: Send + Sync {
    async fn probe(&self, provider: &str) -> Result<(), String>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthSettings {
    pub interval: Duration,
    pub probe_timeout: Duration,
    pub healthy_threshold: u32,
    pub unhealthy_threshold: u32,
}

impl Default for HealthSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            probe_timeout: Duration::from_secs(10),
            healthy_threshold: 2,
            unhealthy_threshold: 3,
        }
    }
}

impl From<&HealthSection> for HealthSettings {
    fn from(section: &HealthSection) -> Self {
        Self {
            interval: Duration::from_secs(section.interval_secs),
            probe_timeout: Duration::from_secs(section.probe_timeout_secs),
            healthy_threshold: section.healthy_threshold,
            unhealthy_threshold: section.unhealthy_threshold,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthStatus {
    pub is_healthy: bool,
    pub consecutive_failures: u32,
    pub consecutive_successes: u32,
    pub last_checked_at: Option<DateTime<Utc>>,
}

impl Default for HealthStatus {
    fn default() -> Self {
        Self {
            is_healthy: true,
            consecutive_failures: 0,
            consecutive_successes: 0,
            last_checked_at: None,
        }
    }
}

/// Probe that runs the adapter's probe invocation and expects a clean exit.
pub struct AdapterProbe {
    auth: Arc<dyn AuthProvider>,
    adapters: AdapterRegistry,
    timeout: Duration,
}

impl AdapterProbe {
    #[must_use]
    pub fn new(auth: Arc<dyn AuthProvider>, adapters: AdapterRegistry, timeout: Duration) -> Self {
        Self {
            auth,
            adapters,
            timeout,
        }
    }
}

#[async_trait]
impl HealthProbe for AdapterProbe {
    async fn probe(&self, provider: &str) -> Result<(), String> {
        let adapter = self
            .adapters
            .get(provider)
            .ok_or_else(|| "no adapter registered".to_string())?;
        let config = self
            .auth
            .provider_config(provider)
            .await
            .map_err(|e| e.to_string())?;
        let invocation = adapter.probe_invocation(&config);
        let output = switchyard_runner::spawn(&invocation.command, invocation.stdin)
            .map_err(|e| e.to_string())?
            .wait(self.timeout)
            .await
            .map_err(|e| e.to_string())?;
        if output.success() {
            Ok(())
        } else {
            Err(switchyard_utils::redaction::sanitize_stderr(&output.stderr))
        }
    }
}

pub struct HealthMonitor {
    providers: Vec<String>,
    probe: Arc<dyn HealthProbe>,
    listener: Arc<dyn HealthListener>,
    settings: HealthSettings,
    statuses: Mutex<HashMap<String, HealthStatus>>,
    checking: AtomicBool,
    ticker: Mutex<Option<JoinHandle<()>>>,
}

/// Clears the overlap flag when a round finishes or is cancelled.
struct RoundGuard<'a>(&'a AtomicBool);

impl Drop for RoundGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl HealthMonitor {
    #[must_use]
    pub fn new(
        providers: Vec<String>,
        probe: Arc<dyn HealthProbe>,
        listener: Arc<dyn HealthListener>,
        settings: HealthSettings,
    ) -> Arc<Self> {
        let statuses = providers
            .iter()
            .map(|p| (p.clone(), HealthStatus::default()))
            .collect();
        Arc::new(Self {
            providers,
            probe,
            listener,
            settings,
            statuses: Mutex::new(statuses),
            checking: AtomicBool::new(false),
            ticker: Mutex::new(None),
        })
    }

    /// Start probing every `interval`. The first round runs one interval
    /// after start; providers begin healthy. Calling twice is a no-op.
    pub fn start(self: &Arc<Self>) {
        let mut ticker = self.ticker.lock();
        if ticker.is_some() {
            return;
        }
        let weak: Weak<Self> = Arc::downgrade(self);
        let interval = self.settings.interval;
        *ticker = Some(tokio::spawn(async move {
            let mut timer = tokio::time::interval(interval);
            timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
            timer.tick().await;
            loop {
                timer.tick().await;
                let Some(monitor) = weak.upgrade() else {
                    break;
                };
                monitor.check_now().await;
            }
        }));
        tracing::debug!(interval_ms = interval.as_millis() as u64, "health monitor started");
    }

    pub fn stop(&self) {
        if let Some(handle) = self.ticker.lock().take() {
            handle.abort();
            tracing::debug!("health monitor stopped");
        }
    }

    /// Probe every provider once, concurrently.
    ///
    /// Returns `false` without probing if a previous round is still running.
    pub async fn check_now(&self) -> bool {
        if self
            .checking
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::debug!("previous health round still running, skipping");
            return false;
        }
        let _guard = RoundGuard(&self.checking);

        let timeout = self.settings.probe_timeout;
        let rounds = self.providers.iter().map(|provider| async move {
            let outcome = match tokio::time::timeout(timeout, self.probe.probe(provider)).await {
                Ok(result) => result,
                Err(_) => Err(format!("probe timed out after {}ms", timeout.as_millis())),
            };
            (provider, outcome)
        });

        for (provider, outcome) in futures::future::join_all(rounds).await {
            if let Err(reason) = &outcome {
                tracing::debug!(provider = %provider, reason = %reason, "health probe failed");
            }
            self.apply(provider, outcome.is_ok());
        }
        true
    }

    /// Fold one probe outcome into the hysteresis window and notify on a flip.
    fn apply(&self, provider: &str, ok: bool) {
        let flipped = {
            let mut statuses = self.statuses.lock();
            let status = statuses.entry(provider.to_string()).or_default();
            status.last_checked_at = Some(Utc::now());
            if ok {
                status.consecutive_successes += 1;
                status.consecutive_failures = 0;
                if !status.is_healthy
                    && status.consecutive_successes >= self.settings.healthy_threshold
                {
                    status.is_healthy = true;
                    Some(true)
                } else {
                    None
                }
            } else {
                status.consecutive_failures += 1;
                status.consecutive_successes = 0;
                if status.is_healthy
                    && status.consecutive_failures >= self.settings.unhealthy_threshold
                {
                    status.is_healthy = false;
                    Some(false)
                } else {
                    None
                }
            }
        };

        match flipped {
            Some(true) => {
                tracing::info!(provider = %provider, "provider healthy");
                self.listener.provider_healthy(provider);
            }
            Some(false) => {
                tracing::warn!(provider = %provider, "provider unhealthy");
                self.listener.provider_unhealthy(provider);
            }
            None => {}
        }
    }

    #[must_use]
    pub fn status(&self, provider: &str) -> Option<HealthStatus> {
        self.statuses.lock().get(provider).cloned()
    }
}

impl Drop for HealthMonitor {
    fn drop(&mut self) {
        if let Some(handle) = self.ticker.get_mut().take() {
            handle.abort();
        }
    }
}
