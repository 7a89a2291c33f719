use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;

/// Running counters for one provider.
///
/// `total_requests == success_count + failure_count` always holds; the
/// average latency only moves on success.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProviderStats {
    pub success_count: u64,
    pub failure_count: u64,
    pub total_requests: u64,
    pub avg_latency_ms: f64,
    pub last_used_at: Option<DateTime<Utc>>,
    pub success_rate: f64,
    pub is_healthy: bool,
}

impl Default for ProviderStats {
    fn default() -> Self {
        Self {
            success_count: 0,
            failure_count: 0,
            total_requests: 0,
            avg_latency_ms: 0.0,
            last_used_at: None,
            // Untried providers are not penalised against proven ones.
            success_rate: 1.0,
            is_healthy: true,
        }
    }
}

impl ProviderStats {
    pub fn record_success(&mut self, latency: Duration, now: DateTime<Utc>) {
        self.success_count += 1;
        self.total_requests += 1;
        let latency_ms = latency.as_secs_f64() * 1000.0;
        self.avg_latency_ms += (latency_ms - self.avg_latency_ms) / self.success_count as f64;
        self.last_used_at = Some(now);
        self.recompute_rate();
    }

    pub fn record_failure(&mut self) {
        self.failure_count += 1;
        self.total_requests += 1;
        self.recompute_rate();
    }

    fn recompute_rate(&mut self) {
        if self.total_requests > 0 {
            self.success_rate = self.success_count as f64 / self.total_requests as f64;
        }
    }

    /// Minutes since the last successful use, or `None` if never used.
    #[must_use]
    pub fn minutes_idle(&self, now: DateTime<Utc>) -> Option<f64> {
        self.last_used_at
            .map(|at| (now - at).num_milliseconds().max(0) as f64 / 60_000.0)
    }

    /// Clear counters, keeping the health flag owned by the monitor.
    pub fn reset(&mut self) {
        *self = Self {
            is_healthy: self.is_healthy,
            ..Self::default()
        };
    }
}
