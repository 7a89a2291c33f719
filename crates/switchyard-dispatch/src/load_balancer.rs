//! Provider scoring and selection.
//!
//! Each provider owns a [`ProviderStats`] and a [`CircuitBreaker`] behind one
//! mutex, so concurrent outcome reports for the same provider serialize while
//! different providers never contend.

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use switchyard_utils::Task;

use crate::affinity::AffinityTable;
use crate::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
use crate::error::DispatchError;
use crate::health::HealthListener;
use crate::stats::ProviderStats;

const BASE_SCORE: f64 = 100.0;
const SUCCESS_WEIGHT: f64 = 40.0;
const MAX_RESPONSE_FACTOR: f64 = 30.0;
const MAX_RECENCY_FACTOR: f64 = 20.0;

#[derive(Debug)]
struct ProviderState {
    stats: ProviderStats,
    breaker: CircuitBreaker,
}

/// Point-in-time copy of one provider's routing state.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderSnapshot {
    pub stats: ProviderStats,
    pub circuit_state: CircuitState,
}

#[derive(Debug)]
pub struct LoadBalancer {
    providers: RwLock<HashMap<String, Arc<Mutex<ProviderState>>>>,
    breaker_config: CircuitBreakerConfig,
    affinity: AffinityTable,
}

impl LoadBalancer {
    #[must_use]
    pub fn new(breaker_config: CircuitBreakerConfig, affinity: AffinityTable) -> Self {
        Self {
            providers: RwLock::new(HashMap::new()),
            breaker_config,
            affinity,
        }
    }

    /// Lazily create the state for `name` on first reference.
    fn state(&self, name: &str) -> Arc<Mutex<ProviderState>> {
        if let Some(state) = self.providers.read().get(name) {
            return Arc::clone(state);
        }
        let mut providers = self.providers.write();
        Arc::clone(providers.entry(name.to_string()).or_insert_with(|| {
            Arc::new(Mutex::new(ProviderState {
                stats: ProviderStats::default(),
                breaker: CircuitBreaker::new(self.breaker_config),
            }))
        }))
    }

    pub fn report_success(&self, provider: &str, latency: Duration) {
        let state = self.state(provider);
        let mut state = state.lock();
        state.stats.record_success(latency, Utc::now());
        let before = state.breaker.state();
        state.breaker.record_success();
        log_transition(provider, before, state.breaker.state());
    }

    pub fn report_failure(&self, provider: &str, reason: &str) {
        let state = self.state(provider);
        let mut state = state.lock();
        state.stats.record_failure();
        let before = state.breaker.state();
        state.breaker.record_failure();
        tracing::debug!(provider = %provider, reason = %reason, "provider failure reported");
        log_transition(provider, before, state.breaker.state());
    }

    pub fn mark_healthy(&self, provider: &str) {
        self.state(provider).lock().stats.is_healthy = true;
    }

    pub fn mark_unhealthy(&self, provider: &str) {
        self.state(provider).lock().stats.is_healthy = false;
    }

    /// Reset counters and circuit for `provider`. Health is left to the monitor.
    pub fn reset_stats(&self, provider: &str) {
        let state = self.state(provider);
        let mut state = state.lock();
        state.stats.reset();
        state.breaker.reset();
    }

    /// Healthy and circuit not open. May move the circuit to HALF_OPEN.
    pub fn is_selectable(&self, provider: &str) -> bool {
        self.is_selectable_at(provider, Instant::now())
    }

    fn is_selectable_at(&self, provider: &str, now: Instant) -> bool {
        let state = self.state(provider);
        let mut state = state.lock();
        let before = state.breaker.state();
        let open = state.breaker.is_open_at(now);
        log_transition(provider, before, state.breaker.state());
        state.stats.is_healthy && !open
    }

    #[must_use]
    pub fn snapshot(&self, provider: &str) -> ProviderSnapshot {
        let state = self.state(provider);
        let state = state.lock();
        ProviderSnapshot {
            stats: state.stats.clone(),
            circuit_state: state.breaker.state(),
        }
    }

    /// Pick the best candidate for `task`.
    ///
    /// Candidates are filtered to healthy providers with a non-open circuit;
    /// a single survivor is returned without scoring. Ties go to the earlier
    /// candidate.
    pub fn select_provider(
        &self,
        task: &Task,
        candidates: &[String],
    ) -> Result<String, DispatchError> {
        self.select_provider_at(task, candidates, Instant::now(), Utc::now())
    }

    pub(crate) fn select_provider_at(
        &self,
        task: &Task,
        candidates: &[String],
        now: Instant,
        wall: DateTime<Utc>,
    ) -> Result<String, DispatchError> {
        let available: Vec<&String> = candidates
            .iter()
            .filter(|name| self.is_selectable_at(name, now))
            .collect();

        match available.as_slice() {
            [] => Err(DispatchError::NoHealthyProvider { requested: None }),
            [only] => Ok((*only).clone()),
            many => {
                let mut best: Option<(&String, f64)> = None;
                for name in many {
                    let score = self.score_at(name, task, wall);
                    tracing::trace!(provider = %name, score, "scored provider");
                    if best.is_none_or(|(_, top)| score > top) {
                        best = Some((name, score));
                    }
                }
                best.map(|(name, _)| name.clone())
                    .ok_or(DispatchError::NoHealthyProvider { requested: None })
            }
        }
    }

    /// `100 + successRate*40 + responseTime + recency + affinity`.
    #[must_use]
    pub fn score_at(&self, provider: &str, task: &Task, now: DateTime<Utc>) -> f64 {
        let stats = self.state(provider).lock().stats.clone();

        let response_factor =
            (MAX_RESPONSE_FACTOR - (stats.avg_latency_ms / 1000.0) * 10.0).max(0.0);
        let recency_factor = stats
            .minutes_idle(now)
            .map_or(MAX_RECENCY_FACTOR, |m| (m * MAX_RECENCY_FACTOR).min(MAX_RECENCY_FACTOR));
        let affinity = self.affinity.bonus(provider, task);

        BASE_SCORE + stats.success_rate * SUCCESS_WEIGHT + response_factor + recency_factor + affinity
    }
}

fn log_transition(provider: &str, before: CircuitState, after: CircuitState) {
    if before == after {
        return;
    }
    match after {
        CircuitState::Open => {
            tracing::warn!(provider = %provider, from = %before, "circuit opened");
        }
        CircuitState::HalfOpen => {
            tracing::info!(provider = %provider, "circuit half-open, allowing trial traffic");
        }
        CircuitState::Closed => tracing::info!(provider = %provider, "circuit closed"),
    }
}

impl HealthListener for LoadBalancer {
    fn provider_healthy(&self, provider: &str) {
        self.mark_healthy(provider);
    }

    fn provider_unhealthy(&self, provider: &str) {
        self.mark_unhealthy(provider);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use switchyard_utils::{Priority, TaskType};

    fn balancer() -> LoadBalancer {
        LoadBalancer::new(CircuitBreakerConfig::default(), AffinityTable::builtin())
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(ToString::to_string).collect()
    }

    fn general() -> Task {
        Task::new(TaskType::General, json!("x"))
    }

    #[test]
    fn test_single_candidate_skips_scoring() {
        let lb = balancer();
        assert_eq!(lb.select_provider(&general(), &names(&["a"])).unwrap(), "a");
    }

    #[test]
    fn test_empty_candidates() {
        let lb = balancer();
        assert_eq!(
            lb.select_provider(&general(), &[]).unwrap_err(),
            DispatchError::NoHealthyProvider { requested: None }
        );
    }

    #[test]
    fn test_ties_go_to_first_candidate() {
        let lb = balancer();
        assert_eq!(lb.select_provider(&general(), &names(&["b", "a"])).unwrap(), "b");
        assert_eq!(lb.select_provider(&general(), &names(&["a", "b"])).unwrap(), "a");
    }

    #[test]
    fn test_affinity_breaks_tie() {
        let lb = balancer();
        let task = Task::new(TaskType::Documentation, json!("x"));
        assert_eq!(
            lb.select_provider(&task, &names(&["claude", "gemini"])).unwrap(),
            "gemini"
        );
    }

    #[test]
    fn test_open_circuit_excluded() {
        let lb = balancer();
        for _ in 0..5 {
            lb.report_failure("a", "boom");
        }
        assert_eq!(lb.snapshot("a").circuit_state, CircuitState::Open);
        assert_eq!(lb.select_provider(&general(), &names(&["a", "b"])).unwrap(), "b");
        assert!(lb.select_provider(&general(), &names(&["a"])).is_err());
    }

    #[test]
    fn test_unhealthy_excluded_even_with_closed_circuit() {
        let lb = balancer();
        lb.provider_unhealthy("a");
        assert_eq!(lb.snapshot("a").circuit_state, CircuitState::Closed);
        assert_eq!(lb.select_provider(&general(), &names(&["a", "b"])).unwrap(), "b");
        lb.provider_healthy("a");
        assert!(lb.is_selectable("a"));
    }

    #[test]
    fn test_half_open_after_reset_timeout_is_selectable() {
        let lb = LoadBalancer::new(
            CircuitBreakerConfig {
                failure_threshold: 1,
                reset_timeout: Duration::from_secs(60),
                success_threshold: 1,
            },
            AffinityTable::default(),
        );
        lb.report_failure("a", "boom");
        let later = Instant::now() + Duration::from_secs(61);
        let chosen = lb
            .select_provider_at(&general(), &names(&["a"]), later, Utc::now())
            .unwrap();
        assert_eq!(chosen, "a");
        assert_eq!(lb.snapshot("a").circuit_state, CircuitState::HalfOpen);
        lb.report_success("a", Duration::from_millis(10));
        assert_eq!(lb.snapshot("a").circuit_state, CircuitState::Closed);
    }

    #[test]
    fn test_score_components() {
        let lb = LoadBalancer::new(CircuitBreakerConfig::default(), AffinityTable::default());
        let now = Utc::now();
        // Fresh provider: full success rate, no latency, never used.
        assert_eq!(lb.score_at("fresh", &general(), now), 100.0 + 40.0 + 30.0 + 20.0);

        lb.report_success("slow", Duration::from_millis(2000));
        let score = lb.score_at("slow", &general(), Utc::now());
        // 30 - 2*10 = 10 response factor, recency ~0 right after use.
        assert!((score - (100.0 + 40.0 + 10.0)).abs() < 0.5);
    }

    #[test]
    fn test_recency_spreads_load() {
        let lb = balancer();
        lb.report_success("a", Duration::from_millis(10));
        // b has never been used and gets the full recency boost.
        assert_eq!(lb.select_provider(&general(), &names(&["a", "b"])).unwrap(), "b");
    }

    #[test]
    fn test_low_priority_prefers_free_tier() {
        let mut affinity = AffinityTable::default();
        affinity.mark_free_tier("free");
        let lb = LoadBalancer::new(CircuitBreakerConfig::default(), affinity);
        let task = general().with_priority(Priority::Low);
        assert_eq!(lb.select_provider(&task, &names(&["paid", "free"])).unwrap(), "free");
    }

    #[test]
    fn test_reset_stats_closes_circuit() {
        let lb = balancer();
        for _ in 0..5 {
            lb.report_failure("a", "boom");
        }
        lb.reset_stats("a");
        let snap = lb.snapshot("a");
        assert_eq!(snap.circuit_state, CircuitState::Closed);
        assert_eq!(snap.stats.total_requests, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_reports_are_not_lost() {
        let lb = Arc::new(LoadBalancer::new(
            CircuitBreakerConfig {
                failure_threshold: u32::MAX,
                ..CircuitBreakerConfig::default()
            },
            AffinityTable::builtin(),
        ));
        let tasks: Vec<_> = (0..200)
            .map(|i| {
                let lb = Arc::clone(&lb);
                tokio::spawn(async move {
                    for _ in 0..5 {
                        if i % 3 == 0 {
                            lb.report_failure("a", "boom");
                        } else {
                            lb.report_success("a", Duration::from_millis(20));
                        }
                        tokio::task::yield_now().await;
                    }
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }

        let stats = lb.snapshot("a").stats;
        assert_eq!(stats.total_requests, 1000);
        assert_eq!(stats.success_count + stats.failure_count, stats.total_requests);
        assert_eq!(stats.failure_count, 67 * 5);
        assert!((stats.avg_latency_ms - 20.0).abs() < 1e-9);
    }
}
