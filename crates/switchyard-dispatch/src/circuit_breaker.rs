//! Per-provider circuit breaker.
//!
//! Timer-free: the OPEN to HALF_OPEN transition happens lazily inside
//! [`CircuitBreaker::is_open`] once the reset timeout has elapsed.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, Instant};
use switchyard_config::CircuitBreakerSection;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            Self::Closed => "CLOSED",
            Self::Open => "OPEN",
            Self::HalfOpen => "HALF_OPEN",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub reset_timeout: Duration,
    pub success_threshold: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout: Duration::from_secs(60),
            success_threshold: 3,
        }
    }
}

impl From<&CircuitBreakerSection> for CircuitBreakerConfig {
    fn from(section: &CircuitBreakerSection) -> Self {
        Self {
            failure_threshold: section.failure_threshold,
            reset_timeout: Duration::from_secs(section.reset_timeout_secs),
            success_threshold: section.success_threshold,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    state: CircuitState,
    failure_count: u32,
    half_open_successes: u32,
    last_failure: Option<Instant>,
}

impl CircuitBreaker {
    #[must_use]
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            state: CircuitState::Closed,
            failure_count: 0,
            half_open_successes: 0,
            last_failure: None,
        }
    }

    /// Current state without evaluating the reset timeout.
    #[must_use]
    pub fn state(&self) -> CircuitState {
        self.state
    }

    #[must_use]
    pub fn failure_count(&self) -> u32 {
        self.failure_count
    }

    pub fn is_open(&mut self) -> bool {
        self.is_open_at(Instant::now())
    }

    /// Whether the circuit rejects traffic at `now`. Moves OPEN to HALF_OPEN
    /// once `reset_timeout` has passed since the last failure.
    pub fn is_open_at(&mut self, now: Instant) -> bool {
        if self.state == CircuitState::Open {
            let elapsed = self
                .last_failure
                .map_or(Duration::MAX, |at| now.saturating_duration_since(at));
            if elapsed > self.config.reset_timeout {
                self.state = CircuitState::HalfOpen;
                self.half_open_successes = 0;
            }
        }
        self.state == CircuitState::Open
    }

    pub fn record_success(&mut self) {
        match self.state {
            CircuitState::HalfOpen => {
                self.half_open_successes += 1;
                if self.half_open_successes >= self.config.success_threshold {
                    self.state = CircuitState::Closed;
                    self.failure_count = 0;
                    self.half_open_successes = 0;
                }
            }
            CircuitState::Closed => self.failure_count = 0,
            // A late success from a call admitted before the circuit opened.
            CircuitState::Open => {}
        }
    }

    pub fn record_failure(&mut self) {
        self.record_failure_at(Instant::now());
    }

    pub fn record_failure_at(&mut self, now: Instant) {
        self.last_failure = Some(now);
        match self.state {
            CircuitState::HalfOpen => {
                self.state = CircuitState::Open;
                self.half_open_successes = 0;
            }
            CircuitState::Closed => {
                self.failure_count += 1;
                if self.failure_count >= self.config.failure_threshold {
                    self.state = CircuitState::Open;
                }
            }
            CircuitState::Open => self.failure_count += 1,
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new(self.config);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn breaker() -> CircuitBreaker {
        CircuitBreaker::new(CircuitBreakerConfig::default())
    }

    #[test]
    fn test_opens_after_threshold() {
        let mut cb = breaker();
        let now = Instant::now();
        for _ in 0..4 {
            cb.record_failure_at(now);
            assert!(!cb.is_open_at(now));
        }
        cb.record_failure_at(now);
        assert!(cb.is_open_at(now));
        assert_eq!(cb.state(), CircuitState::Open);
    }

    #[test]
    fn test_success_resets_failure_count_when_closed() {
        let mut cb = breaker();
        for _ in 0..4 {
            cb.record_failure();
        }
        cb.record_success();
        assert_eq!(cb.failure_count(), 0);
        cb.record_failure();
        assert!(!cb.is_open());
    }

    #[test]
    fn test_half_open_after_reset_timeout() {
        let mut cb = breaker();
        let t0 = Instant::now();
        for _ in 0..5 {
            cb.record_failure_at(t0);
        }
        assert!(cb.is_open_at(t0 + Duration::from_secs(60)));
        assert!(!cb.is_open_at(t0 + Duration::from_secs(61)));
        assert_eq!(cb.state(), CircuitState::HalfOpen);
    }

    #[test]
    fn test_half_open_closes_after_successes() {
        let mut cb = breaker();
        let t0 = Instant::now();
        for _ in 0..5 {
            cb.record_failure_at(t0);
        }
        assert!(!cb.is_open_at(t0 + Duration::from_secs(61)));
        cb.record_success();
        cb.record_success();
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        cb.record_success();
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.failure_count(), 0);
    }

    #[test]
    fn test_half_open_failure_reopens() {
        let mut cb = breaker();
        let t0 = Instant::now();
        for _ in 0..5 {
            cb.record_failure_at(t0);
        }
        let t1 = t0 + Duration::from_secs(61);
        assert!(!cb.is_open_at(t1));
        cb.record_success();
        cb.record_failure_at(t1);
        assert_eq!(cb.state(), CircuitState::Open);
        assert!(cb.is_open_at(t1 + Duration::from_secs(1)));
        // Needs a full reset timeout from the new failure before the next trial.
        assert!(!cb.is_open_at(t1 + Duration::from_secs(61)));
    }

    proptest! {
        #[test]
        fn prop_consecutive_failures_open_circuit(n in 5u32..40) {
            let mut cb = breaker();
            let now = Instant::now();
            for _ in 0..n {
                cb.record_failure_at(now);
            }
            prop_assert!(cb.is_open_at(now));
        }

        #[test]
        fn prop_half_open_only_reachable_from_open(
            ops in proptest::collection::vec(0u8..3, 0..60)
        ) {
            let mut cb = breaker();
            let mut now = Instant::now();
            for op in ops {
                let before = cb.state();
                match op {
                    0 => cb.record_success(),
                    1 => cb.record_failure_at(now),
                    _ => {
                        now += Duration::from_secs(61);
                        cb.is_open_at(now);
                    }
                }
                if cb.state() == CircuitState::HalfOpen && before != CircuitState::HalfOpen {
                    prop_assert_eq!(before, CircuitState::Open);
                }
            }
        }
    }
}
