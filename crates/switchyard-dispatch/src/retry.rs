use rand::Rng;
use std::time::Duration;
use switchyard_config::RetrySection;

/// Exponential backoff between task attempts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryConfig {
    /// Total attempts including the first.
    pub attempts: u32,
    pub factor: f64,
    pub min_backoff: Duration,
    pub max_backoff: Duration,
    /// Multiply each delay by a random factor in `[1, 2)`.
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            attempts: 3,
            factor: 2.0,
            min_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(5),
            jitter: true,
        }
    }
}

impl From<&RetrySection> for RetryConfig {
    fn from(section: &RetrySection) -> Self {
        Self {
            attempts: section.attempts.max(1),
            factor: section.factor,
            min_backoff: Duration::from_millis(section.min_backoff_ms),
            max_backoff: Duration::from_millis(section.max_backoff_ms),
            jitter: section.jitter,
        }
    }
}

impl RetryConfig {
    /// Delay before the retry that follows failed attempt number `failed`
    /// (1-based): `min * factor^(failed-1)`, jittered, capped at `max`.
    #[must_use]
    pub fn backoff(&self, failed: u32) -> Duration {
        let exponent = failed.saturating_sub(1).min(32) as i32;
        let mut millis = self.min_backoff.as_secs_f64() * 1000.0 * self.factor.powi(exponent);
        if self.jitter {
            millis *= rand::thread_rng().gen_range(1.0..2.0);
        }
        let capped = millis.min(self.max_backoff.as_secs_f64() * 1000.0).max(0.0);
        Duration::from_millis(capped as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_exponential_without_jitter() {
        let config = RetryConfig {
            jitter: false,
            ..RetryConfig::default()
        };
        assert_eq!(config.backoff(1), Duration::from_secs(1));
        assert_eq!(config.backoff(2), Duration::from_secs(2));
        assert_eq!(config.backoff(3), Duration::from_secs(4));
        assert_eq!(config.backoff(4), Duration::from_secs(5));
    }

    proptest! {
        #[test]
        fn prop_jittered_backoff_within_bounds(failed in 1u32..20) {
            let config = RetryConfig::default();
            let delay = config.backoff(failed);
            prop_assert!(delay >= config.min_backoff);
            prop_assert!(delay <= config.max_backoff);
        }
    }
}
