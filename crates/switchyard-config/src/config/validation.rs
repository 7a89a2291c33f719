use std::str::FromStr;
use switchyard_utils::{Priority, TaskType};

use super::{Config, KNOWN_ADAPTERS};
use crate::error::ConfigError;

/// Upper bound for any per-task or probe timeout.
const MAX_TIMEOUT_SECS: u64 = 3600;
const MAX_AFFINITY_BONUS: f64 = 10.0;

impl Config {
    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_orchestrator()?;
        self.validate_retry()?;
        self.validate_circuit_breaker()?;
        self.validate_health()?;
        self.validate_queues()?;
        self.validate_providers()?;
        self.validate_affinity()
    }

    fn validate_orchestrator(&self) -> Result<(), ConfigError> {
        let o = &self.orchestrator;
        if o.default_timeout_secs == 0 || o.default_timeout_secs > MAX_TIMEOUT_SECS {
            return Err(ConfigError::invalid(
                "orchestrator.default_timeout_secs",
                format!("must be between 1 and {MAX_TIMEOUT_SECS}"),
            ));
        }
        if o.shutdown_grace_secs > 60 {
            return Err(ConfigError::invalid(
                "orchestrator.shutdown_grace_secs",
                "exceeds maximum of 60 seconds",
            ));
        }
        if o.batch_max_concurrent == 0 {
            return Err(ConfigError::invalid(
                "orchestrator.batch_max_concurrent",
                "must be greater than 0",
            ));
        }
        if let Some(names) = &o.providers {
            if names.is_empty() {
                return Err(ConfigError::invalid(
                    "orchestrator.providers",
                    "must list at least one provider",
                ));
            }
            for (i, name) in names.iter().enumerate() {
                if names[..i].contains(name) {
                    return Err(ConfigError::invalid(
                        "orchestrator.providers",
                        format!("provider '{name}' is listed twice"),
                    ));
                }
                if !self.providers.contains_key(name) {
                    return Err(ConfigError::UnknownProvider { name: name.clone() });
                }
            }
        }
        Ok(())
    }

    fn validate_retry(&self) -> Result<(), ConfigError> {
        let r = &self.retry;
        if r.attempts == 0 || r.attempts > 10 {
            return Err(ConfigError::invalid("retry.attempts", "must be between 1 and 10"));
        }
        if !r.factor.is_finite() || r.factor < 1.0 {
            return Err(ConfigError::invalid("retry.factor", "must be a number >= 1.0"));
        }
        if r.min_backoff_ms > r.max_backoff_ms {
            return Err(ConfigError::invalid(
                "retry.min_backoff_ms",
                "must not exceed retry.max_backoff_ms",
            ));
        }
        Ok(())
    }

    fn validate_circuit_breaker(&self) -> Result<(), ConfigError> {
        let cb = &self.circuit_breaker;
        if cb.failure_threshold == 0 {
            return Err(ConfigError::invalid(
                "circuit_breaker.failure_threshold",
                "must be greater than 0",
            ));
        }
        if cb.success_threshold == 0 {
            return Err(ConfigError::invalid(
                "circuit_breaker.success_threshold",
                "must be greater than 0",
            ));
        }
        if cb.reset_timeout_secs > MAX_TIMEOUT_SECS {
            return Err(ConfigError::invalid(
                "circuit_breaker.reset_timeout_secs",
                format!("exceeds maximum of {MAX_TIMEOUT_SECS} seconds"),
            ));
        }
        Ok(())
    }

    fn validate_health(&self) -> Result<(), ConfigError> {
        let h = &self.health;
        if h.interval_secs == 0 {
            return Err(ConfigError::invalid("health.interval_secs", "must be greater than 0"));
        }
        if h.probe_timeout_secs == 0 || h.probe_timeout_secs > MAX_TIMEOUT_SECS {
            return Err(ConfigError::invalid(
                "health.probe_timeout_secs",
                format!("must be between 1 and {MAX_TIMEOUT_SECS}"),
            ));
        }
        if h.healthy_threshold == 0 || h.unhealthy_threshold == 0 {
            return Err(ConfigError::invalid(
                "health.healthy_threshold",
                "health thresholds must be greater than 0",
            ));
        }
        Ok(())
    }

    fn validate_queues(&self) -> Result<(), ConfigError> {
        for priority in [Priority::High, Priority::Normal, Priority::Low] {
            let limits = self.queues.limits(priority);
            if limits.concurrency == 0 {
                return Err(ConfigError::invalid(
                    format!("queues.{priority}.concurrency"),
                    "must be greater than 0",
                ));
            }
            if limits.interval_cap == 0 {
                return Err(ConfigError::invalid(
                    format!("queues.{priority}.interval_cap"),
                    "must be greater than 0",
                ));
            }
            if limits.interval.is_zero() {
                return Err(ConfigError::invalid(
                    format!("queues.{priority}.interval_ms"),
                    "must be greater than 0",
                ));
            }
        }
        Ok(())
    }

    fn validate_providers(&self) -> Result<(), ConfigError> {
        for (name, section) in &self.providers {
            let adapter = section.adapter_kind(name);
            if !KNOWN_ADAPTERS.contains(&adapter.as_str()) {
                return Err(ConfigError::invalid(
                    format!("providers.{name}.adapter"),
                    format!(
                        "unknown adapter '{adapter}' (expected one of: {})",
                        KNOWN_ADAPTERS.join(", ")
                    ),
                ));
            }
            if adapter == "command" && section.args.is_empty() {
                return Err(ConfigError::invalid(
                    format!("providers.{name}.args"),
                    "the command adapter needs an argument template",
                ));
            }
            if section.binary.as_deref().is_some_and(str::is_empty) {
                return Err(ConfigError::invalid(
                    format!("providers.{name}.binary"),
                    "must not be empty",
                ));
            }
        }
        Ok(())
    }

    fn validate_affinity(&self) -> Result<(), ConfigError> {
        for (provider, table) in &self.affinity {
            for (task_type, bonus) in table {
                let key = format!("affinity.{provider}.{task_type}");
                if TaskType::from_str(task_type).is_err() {
                    return Err(ConfigError::invalid(key, "unknown task type"));
                }
                if !bonus.is_finite() || !(0.0..=MAX_AFFINITY_BONUS).contains(bonus) {
                    return Err(ConfigError::invalid(
                        key,
                        format!("bonus must be within [0, {MAX_AFFINITY_BONUS}]"),
                    ));
                }
            }
        }
        Ok(())
    }
}
