//! Static provider/task-type specialisation bonuses.

use std::collections::{HashMap, HashSet};
use std::str::FromStr;
use switchyard_config::Config;
use switchyard_utils::{Priority, Task, TaskType};

/// Upper bound on the affinity contribution to a score.
pub const MAX_AFFINITY: f64 = 10.0;

/// Extra bonus for free-tier providers on low-priority work.
pub const FREE_TIER_LOW_PRIORITY_BONUS: f64 = 5.0;

const BUILTIN: &[(&str, TaskType, f64)] = &[
    ("claude", TaskType::CodeGeneration, 5.0),
    ("claude", TaskType::Refactoring, 5.0),
    ("claude", TaskType::CodeReview, 3.0),
    ("claude", TaskType::Debugging, 3.0),
    ("gemini", TaskType::Documentation, 5.0),
    ("gemini", TaskType::Reasoning, 5.0),
    ("codex", TaskType::CodeGeneration, 5.0),
    ("codex", TaskType::Testing, 3.0),
];

#[derive(Debug, Clone, Default)]
pub struct AffinityTable {
    bonuses: HashMap<(String, TaskType), f64>,
    free_tier: HashSet<String>,
}

impl AffinityTable {
    #[must_use]
    pub fn builtin() -> Self {
        let mut table = Self::default();
        for (provider, task_type, bonus) in BUILTIN {
            table.set(*provider, *task_type, *bonus);
        }
        table
    }

    /// Built-in table plus `[affinity.*]` overrides and free-tier flags.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        let mut table = Self::builtin();
        for (provider, overrides) in &config.affinity {
            for (raw_type, bonus) in overrides {
                match TaskType::from_str(raw_type) {
                    Ok(task_type) => table.set(provider.clone(), task_type, *bonus),
                    Err(e) => tracing::warn!(provider = %provider, error = %e, "ignoring affinity entry"),
                }
            }
        }
        for (name, section) in &config.providers {
            if section.free_tier {
                table.free_tier.insert(name.clone());
            }
        }
        table
    }

    /// Set one entry, clamped to `[0, MAX_AFFINITY]`.
    pub fn set(&mut self, provider: impl Into<String>, task_type: TaskType, bonus: f64) {
        let bonus = if bonus.is_finite() {
            bonus.clamp(0.0, MAX_AFFINITY)
        } else {
            0.0
        };
        self.bonuses.insert((provider.into(), task_type), bonus);
    }

    pub fn mark_free_tier(&mut self, provider: impl Into<String>) {
        self.free_tier.insert(provider.into());
    }

    /// Bonus for running `task` on `provider`, capped at [`MAX_AFFINITY`].
    #[must_use]
    pub fn bonus(&self, provider: &str, task: &Task) -> f64 {
        let base = self
            .bonuses
            .get(&(provider.to_string(), task.task_type))
            .copied()
            .unwrap_or(0.0);
        let cheap = if task.priority == Priority::Low && self.free_tier.contains(provider) {
            FREE_TIER_LOW_PRIORITY_BONUS
        } else {
            0.0
        };
        (base + cheap).min(MAX_AFFINITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use switchyard_config::ProviderSection;

    fn task(task_type: TaskType, priority: Priority) -> Task {
        Task::new(task_type, json!("x")).with_priority(priority)
    }

    #[test]
    fn test_builtin_entries_in_range() {
        for (_, _, bonus) in BUILTIN {
            assert!((0.0..=MAX_AFFINITY).contains(bonus));
        }
    }

    #[test]
    fn test_builtin_lookup() {
        let table = AffinityTable::builtin();
        assert_eq!(table.bonus("claude", &task(TaskType::CodeGeneration, Priority::Normal)), 5.0);
        assert_eq!(table.bonus("claude", &task(TaskType::Documentation, Priority::Normal)), 0.0);
        assert_eq!(table.bonus("unknown", &task(TaskType::CodeGeneration, Priority::High)), 0.0);
    }

    #[test]
    fn test_free_tier_low_priority_bonus_is_capped() {
        let mut table = AffinityTable::builtin();
        table.set("gemini", TaskType::Reasoning, 8.0);
        table.mark_free_tier("gemini");
        assert_eq!(table.bonus("gemini", &task(TaskType::Reasoning, Priority::Low)), 10.0);
        assert_eq!(table.bonus("gemini", &task(TaskType::General, Priority::Low)), 5.0);
        assert_eq!(table.bonus("gemini", &task(TaskType::General, Priority::High)), 0.0);
    }

    #[test]
    fn test_config_overrides() {
        let config = Config::builder()
            .provider(
                "local",
                ProviderSection::command("llm", ["{prompt}"]).with_free_tier(true),
            )
            .affinity("local", TaskType::Testing, 7.0)
            .build()
            .unwrap();
        let table = AffinityTable::from_config(&config);
        assert_eq!(table.bonus("local", &task(TaskType::Testing, Priority::Normal)), 7.0);
        assert_eq!(table.bonus("local", &task(TaskType::Testing, Priority::Low)), 10.0);
    }

    #[test]
    fn test_set_clamps() {
        let mut table = AffinityTable::default();
        table.set("p", TaskType::General, 42.0);
        assert_eq!(table.bonus("p", &task(TaskType::General, Priority::Normal)), 10.0);
    }
}
