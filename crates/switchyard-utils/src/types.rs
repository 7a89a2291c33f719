use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use strum::{EnumIter, VariantNames};
use thiserror::Error;

/// Timeout applied to a task that does not carry its own.
pub const DEFAULT_TASK_TIMEOUT: Duration = Duration::from_secs(120);

/// Priority class of a task.
///
/// Each class is admitted through its own isolated queue, so a flood of
/// `Low` work never occupies `High` capacity.
///
/// ```rust
/// use switchyard_utils::types::Priority;
///
/// let p: Priority = "HIGH".parse().unwrap();
/// assert_eq!(p, Priority::High);
/// assert_eq!(p.as_str(), "high");
/// assert!("urgent".parse::<Priority>().is_err());
/// ```
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    EnumIter,
    VariantNames,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Priority {
    High,
    Normal,
    Low,
}

impl Priority {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Normal => "normal",
            Self::Low => "low",
        }
    }
}

impl Default for Priority {
    fn default() -> Self {
        Self::Normal
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = TaskValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "high" => Ok(Self::High),
            "normal" => Ok(Self::Normal),
            "low" => Ok(Self::Low),
            _ => Err(TaskValidationError::UnknownPriority(s.to_string())),
        }
    }
}

/// Kind of work a task asks for. Used by the load balancer's affinity table.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    EnumIter,
    VariantNames,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum TaskType {
    CodeGeneration,
    CodeReview,
    Refactoring,
    Debugging,
    Testing,
    Documentation,
    Reasoning,
    General,
}

impl TaskType {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::CodeGeneration => "code-generation",
            Self::CodeReview => "code-review",
            Self::Refactoring => "refactoring",
            Self::Debugging => "debugging",
            Self::Testing => "testing",
            Self::Documentation => "documentation",
            Self::Reasoning => "reasoning",
            Self::General => "general",
        }
    }
}

impl Default for TaskType {
    fn default() -> Self {
        Self::General
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskType {
    type Err = TaskValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('_', "-");
        match normalized.as_str() {
            "code-generation" | "codegen" => Ok(Self::CodeGeneration),
            "code-review" | "review" => Ok(Self::CodeReview),
            "refactoring" | "refactor" => Ok(Self::Refactoring),
            "debugging" | "debug" => Ok(Self::Debugging),
            "testing" | "test" => Ok(Self::Testing),
            "documentation" | "docs" => Ok(Self::Documentation),
            "reasoning" | "analysis" => Ok(Self::Reasoning),
            "general" => Ok(Self::General),
            _ => Err(TaskValidationError::UnknownTaskType(s.to_string())),
        }
    }
}

/// Which provider a task should run on.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum ProviderChoice {
    /// Let the load balancer pick, re-evaluated on every attempt.
    #[default]
    Auto,
    /// Pin the task to a named provider.
    Explicit(String),
}

impl ProviderChoice {
    #[must_use]
    pub fn explicit(&self) -> Option<&str> {
        match self {
            Self::Auto => None,
            Self::Explicit(name) => Some(name.as_str()),
        }
    }
}

impl fmt::Display for ProviderChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auto => f.write_str("auto"),
            Self::Explicit(name) => f.write_str(name),
        }
    }
}

impl FromStr for ProviderChoice {
    type Err = TaskValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(TaskValidationError::EmptyProvider);
        }
        if trimmed.eq_ignore_ascii_case("auto") {
            Ok(Self::Auto)
        } else {
            Ok(Self::Explicit(trimmed.to_string()))
        }
    }
}

impl Serialize for ProviderChoice {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// How the retry loop resolves a provider after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RetryPolicy {
    /// Every attempt goes to the provider resolved for the first attempt.
    SameProvider,
    /// Every attempt after the first runs load-balancer selection again.
    Reselect,
}

impl RetryPolicy {
    /// Policy used when a task does not set one: explicit providers stick,
    /// automatic routing reselects.
    #[must_use]
    pub fn default_for(choice: &ProviderChoice) -> Self {
        match choice {
            ProviderChoice::Auto => Self::Reselect,
            ProviderChoice::Explicit(_) => Self::SameProvider,
        }
    }
}

impl FromStr for RetryPolicy {
    type Err = TaskValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "same-provider" | "same" => Ok(Self::SameProvider),
            "reselect" => Ok(Self::Reselect),
            _ => Err(TaskValidationError::UnknownRetryPolicy(s.to_string())),
        }
    }
}

/// Reasons a task is rejected before it is queued.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TaskValidationError {
    #[error("unknown priority '{0}' (expected one of: high, normal, low)")]
    UnknownPriority(String),

    #[error("unknown task type '{0}'")]
    UnknownTaskType(String),

    #[error("unknown retry policy '{0}' (expected same-provider or reselect)")]
    UnknownRetryPolicy(String),

    #[error("provider name must not be empty")]
    EmptyProvider,

    #[error("task id must not be empty when provided")]
    EmptyId,

    #[error("task payload must not be null")]
    NullPayload,

    #[error("task timeout must be greater than zero")]
    ZeroTimeout,
}

/// A unit of work submitted to the orchestrator.
///
/// Tasks are immutable once submitted; the orchestrator assigns an id when
/// one is absent.
#[derive(Debug, Clone, Serialize)]
pub struct Task {
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub task_type: TaskType,
    /// Opaque to the dispatch layer; adapters decide how to read it.
    pub payload: serde_json::Value,
    pub priority: Priority,
    pub provider: ProviderChoice,
    #[serde(rename = "timeout_ms", serialize_with = "serialize_duration_ms")]
    pub timeout: Duration,
    pub sandbox: bool,
    pub retry_policy: Option<RetryPolicy>,
}

fn serialize_duration_ms<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_millis() as u64)
}

impl Task {
    #[must_use]
    pub fn new(task_type: TaskType, payload: serde_json::Value) -> Self {
        Self {
            id: None,
            task_type,
            payload,
            priority: Priority::Normal,
            provider: ProviderChoice::Auto,
            timeout: DEFAULT_TASK_TIMEOUT,
            sandbox: false,
            retry_policy: None,
        }
    }

    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    #[must_use]
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    #[must_use]
    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = ProviderChoice::Explicit(provider.into());
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_sandbox(mut self, sandbox: bool) -> Self {
        self.sandbox = sandbox;
        self
    }

    #[must_use]
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = Some(policy);
        self
    }

    /// Effective retry policy for this task.
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry_policy
            .unwrap_or_else(|| RetryPolicy::default_for(&self.provider))
    }

    /// Returns the task with an id, generating a v4 UUID when absent.
    #[must_use]
    pub fn ensure_id(mut self) -> Self {
        if self.id.is_none() {
            self.id = Some(uuid::Uuid::new_v4().to_string());
        }
        self
    }

    /// Id for logging; tasks that have not been submitted yet show as `-`.
    #[must_use]
    pub fn id_or_placeholder(&self) -> &str {
        self.id.as_deref().unwrap_or("-")
    }

    /// Structural checks that do not depend on orchestrator state.
    pub fn validate(&self) -> Result<(), TaskValidationError> {
        if matches!(self.id.as_deref(), Some(id) if id.trim().is_empty()) {
            return Err(TaskValidationError::EmptyId);
        }
        if self.payload.is_null() {
            return Err(TaskValidationError::NullPayload);
        }
        if self.timeout.is_zero() {
            return Err(TaskValidationError::ZeroTimeout);
        }
        if matches!(&self.provider, ProviderChoice::Explicit(name) if name.trim().is_empty()) {
            return Err(TaskValidationError::EmptyProvider);
        }
        Ok(())
    }
}

/// Loosely typed task submission, as read from JSON batch files or the CLI.
///
/// Conversion into [`Task`] is where unknown priorities and task types are
/// rejected.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct TaskRequest {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(rename = "type", default)]
    pub task_type: Option<String>,
    #[serde(default)]
    pub payload: serde_json::Value,
    #[serde(default)]
    pub priority: Option<String>,
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    #[serde(default)]
    pub sandbox: Option<bool>,
    #[serde(default)]
    pub retry: Option<String>,
}

impl TryFrom<TaskRequest> for Task {
    type Error = TaskValidationError;

    fn try_from(req: TaskRequest) -> Result<Self, Self::Error> {
        let task_type = match req.task_type.as_deref() {
            Some(raw) => raw.parse()?,
            None => TaskType::default(),
        };
        let priority = match req.priority.as_deref() {
            Some(raw) => raw.parse()?,
            None => Priority::default(),
        };
        let provider = match req.provider.as_deref() {
            Some(raw) => raw.parse()?,
            None => ProviderChoice::Auto,
        };
        let retry_policy = req.retry.as_deref().map(str::parse).transpose()?;

        let task = Task {
            id: req.id,
            task_type,
            payload: req.payload,
            priority,
            provider,
            timeout: req
                .timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(DEFAULT_TASK_TIMEOUT),
            sandbox: req.sandbox.unwrap_or(false),
            retry_policy,
        };
        task.validate()?;
        Ok(task)
    }
}
