use serde::Serialize;
use std::time::Duration;
use switchyard_providers::TokenUsage;

use crate::error::DispatchError;

/// Successful output of a single worker invocation.
#[derive(Debug, Clone)]
pub struct WorkerResult {
    pub output: String,
    pub provider: String,
    pub model: String,
    pub exit_code: i32,
    pub duration: Duration,
    pub tokens: Option<TokenUsage>,
}

/// Terminal outcome of a task after all retries.
#[derive(Debug, Clone, Serialize)]
pub struct TaskResult {
    pub id: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<DispatchError>,
    #[serde(rename = "duration_ms", serialize_with = "serialize_ms")]
    pub duration: Duration,
    pub provider: Option<String>,
    pub model: Option<String>,
    pub attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tokens: Option<TokenUsage>,
}

fn serialize_ms<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_millis() as u64)
}

impl TaskResult {
    pub(crate) fn succeeded(id: String, worker: WorkerResult, duration: Duration, attempts: u32) -> Self {
        Self {
            id,
            success: true,
            output: Some(worker.output),
            error: None,
            duration,
            provider: Some(worker.provider),
            model: Some(worker.model),
            attempts,
            tokens: worker.tokens,
        }
    }

    pub(crate) fn failed(
        id: String,
        error: DispatchError,
        provider: Option<String>,
        duration: Duration,
        attempts: u32,
    ) -> Self {
        Self {
            id,
            success: false,
            output: None,
            error: Some(error),
            duration,
            provider,
            model: None,
            attempts,
            tokens: None,
        }
    }
}
