//! Adapter for the Claude CLI (`claude --print`).

use serde_json::Value;
use switchyard_config::ProviderConfig;
use switchyard_runner::{CommandSpec, ProcessOutput};
use switchyard_utils::Task;

use crate::prompt::extract_prompt;
use crate::types::{AdapterError, AdapterOutput, Invocation, ProviderAdapter, TokenUsage};

/// Prompt goes in on stdin; output is read as `stream-json`.
#[derive(Debug, Clone, Default)]
pub struct ClaudeCliAdapter;

#[derive(Debug, Default)]
struct StreamMetadata {
    model: Option<String>,
    input_tokens: Option<u64>,
    output_tokens: Option<u64>,
    final_result: Option<String>,
}

impl ClaudeCliAdapter {
    /// Parse `stream-json` output. Returns `None` when any non-empty line is
    /// not JSON, so the caller can fall back to treating stdout as text.
    fn parse_stream_json(output: &str) -> Option<(String, StreamMetadata)> {
        let mut content = String::new();
        let mut metadata = StreamMetadata::default();

        for line in output.lines().map(str::trim).filter(|l| !l.is_empty()) {
            let event: Value = serde_json::from_str(line).ok()?;

            match event.get("type").and_then(Value::as_str) {
                Some("content_block_delta") => {
                    if let Some(delta) = event
                        .get("delta")
                        .and_then(|d| d.get("text"))
                        .and_then(Value::as_str)
                    {
                        content.push_str(delta);
                    }
                }
                Some("message_stop") => {
                    if let Some(message) = event.get("message") {
                        read_usage(message.get("usage"), &mut metadata);
                        if let Some(model) = message.get("model").and_then(Value::as_str) {
                            metadata.model = Some(model.to_string());
                        }
                    }
                }
                Some("system") => {
                    if let Some(model) = event.get("model").and_then(Value::as_str) {
                        metadata.model.get_or_insert_with(|| model.to_string());
                    }
                }
                Some("result") => {
                    read_usage(event.get("usage"), &mut metadata);
                    metadata.final_result = event
                        .get("result")
                        .and_then(Value::as_str)
                        .map(ToString::to_string);
                }
                _ => {}
            }
        }

        Some((content, metadata))
    }
}

fn read_usage(usage: Option<&Value>, metadata: &mut StreamMetadata) {
    if let Some(usage) = usage {
        metadata.input_tokens = usage.get("input_tokens").and_then(Value::as_u64);
        metadata.output_tokens = usage.get("output_tokens").and_then(Value::as_u64);
    }
}

impl ProviderAdapter for ClaudeCliAdapter {
    fn kind(&self) -> &'static str {
        "claude-cli"
    }

    fn build_invocation(
        &self,
        task: &Task,
        config: &ProviderConfig,
    ) -> Result<Invocation, AdapterError> {
        let prompt = extract_prompt(&task.payload)?;
        let model = crate::types::model_label(config);

        let mut command = CommandSpec::new(&config.binary)
            .args(["--print", "--output-format", "stream-json", "--verbose"]);
        if let Some(m) = &config.default_model {
            command = command.arg("--model").arg(m);
        }
        if let Some(system) = &prompt.system {
            command = command.arg("--append-system-prompt").arg(system);
        }
        if task.sandbox {
            command = command.args(["--permission-mode", "plan"]);
        }
        command = command.envs(config.invocation_env());
        if let Some(url) = &config.base_url {
            command = command.env("ANTHROPIC_BASE_URL", url);
        }

        Ok(Invocation::new(command, model).with_stdin(prompt.user))
    }

    fn parse_output(
        &self,
        output: &ProcessOutput,
        model: &str,
    ) -> Result<AdapterOutput, AdapterError> {
        if !output.success() {
            return Err(crate::classify::classify_output(output));
        }

        let Some((content, metadata)) = Self::parse_stream_json(&output.stdout) else {
            tracing::debug!("claude output is not stream-json, using raw text");
            return Ok(AdapterOutput::text(output.stdout.trim_end(), model));
        };

        let text = if content.is_empty() {
            metadata.final_result.clone().unwrap_or_default()
        } else {
            content
        };
        let tokens = (metadata.input_tokens.is_some() || metadata.output_tokens.is_some()).then(
            || TokenUsage {
                input: metadata.input_tokens,
                output: metadata.output_tokens,
            },
        );

        Ok(AdapterOutput {
            text,
            model: metadata.model.unwrap_or_else(|| model.to_string()),
            tokens,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FailureKind;
    use serde_json::json;
    use std::collections::BTreeMap;
    use std::ffi::OsString;
    use std::time::Duration;
    use switchyard_utils::TaskType;

    fn config() -> ProviderConfig {
        ProviderConfig {
            name: "claude".to_string(),
            adapter: "claude-cli".to_string(),
            binary: "claude".to_string(),
            credentials: None,
            base_url: None,
            default_model: Some("sonnet".to_string()),
            env: BTreeMap::new(),
            args: vec![],
            probe_args: vec![],
            free_tier: false,
        }
    }

    fn exited(stdout: &str, code: i32) -> ProcessOutput {
        ProcessOutput {
            stdout: stdout.to_string(),
            stderr: String::new(),
            exit_code: Some(code),
            duration: Duration::from_millis(1),
        }
    }

    #[test]
    fn test_invocation_uses_stdin_and_model() {
        let task = Task::new(TaskType::CodeGeneration, json!({"prompt": "hi", "system": "sys"}))
            .with_sandbox(true);
        let inv = ClaudeCliAdapter.build_invocation(&task, &config()).unwrap();
        assert_eq!(inv.stdin.as_deref(), Some("hi"));
        assert_eq!(inv.model, "sonnet");
        let args: Vec<OsString> = inv.command.args.clone();
        assert!(args.contains(&OsString::from("stream-json")));
        assert!(args.contains(&OsString::from("--append-system-prompt")));
        assert!(args.contains(&OsString::from("plan")));
    }

    #[test]
    fn test_parses_stream_json() {
        let stdout = [
            r#"{"type":"content_block_delta","delta":{"text":"Hello"}}"#,
            r#"{"type":"content_block_delta","delta":{"text":", world"}}"#,
            r#"{"type":"message_stop","message":{"model":"claude-sonnet-4","usage":{"input_tokens":12,"output_tokens":3}}}"#,
        ]
        .join("\n");
        let out = ClaudeCliAdapter
            .parse_output(&exited(&stdout, 0), "sonnet")
            .unwrap();
        assert_eq!(out.text, "Hello, world");
        assert_eq!(out.model, "claude-sonnet-4");
        assert_eq!(
            out.tokens,
            Some(TokenUsage {
                input: Some(12),
                output: Some(3)
            })
        );
    }

    #[test]
    fn test_result_event_used_when_no_deltas() {
        let stdout = r#"{"type":"result","result":"done","usage":{"output_tokens":1}}"#;
        let out = ClaudeCliAdapter.parse_output(&exited(stdout, 0), "sonnet").unwrap();
        assert_eq!(out.text, "done");
        assert_eq!(out.model, "sonnet");
    }

    #[test]
    fn test_plain_text_fallback() {
        let out = ClaudeCliAdapter
            .parse_output(&exited("just text\n", 0), "sonnet")
            .unwrap();
        assert_eq!(out.text, "just text");
        assert!(out.tokens.is_none());
    }

    #[test]
    fn test_non_zero_exit_is_classified() {
        let mut failed = exited("", 1);
        failed.stderr = "Error: rate limit reached".to_string();
        let err = ClaudeCliAdapter.parse_output(&failed, "sonnet").unwrap_err();
        assert_eq!(err.kind, FailureKind::Quota);
    }
}
