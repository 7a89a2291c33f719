use serde_json::Value;

use crate::types::{AdapterError, FailureKind};

/// Prompt text pulled out of an opaque task payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub system: Option<String>,
    pub user: String,
}

impl Prompt {
    /// System and user text joined for CLIs without a separate system flag.
    #[must_use]
    pub fn combined(&self) -> String {
        match &self.system {
            Some(system) => format!("{system}\n\n{}", self.user),
            None => self.user.clone(),
        }
    }
}

/// Accepts a bare JSON string, or an object with a string `prompt` and an
/// optional string `system`.
pub fn extract_prompt(payload: &Value) -> Result<Prompt, AdapterError> {
    match payload {
        Value::String(s) => Ok(Prompt {
            system: None,
            user: s.clone(),
        }),
        Value::Object(map) => {
            let user = map
                .get("prompt")
                .and_then(Value::as_str)
                .ok_or_else(|| {
                    AdapterError::new(
                        FailureKind::InvalidPayload,
                        "payload object has no string 'prompt' field",
                    )
                })?
                .to_string();
            let system = map
                .get("system")
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(ToString::to_string);
            Ok(Prompt { system, user })
        }
        other => Err(AdapterError::new(
            FailureKind::InvalidPayload,
            format!("payload must be a string or an object, got {}", type_name(other)),
        )),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
