//! Adapter for the Gemini CLI (`gemini -p`).

use switchyard_config::ProviderConfig;
use switchyard_runner::CommandSpec;
use switchyard_utils::Task;

use crate::prompt::extract_prompt;
use crate::types::{AdapterError, Invocation, ProviderAdapter, model_label};

/// Prompt is passed with `-p`; stdout is treated as opaque text.
#[derive(Debug, Clone, Default)]
pub struct GeminiCliAdapter;

impl ProviderAdapter for GeminiCliAdapter {
    fn kind(&self) -> &'static str {
        "gemini-cli"
    }

    fn build_invocation(
        &self,
        task: &Task,
        config: &ProviderConfig,
    ) -> Result<Invocation, AdapterError> {
        let prompt = extract_prompt(&task.payload)?;

        let mut command = CommandSpec::new(&config.binary).arg("-p").arg(prompt.combined());
        if let Some(model) = &config.default_model {
            command = command.arg("--model").arg(model);
        }
        if task.sandbox {
            command = command.arg("--sandbox");
        }
        command = command.envs(config.invocation_env());

        Ok(Invocation::new(command, model_label(config)))
    }
}
