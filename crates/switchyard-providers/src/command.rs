//! Generic adapter for any CLI described by an argument template.

use switchyard_config::ProviderConfig;
use switchyard_runner::CommandSpec;
use switchyard_utils::Task;

use crate::prompt::extract_prompt;
use crate::types::{AdapterError, FailureKind, Invocation, ProviderAdapter, model_label};

/// Expands `{prompt}`, `{model}` and `{task_type}` in the configured `args`.
///
/// When no argument mentions `{prompt}` the prompt is written to stdin
/// instead. Sandboxed tasks see `SWITCHYARD_SANDBOX=1` in their environment.
#[derive(Debug, Clone, Default)]
pub struct CommandAdapter;

const PROMPT: &str = "{prompt}";

impl ProviderAdapter for CommandAdapter {
    fn kind(&self) -> &'static str {
        "command"
    }

    fn build_invocation(
        &self,
        task: &Task,
        config: &ProviderConfig,
    ) -> Result<Invocation, AdapterError> {
        if config.args.is_empty() {
            return Err(AdapterError::new(
                FailureKind::Misconfigured,
                format!("provider '{}' has no argument template", config.name),
            ));
        }

        let prompt = extract_prompt(&task.payload)?.combined();
        let model = model_label(config);
        let prompt_in_args = config.args.iter().any(|a| a.contains(PROMPT));

        let args = config.args.iter().map(|arg| {
            arg.replace(PROMPT, &prompt)
                .replace("{model}", &model)
                .replace("{task_type}", task.task_type.as_str())
        });

        let mut command = CommandSpec::new(&config.binary)
            .args(args)
            .envs(config.invocation_env());
        if task.sandbox {
            command = command.env("SWITCHYARD_SANDBOX", "1");
        }

        let invocation = Invocation::new(command, model);
        Ok(if prompt_in_args {
            invocation
        } else {
            invocation.with_stdin(prompt)
        })
    }
}
