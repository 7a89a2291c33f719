//! CLI argument definitions (clap derive).

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use switchyard_utils::{Priority, TaskType};

/// switchyard - dispatch prompts across CLI-driven LLM providers
#[derive(Debug, Parser)]
#[command(name = "switchyard")]
#[command(about = "Priority-aware task dispatch across CLI-driven LLM providers")]
#[command(long_about = r#"
switchyard routes tasks to LLM provider CLIs (claude, gemini, or any command)
through per-priority queues, picking providers by health, circuit state,
latency, recency, and task-type affinity, with retries and backoff.

EXAMPLES:
  # One prompt, provider chosen automatically
  switchyard run --prompt "Explain this stack trace" --type debugging

  # Pin a provider and emit the TaskResult as JSON
  switchyard run --prompt "Write a haiku" --provider gemini --json

  # Run a JSON array of task requests, at most 2 at a time
  switchyard batch tasks.json --max-concurrent 2

  # Probe providers, then show health, circuits, and queues
  switchyard status --probe

CONFIGURATION:
  --config PATH > $SWITCHYARD_CONFIG > switchyard.toml or .switchyard/config.toml
  (searched upward from CWD) > <user config dir>/switchyard/config.toml > defaults
"#)]
#[command(version)]
pub struct Cli {
    /// Path to configuration file (overrides discovery)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run a single prompt
    Run {
        /// Prompt text
        #[arg(long)]
        prompt: String,

        /// Optional system prompt
        #[arg(long)]
        system: Option<String>,

        /// Task type used for affinity scoring
        #[arg(long = "type", default_value = "general")]
        task_type: TaskType,

        /// Queue priority (high, normal, low)
        #[arg(long, default_value = "normal")]
        priority: Priority,

        /// Use this provider instead of automatic selection
        #[arg(long)]
        provider: Option<String>,

        /// Timeout in seconds (defaults to [orchestrator].default_timeout_secs)
        #[arg(long)]
        timeout: Option<u64>,

        /// Run the provider in its restricted mode
        #[arg(long)]
        sandbox: bool,

        /// Print the TaskResult as JSON
        #[arg(long)]
        json: bool,
    },

    /// Run a JSON array of task requests
    Batch {
        /// File containing `[{"type": ..., "payload": ..., "priority": ...}, ...]`
        file: PathBuf,

        /// Maximum tasks in flight (defaults to [orchestrator].batch_max_concurrent)
        #[arg(long)]
        max_concurrent: Option<usize>,

        /// Print results as a JSON array
        #[arg(long)]
        json: bool,
    },

    /// Show provider and queue status
    Status {
        /// Run one health probe round first
        #[arg(long)]
        probe: bool,

        /// Emit JSON
        #[arg(long)]
        json: bool,
    },
}
