//! Command implementations.
//!
//! Each command builds and initializes an orchestrator, does its work, and
//! always shuts the orchestrator down before returning.

use anyhow::{Context, Result};
use serde_json::json;
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use switchyard_config::Config;
use switchyard_dispatch::{Orchestrator, QueueStatus, TaskResult, WorkerStatus};
use switchyard_utils::{Priority, Task, TaskRequest, render_report};

use super::args::Commands;
use crate::ExitCode;

pub(crate) async fn execute(command: Commands, config: Config) -> Result<ExitCode> {
    match command {
        Commands::Run {
            prompt,
            system,
            task_type,
            priority,
            provider,
            timeout,
            sandbox,
            json,
        } => {
            let payload = match system {
                Some(system) => json!({ "prompt": prompt, "system": system }),
                None => json!(prompt),
            };
            let timeout = timeout
                .map(Duration::from_secs)
                .unwrap_or_else(|| config.default_timeout());
            let mut task = Task::new(task_type, payload)
                .with_priority(priority)
                .with_timeout(timeout)
                .with_sandbox(sandbox);
            if let Some(provider) = provider {
                task = task.with_provider(provider);
            }
            run_task(config, task, json).await
        }
        Commands::Batch {
            file,
            max_concurrent,
            json,
        } => {
            let tasks = load_batch(&file, config.default_timeout())?;
            let max_concurrent =
                max_concurrent.unwrap_or(config.orchestrator.batch_max_concurrent);
            run_batch(config, tasks, max_concurrent, json).await
        }
        Commands::Status { probe, json } => show_status(config, probe, json).await,
    }
}

async fn start(config: Config) -> Result<Orchestrator> {
    let orchestrator =
        Orchestrator::from_config(config).context("Failed to register provider adapters")?;
    orchestrator.initialize().await?;
    Ok(orchestrator)
}

async fn run_task(config: Config, task: Task, json: bool) -> Result<ExitCode> {
    let orchestrator = start(config).await?;
    let outcome = tokio::select! {
        result = orchestrator.execute_task(task) => Some(result),
        _ = tokio::signal::ctrl_c() => None,
    };
    orchestrator.shutdown().await;

    let Some(result) = outcome else {
        eprintln!("✗ Interrupted");
        return Ok(ExitCode::INTERRUPTED);
    };
    let result = result?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else if let Some(output) = &result.output {
        println!("{output}");
    }
    Ok(task_exit_code(&result, json))
}

/// Read a JSON array of task requests; a request without `timeout_ms` gets
/// `default_timeout`.
fn load_batch(path: &Path, default_timeout: Duration) -> Result<Vec<Task>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read batch file: {}", path.display()))?;
    let requests: Vec<TaskRequest> = serde_json::from_str(&content)
        .with_context(|| format!("Batch file is not a JSON array of tasks: {}", path.display()))?;

    requests
        .into_iter()
        .enumerate()
        .map(|(index, request)| {
            let use_default = request.timeout_ms.is_none();
            let mut task = Task::try_from(request)
                .with_context(|| format!("Invalid task at index {index}"))?;
            if use_default {
                task.timeout = default_timeout;
            }
            Ok(task)
        })
        .collect()
}

async fn run_batch(
    config: Config,
    tasks: Vec<Task>,
    max_concurrent: usize,
    json: bool,
) -> Result<ExitCode> {
    let total = tasks.len();
    let orchestrator = start(config).await?;
    let outcome = tokio::select! {
        results = orchestrator.execute_batch(tasks, max_concurrent) => Some(results),
        _ = tokio::signal::ctrl_c() => None,
    };
    orchestrator.shutdown().await;

    let Some(results) = outcome else {
        eprintln!("✗ Interrupted");
        return Ok(ExitCode::INTERRUPTED);
    };
    let results = results?;

    if json {
        println!("{}", serde_json::to_string_pretty(&results)?);
    } else {
        for result in &results {
            println!("{}", summary_line(result));
        }
    }

    let failed = results.iter().filter(|r| !r.success).count();
    tracing::info!(total, failed, "batch finished");
    if failed == 0 {
        Ok(ExitCode::SUCCESS)
    } else {
        if !json {
            eprintln!("✗ {failed} of {total} task(s) failed");
        }
        Ok(ExitCode::TASK_FAILED)
    }
}

async fn show_status(config: Config, probe: bool, json: bool) -> Result<ExitCode> {
    let orchestrator = start(config).await?;
    let snapshot = async {
        if probe {
            orchestrator.check_health_now().await?;
        }
        Ok::<_, anyhow::Error>((
            orchestrator.get_worker_status()?,
            orchestrator.get_queue_status()?,
        ))
    }
    .await;
    orchestrator.shutdown().await;
    let (workers, queues) = snapshot?;

    if json {
        let doc = json!({ "workers": workers, "queues": queues });
        println!("{}", serde_json::to_string_pretty(&doc)?);
    } else {
        print!("{}", format_status(&workers, &queues));
    }
    Ok(ExitCode::SUCCESS)
}

/// Exit code for a single-task run; prints the error report for failures in
/// text mode.
fn task_exit_code(result: &TaskResult, json: bool) -> ExitCode {
    match &result.error {
        None => ExitCode::SUCCESS,
        Some(err) => {
            if !json {
                eprintln!("{}", render_report(err));
            }
            ExitCode::from(err)
        }
    }
}

fn summary_line(result: &TaskResult) -> String {
    let provider = result.provider.as_deref().unwrap_or("-");
    let ms = result.duration.as_millis();
    match &result.error {
        None => format!(
            "✓ {} [{provider}] {ms}ms, {} attempt(s)",
            result.id, result.attempts
        ),
        Some(err) => format!("✗ {} [{provider}] {ms}ms: {err}", result.id),
    }
}

fn format_status(
    workers: &BTreeMap<String, WorkerStatus>,
    queues: &BTreeMap<Priority, QueueStatus>,
) -> String {
    let mut out = String::from("Providers:\n");
    for (name, w) in workers {
        let health = if w.healthy { "healthy" } else { "unhealthy" };
        let last_used = w
            .last_used
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| "never".to_string());
        out.push_str(&format!(
            "  {name:<12} {health:<9} circuit={:<9} success={:.0}% avg={:.0}ms requests={} last_used={last_used}{}\n",
            w.circuit_state,
            w.success_rate * 100.0,
            w.avg_latency_ms,
            w.total_requests,
            if w.in_flight { " (busy)" } else { "" },
        ));
    }
    out.push_str("Queues:\n");
    for (priority, q) in queues {
        out.push_str(&format!(
            "  {:<7} waiting={} running={}{}\n",
            priority.as_str(),
            q.size,
            q.pending,
            if q.paused { " (paused)" } else { "" },
        ));
    }
    out
}
