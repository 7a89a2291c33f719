//! End-to-end orchestrator behavior against real `sh -c` subprocesses.
//!
//! Providers are `command` adapters whose argument template runs the task
//! payload as a shell script, so each test controls exactly what the
//! "provider" does.

#![cfg(unix)]

use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};
use switchyard::{
    CircuitState, Config, ConfigBuilder, DispatchError, FailureKind, HealthProbe, Orchestrator,
    Priority, ProviderSection, RetryPolicy, Task, TaskRequest, TaskType,
};

fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
}

/// Runs the task payload.
fn shell() -> ProviderSection {
    ProviderSection::command("sh", ["-c", "{prompt}"])
}

/// Ignores the payload and exits with `code`.
fn failing(code: i32) -> ProviderSection {
    ProviderSection::command("sh", ["-c".to_string(), format!("cat >/dev/null; exit {code}")])
}

fn base() -> ConfigBuilder {
    Config::builder()
        .health_enabled(false)
        .retry_attempts(3)
        .backoff(ms(1), ms(5), 2.0)
        .jitter(false)
        .shutdown_grace(Duration::ZERO)
}

async fn start(config: Config) -> Orchestrator {
    let orchestrator = Orchestrator::from_config(config).unwrap();
    orchestrator.initialize().await.unwrap();
    orchestrator
}

fn script(s: &str) -> Task {
    Task::new(TaskType::General, json!(s)).with_timeout(Duration::from_secs(10))
}

#[tokio::test]
async fn test_single_task_succeeds() {
    let orch = start(base().provider("alpha", shell()).build().unwrap()).await;

    let result = orch
        .execute_task(script("echo hello").with_id("t-1"))
        .await
        .unwrap();
    assert!(result.success, "{result:?}");
    assert_eq!(result.id, "t-1");
    assert_eq!(result.output.as_deref(), Some("hello"));
    assert_eq!(result.provider.as_deref(), Some("alpha"));
    assert_eq!(result.attempts, 1);
    assert!(result.error.is_none());

    let status = orch.get_worker_status().unwrap();
    assert_eq!(status["alpha"].total_requests, 1);
    assert!(status["alpha"].last_used.is_some());
    orch.shutdown().await;
}

#[tokio::test]
async fn test_missing_id_is_generated() {
    let orch = start(base().provider("alpha", shell()).build().unwrap()).await;
    let result = orch.execute_task(script("echo x")).await.unwrap();
    assert!(!result.id.is_empty());
    orch.shutdown().await;
}

#[tokio::test]
async fn test_timeout_frees_the_queue_slot() {
    let config = base()
        .provider("alpha", shell())
        .provider("beta", shell())
        .retry_attempts(1)
        .queue(Priority::Normal, 1, 100, Duration::from_secs(1))
        .build()
        .unwrap();
    let orch = Arc::new(start(config).await);

    let slow = {
        let orch = Arc::clone(&orch);
        tokio::spawn(async move {
            orch.execute_task(
                script("sleep 30")
                    .with_provider("alpha")
                    .with_timeout(ms(200)),
            )
            .await
            .unwrap()
        })
    };
    tokio::time::sleep(ms(50)).await;

    let started = Instant::now();
    let quick = orch
        .execute_task(script("echo after").with_provider("beta"))
        .await
        .unwrap();
    assert!(quick.success);
    assert!(started.elapsed() < Duration::from_secs(5));

    let slow = slow.await.unwrap();
    assert!(!slow.success);
    assert!(matches!(
        slow.error,
        Some(DispatchError::TaskTimeout { ref provider, timeout_ms: 200 }) if provider == "alpha"
    ));
    assert_eq!(orch.get_queue_status().unwrap()[&Priority::Normal].pending, 0);
    orch.shutdown().await;
}

#[tokio::test]
async fn test_batch_results_follow_input_order() {
    let orch = start(
        base()
            .provider("alpha", shell())
            .provider("beta", shell())
            .build()
            .unwrap(),
    )
    .await;

    let tasks = vec![
        script("sleep 0.3; echo first").with_provider("alpha"),
        script("echo second").with_provider("beta"),
        script("sleep 0.1; echo third"),
        Task::new(TaskType::General, json!("echo bad")).with_timeout(Duration::ZERO),
    ];
    let results = orch.execute_batch(tasks, 3).await.unwrap();

    assert_eq!(results.len(), 4);
    let outputs: Vec<_> = results.iter().map(|r| r.output.as_deref()).collect();
    assert_eq!(
        outputs,
        vec![Some("first"), Some("second"), Some("third"), None]
    );
    assert!(matches!(
        results[3].error,
        Some(DispatchError::Validation { .. })
    ));
    orch.shutdown().await;
}

#[tokio::test]
async fn test_low_priority_backlog_does_not_block_high() {
    let config = base()
        .provider("alpha", shell())
        .provider("beta", shell())
        .queue(Priority::Low, 1, 100, Duration::from_secs(1))
        .build()
        .unwrap();
    let orch = Arc::new(start(config).await);

    let mut low = Vec::new();
    for _ in 0..2 {
        let orch = Arc::clone(&orch);
        low.push(tokio::spawn(async move {
            orch.execute_task(
                script("sleep 1; echo low")
                    .with_provider("alpha")
                    .with_priority(Priority::Low),
            )
            .await
            .unwrap()
        }));
    }
    tokio::time::sleep(ms(100)).await;

    let low_status = orch.get_queue_status().unwrap()[&Priority::Low];
    assert_eq!(low_status.pending, 1);
    assert_eq!(low_status.size, 1);

    let started = Instant::now();
    let high = orch
        .execute_task(
            script("echo high")
                .with_provider("beta")
                .with_priority(Priority::High),
        )
        .await
        .unwrap();
    assert!(high.success);
    assert!(started.elapsed() < ms(900));

    for handle in low {
        assert!(handle.await.unwrap().success);
    }
    orch.shutdown().await;
}

#[tokio::test]
async fn test_auto_selection_moves_away_from_failing_provider() {
    let orch = start(
        base()
            .provider("alpha", failing(3))
            .provider("beta", shell())
            .build()
            .unwrap(),
    )
    .await;

    let result = orch.execute_task(script("echo rescued")).await.unwrap();
    assert!(result.success, "{result:?}");
    assert_eq!(result.provider.as_deref(), Some("beta"));
    assert_eq!(result.attempts, 2);

    let status = orch.get_worker_status().unwrap();
    assert_eq!(status["alpha"].success_rate, 0.0);
    assert_eq!(status["alpha"].total_requests, 1);
    orch.shutdown().await;
}

#[tokio::test]
async fn test_explicit_provider_is_retried_unchanged() {
    let orch = start(
        base()
            .provider("alpha", failing(3))
            .provider("beta", shell())
            .build()
            .unwrap(),
    )
    .await;

    let result = orch
        .execute_task(script("echo never").with_provider("alpha"))
        .await
        .unwrap();
    assert!(!result.success);
    assert_eq!(result.attempts, 3);
    assert_eq!(result.provider.as_deref(), Some("alpha"));
    match result.error {
        Some(DispatchError::ProviderExecution {
            provider,
            failure,
            exit_code,
            ..
        }) => {
            assert_eq!(provider, "alpha");
            assert_eq!(failure, FailureKind::Crash);
            assert_eq!(exit_code, Some(3));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(orch.get_worker_status().unwrap()["beta"].total_requests, 0);
    orch.shutdown().await;
}

#[tokio::test]
async fn test_reselect_policy_leaves_explicit_provider() {
    let orch = start(
        base()
            .provider("alpha", failing(3))
            .provider("beta", shell())
            .build()
            .unwrap(),
    )
    .await;

    let result = orch
        .execute_task(
            script("echo moved")
                .with_provider("alpha")
                .with_retry_policy(RetryPolicy::Reselect),
        )
        .await
        .unwrap();
    assert!(result.success);
    assert_eq!(result.provider.as_deref(), Some("beta"));
    orch.shutdown().await;
}

#[tokio::test]
async fn test_open_circuit_ends_explicit_retries() {
    let orch = start(
        base()
            .provider("alpha", failing(1))
            .circuit_breaker(2, Duration::from_secs(60), 1)
            .build()
            .unwrap(),
    )
    .await;

    let result = orch
        .execute_task(script("echo x").with_provider("alpha"))
        .await
        .unwrap();
    assert_eq!(result.attempts, 3);
    assert_eq!(
        result.error,
        Some(DispatchError::NoHealthyProvider {
            requested: Some("alpha".into())
        })
    );
    assert_eq!(
        orch.get_worker_status().unwrap()["alpha"].circuit_state,
        CircuitState::Open
    );

    // Fails fast while the circuit stays open.
    let again = orch
        .execute_task(script("echo x").with_provider("alpha"))
        .await
        .unwrap();
    assert_eq!(again.attempts, 1);

    orch.reset_stats("alpha").unwrap();
    let status = orch.get_worker_status().unwrap();
    assert_eq!(status["alpha"].circuit_state, CircuitState::Closed);
    assert_eq!(status["alpha"].total_requests, 0);
    orch.shutdown().await;
}

#[tokio::test]
async fn test_invalid_payload_is_not_retried() {
    let orch = start(base().provider("alpha", shell()).build().unwrap()).await;

    let task = Task::new(TaskType::General, json!({ "text": "no prompt field" }));
    let result = orch.execute_task(task).await.unwrap();
    assert_eq!(result.attempts, 1);
    assert!(matches!(
        result.error,
        Some(DispatchError::ProviderExecution {
            failure: FailureKind::InvalidPayload,
            ..
        })
    ));
    orch.shutdown().await;
}

#[tokio::test]
async fn test_invalid_payloads_leave_provider_stats_untouched() {
    let orch = start(
        base()
            .provider("alpha", shell())
            .circuit_breaker(2, Duration::from_secs(60), 1)
            .build()
            .unwrap(),
    )
    .await;

    for _ in 0..4 {
        let task = Task::new(TaskType::General, json!({ "text": "no prompt field" }))
            .with_provider("alpha");
        assert!(!orch.execute_task(task).await.unwrap().success);
    }

    let status = orch.get_worker_status().unwrap();
    assert_eq!(status["alpha"].total_requests, 0);
    assert_eq!(status["alpha"].circuit_state, CircuitState::Closed);

    let ok = orch
        .execute_task(script("echo fine").with_provider("alpha"))
        .await
        .unwrap();
    assert!(ok.success, "{ok:?}");
    orch.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_auto_tasks_spread_across_providers() {
    let orch = Arc::new(
        start(
            base()
                .provider("alpha", shell())
                .provider("beta", shell())
                .build()
                .unwrap(),
        )
        .await,
    );

    let started = Instant::now();
    let handles: Vec<_> = (0..3)
        .map(|_| {
            let orch = Arc::clone(&orch);
            tokio::spawn(async move {
                orch.execute_task(script("sleep 0.5; echo done")).await.unwrap()
            })
        })
        .collect();

    let mut providers = Vec::new();
    for handle in handles {
        let result = handle.await.unwrap();
        assert!(result.success, "{result:?}");
        providers.push(result.provider.unwrap());
    }
    let elapsed = started.elapsed();

    assert!(providers.iter().any(|p| p == "alpha"), "{providers:?}");
    assert!(providers.iter().any(|p| p == "beta"), "{providers:?}");
    // Two rounds of 0.5s with both slots in use, not three serialized runs.
    assert!(elapsed < ms(1400), "took {elapsed:?}");
    orch.shutdown().await;
}

/// Reports `down` as failing and everything else as reachable.
struct ScriptedHealth {
    down: &'static str,
}

#[async_trait]
impl HealthProbe for ScriptedHealth {
    async fn probe(&self, provider: &str) -> Result<(), String> {
        if provider == self.down {
            Err("connection refused".into())
        } else {
            Ok(())
        }
    }
}

#[tokio::test]
async fn test_unhealthy_provider_is_routed_around() {
    let config = base()
        .health_enabled(true)
        .health_interval(Duration::from_secs(3600))
        .provider("alpha", shell())
        .provider("beta", shell())
        .build()
        .unwrap();
    let orch = Orchestrator::from_config(config)
        .unwrap()
        .with_probe(Arc::new(ScriptedHealth { down: "alpha" }));
    orch.initialize().await.unwrap();

    // Ties go to the first provider while both are healthy.
    let before = orch.execute_task(script("echo one")).await.unwrap();
    assert_eq!(before.provider.as_deref(), Some("alpha"));

    for _ in 0..3 {
        assert!(orch.check_health_now().await.unwrap());
    }
    let status = orch.get_worker_status().unwrap();
    assert!(!status["alpha"].healthy);
    assert!(status["beta"].healthy);
    assert_eq!(status["alpha"].circuit_state, CircuitState::Closed);

    for _ in 0..2 {
        let result = orch.execute_task(script("echo two")).await.unwrap();
        assert!(result.success, "{result:?}");
        assert_eq!(result.provider.as_deref(), Some("beta"));
    }
    orch.shutdown().await;
}

#[tokio::test]
async fn test_shutdown_cancels_running_and_queued_tasks() {
    let config = base()
        .provider("alpha", shell())
        .queue(Priority::Normal, 1, 100, Duration::from_secs(1))
        .build()
        .unwrap();
    let orch = Arc::new(start(config).await);

    let mut handles = Vec::new();
    for _ in 0..2 {
        let orch = Arc::clone(&orch);
        handles.push(tokio::spawn(async move {
            orch.execute_task(script("sleep 30")).await.unwrap()
        }));
    }
    tokio::time::sleep(ms(200)).await;

    let started = Instant::now();
    orch.shutdown().await;
    for handle in handles {
        let result = handle.await.unwrap();
        assert_eq!(result.error, Some(DispatchError::Shutdown));
    }
    assert!(started.elapsed() < Duration::from_secs(5));

    assert_eq!(
        orch.execute_task(script("echo late")).await.unwrap_err(),
        DispatchError::NotInitialized
    );
}

#[tokio::test]
async fn test_unusable_providers_are_skipped_and_empty_pool_fails() {
    let config = base()
        .provider("ghost", ProviderSection::command("/nonexistent/llm", ["{prompt}"]))
        .provider("alpha", shell())
        .build()
        .unwrap();
    let orch = start(config).await;
    let names: Vec<_> = orch.get_worker_status().unwrap().into_keys().collect();
    assert_eq!(names, vec!["alpha"]);
    orch.shutdown().await;

    let config = base()
        .provider("ghost", ProviderSection::command("/nonexistent/llm", ["{prompt}"]))
        .build()
        .unwrap();
    let orch = Orchestrator::from_config(config).unwrap();
    assert_eq!(
        orch.initialize().await.unwrap_err(),
        DispatchError::EmptyPool {
            rejected: vec!["ghost".into()]
        }
    );
}

#[tokio::test]
async fn test_request_from_toml_config() {
    let config = Config::from_toml_str(
        r#"
        [orchestrator]
        providers = ["local"]
        default_timeout_secs = 7

        [health]
        enabled = false

        [providers.local]
        adapter = "command"
        binary = "sh"
        args = ["-c", "printf '%s|%s' \"$0\" {task_type}", "{prompt}"]
        "#,
    )
    .unwrap();
    let orch = start(config).await;

    let request: TaskRequest = serde_json::from_value(json!({
        "id": "req-1",
        "type": "testing",
        "payload": { "prompt": "check" },
        "priority": "high"
    }))
    .unwrap();
    let result = orch.execute_request(request).await.unwrap();
    assert!(result.success, "{result:?}");
    assert_eq!(result.output.as_deref(), Some("check|testing"));
    orch.shutdown().await;
}
