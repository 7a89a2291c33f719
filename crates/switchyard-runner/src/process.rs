use crate::command_spec::CommandSpec;
use crate::error::RunnerError;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::Child;
use tokio::task::JoinHandle;

/// Time between SIGTERM and SIGKILL when a child is being torn down.
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(5);

/// How long to wait for the stdout/stderr readers once the child has exited.
/// Grandchildren that inherited the pipes can keep them open indefinitely.
const READER_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

#[cfg(unix)]
const TERMINATION_POLL: Duration = Duration::from_millis(25);

/// Captured result of a finished child process.
#[derive(Debug, Clone)]
pub struct ProcessOutput {
    pub stdout: String,
    pub stderr: String,
    /// `None` when the child was terminated by a signal.
    pub exit_code: Option<i32>,
    pub duration: Duration,
}

impl ProcessOutput {
    #[must_use]
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// A spawned child whose output is being drained in the background.
#[derive(Debug)]
pub struct RunningProcess {
    child: Child,
    pid: Option<u32>,
    program: String,
    started: Instant,
    stdout: JoinHandle<Vec<u8>>,
    stderr: JoinHandle<Vec<u8>>,
    grace: Duration,
}

/// Spawn `spec`, optionally writing `stdin` to the child and closing it.
///
/// Must be called from within a Tokio runtime.
pub fn spawn(spec: &CommandSpec, stdin: Option<String>) -> Result<RunningProcess, RunnerError> {
    let program = spec.display_program();
    let mut cmd = spec.to_tokio_command(stdin.is_some());

    let mut child = cmd.spawn().map_err(|e| RunnerError::SpawnFailed {
        program: program.clone(),
        reason: e.to_string(),
    })?;
    let pid = child.id();

    if let (Some(input), Some(mut pipe)) = (stdin, child.stdin.take()) {
        let program = program.clone();
        tokio::spawn(async move {
            // The child may exit without reading; a broken pipe here is not fatal.
            if let Err(e) = pipe.write_all(input.as_bytes()).await {
                tracing::debug!(program = %program, error = %e, "stdin write failed");
            }
            let _ = pipe.shutdown().await;
        });
    }

    let stdout = drain(child.stdout.take());
    let stderr = drain(child.stderr.take());

    tracing::debug!(program = %program, pid = ?pid, "spawned child process");

    Ok(RunningProcess {
        child,
        pid,
        program,
        started: Instant::now(),
        stdout,
        stderr,
        grace: DEFAULT_GRACE_PERIOD,
    })
}

fn drain<R>(reader: Option<R>) -> JoinHandle<Vec<u8>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = Vec::new();
        if let Some(mut reader) = reader {
            let _ = reader.read_to_end(&mut buf).await;
        }
        buf
    })
}

async fn collect(mut handle: JoinHandle<Vec<u8>>) -> String {
    match tokio::time::timeout(READER_DRAIN_TIMEOUT, &mut handle).await {
        Ok(Ok(buf)) => String::from_utf8_lossy(&buf).into_owned(),
        Ok(Err(_)) => String::new(),
        Err(_) => {
            handle.abort();
            String::new()
        }
    }
}

impl RunningProcess {
    #[must_use]
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    #[must_use]
    pub fn with_grace_period(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    /// Wait for the child to exit, up to `timeout`.
    ///
    /// On timeout the process group receives SIGTERM immediately and the
    /// SIGKILL escalation continues on a background task, so the caller gets
    /// [`RunnerError::Timeout`] without waiting out the grace period.
    pub async fn wait(mut self, timeout: Duration) -> Result<ProcessOutput, RunnerError> {
        let waited = tokio::time::timeout(timeout, self.child.wait()).await;

        match waited {
            Ok(Ok(status)) => {
                let duration = self.started.elapsed();
                let stdout = collect(self.stdout).await;
                let stderr = collect(self.stderr).await;
                tracing::debug!(
                    program = %self.program,
                    exit_code = ?status.code(),
                    duration_ms = duration.as_millis() as u64,
                    "child process exited"
                );
                Ok(ProcessOutput {
                    stdout,
                    stderr,
                    exit_code: status.code(),
                    duration,
                })
            }
            Ok(Err(e)) => Err(RunnerError::WaitFailed {
                program: self.program,
                reason: e.to_string(),
            }),
            Err(_) => {
                self.stdout.abort();
                self.stderr.abort();
                tracing::warn!(
                    program = %self.program,
                    pid = ?self.pid,
                    timeout_ms = timeout.as_millis() as u64,
                    "child process timed out, terminating"
                );
                escalate(self.child, self.pid, self.grace);
                Err(RunnerError::Timeout { timeout })
            }
        }
    }
}

/// SIGTERM now, SIGKILL after `grace` unless the leader exited first.
fn escalate(mut child: Child, pid: Option<u32>, grace: Duration) {
    #[cfg(unix)]
    if let Some(pid) = pid {
        crate::unix::term_group(pid);
    }
    #[cfg(not(unix))]
    let _ = pid;

    tokio::spawn(async move {
        let exited = tokio::time::timeout(grace, child.wait()).await.is_ok();
        #[cfg(unix)]
        if let Some(pid) = pid {
            // Leftover group members die even when the leader honoured SIGTERM.
            crate::unix::kill_group(pid);
        }
        if !exited {
            let _ = child.kill().await;
        }
    });
}

/// Terminate the process group led by `pid`: SIGTERM, then SIGKILL if the
/// group is still alive after `grace`.
///
/// Returns `false` if the group no longer existed when SIGTERM was sent.
/// On non-Unix platforms this is a no-op; dropping the owning
/// [`RunningProcess`] kills the child instead.
pub async fn terminate_pid(pid: u32, grace: Duration) -> bool {
    #[cfg(unix)]
    {
        if !crate::unix::term_group(pid) {
            return false;
        }
        let deadline = tokio::time::Instant::now() + grace;
        while tokio::time::Instant::now() < deadline {
            if !crate::unix::group_alive(pid) {
                return true;
            }
            tokio::time::sleep(TERMINATION_POLL).await;
        }
        crate::unix::kill_group(pid);
        true
    }
    #[cfg(not(unix))]
    {
        let _ = (pid, grace);
        false
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str) -> CommandSpec {
        CommandSpec::new("sh").arg("-c").arg(script)
    }

    #[tokio::test]
    async fn test_captures_stdout_and_exit_code() {
        let out = spawn(&sh("echo hello; echo oops >&2; exit 3"), None)
            .unwrap()
            .wait(Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(out.stdout.trim(), "hello");
        assert_eq!(out.stderr.trim(), "oops");
        assert_eq!(out.exit_code, Some(3));
        assert!(!out.success());
    }

    #[tokio::test]
    async fn test_stdin_is_delivered() {
        let out = spawn(&CommandSpec::new("cat"), Some("from stdin".to_string()))
            .unwrap()
            .wait(Duration::from_secs(5))
            .await
            .unwrap();
        assert!(out.success());
        assert_eq!(out.stdout, "from stdin");
    }

    #[tokio::test]
    async fn test_timeout_returns_promptly() {
        let started = Instant::now();
        let err = spawn(&sh("sleep 5"), None)
            .unwrap()
            .with_grace_period(Duration::from_millis(100))
            .wait(Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(err.is_timeout());
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_missing_binary_is_spawn_error() {
        let err = spawn(&CommandSpec::new("switchyard-definitely-missing-binary"), None)
            .unwrap_err();
        assert!(matches!(err, RunnerError::SpawnFailed { .. }));
    }

    #[tokio::test]
    async fn test_terminate_pid_stops_group() {
        let proc = spawn(&sh("sleep 5"), None).unwrap();
        let pid = proc.pid().unwrap();
        let waiter = tokio::spawn(proc.wait(Duration::from_secs(10)));
        assert!(terminate_pid(pid, Duration::from_millis(50)).await);
        let out = waiter.await.unwrap().unwrap();
        assert!(!out.success());
    }
}
