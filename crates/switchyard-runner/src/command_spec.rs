use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command as TokioCommand;

/// Specification for a command to execute.
///
/// Arguments are discrete `OsString` elements, never shell strings. Adapters
/// that want a shell must name it explicitly as the program.
///
/// ```rust
/// use switchyard_runner::CommandSpec;
/// use std::ffi::OsString;
///
/// let cmd = CommandSpec::new("claude")
///     .arg("--print")
///     .args(["--model", "sonnet"]);
///
/// assert_eq!(cmd.program, OsString::from("claude"));
/// assert_eq!(cmd.args.len(), 3);
/// ```
#[derive(Debug, Clone, Default)]
pub struct CommandSpec {
    pub program: OsString,
    pub args: Vec<OsString>,
    pub cwd: Option<PathBuf>,
    /// Extra environment for the child, layered over the inherited one.
    pub env: BTreeMap<OsString, OsString>,
}

impl CommandSpec {
    #[must_use]
    pub fn new(program: impl Into<OsString>) -> Self {
        Self {
            program: program.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    #[must_use]
    pub fn env(mut self, key: impl Into<OsString>, value: impl Into<OsString>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn envs<I, K, V>(mut self, envs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<OsString>,
        V: Into<OsString>,
    {
        for (key, value) in envs {
            self.env.insert(key.into(), value.into());
        }
        self
    }

    /// Program name for logs and error messages.
    #[must_use]
    pub fn display_program(&self) -> String {
        self.program.to_string_lossy().into_owned()
    }

    /// Build a tokio command with piped stdio, kill-on-drop, and (on Unix) a
    /// fresh process group led by the child.
    #[must_use]
    pub fn to_tokio_command(&self, pipe_stdin: bool) -> TokioCommand {
        let mut cmd = TokioCommand::new(&self.program);
        cmd.args(&self.args)
            .envs(&self.env)
            .stdin(if pipe_stdin {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(ref cwd) = self.cwd {
            cmd.current_dir(cwd);
        }

        #[cfg(unix)]
        {
            #[allow(unused_imports)]
            use std::os::unix::process::CommandExt;
            // SAFETY: setpgid is async-signal-safe and touches no parent state.
            unsafe {
                cmd.pre_exec(|| {
                    libc::setpgid(0, 0);
                    Ok(())
                });
            }
        }

        cmd
    }
}
