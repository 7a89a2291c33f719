//! Structured logging setup.
//!
//! Library code only emits `tracing` events; binaries call [`init_tracing`]
//! once at startup.

use std::io::IsTerminal;
use tracing::{Level, span};
use tracing_subscriber::{
    EnvFilter,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

/// Environment variable selecting the log output format (`json` or `compact`).
pub const LOG_FORMAT_ENV: &str = "SWITCHYARD_LOG_FORMAT";

/// Output format for log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Compact,
    Json,
}

impl LogFormat {
    /// Reads [`LOG_FORMAT_ENV`], defaulting to compact output.
    #[must_use]
    pub fn from_env() -> Self {
        match std::env::var(LOG_FORMAT_ENV).ok().as_deref() {
            Some(v) if v.eq_ignore_ascii_case("json") => Self::Json,
            _ => Self::Compact,
        }
    }
}

/// Check if colored output should be used.
///
/// Returns true only if stderr is a terminal and `NO_COLOR` is not set.
fn use_color() -> bool {
    std::io::stderr().is_terminal() && std::env::var_os("NO_COLOR").is_none()
}

/// Default filter directives when `RUST_LOG` is not set.
#[must_use]
pub fn default_directives(verbose: bool) -> &'static str {
    if verbose {
        "switchyard=debug,info"
    } else {
        "switchyard=info,warn"
    }
}

/// Initialize the global tracing subscriber.
///
/// `RUST_LOG` takes precedence over the verbosity flag. Verbose mode adds the
/// event target and span-close timing events. Logs go to stderr so stdout stays
/// clean for JSON results.
pub fn init_tracing(verbose: bool) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_directives(verbose)))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let span_events = if verbose {
        FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    match LogFormat::from_env() {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    fmt::layer()
                        .json()
                        .with_writer(std::io::stderr)
                        .with_span_events(span_events)
                        .with_current_span(true),
                )
                .try_init()?;
        }
        LogFormat::Compact => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    fmt::layer()
                        .with_writer(std::io::stderr)
                        .with_ansi(use_color())
                        .with_target(verbose)
                        .with_thread_ids(false)
                        .with_line_number(false)
                        .with_file(false)
                        .with_span_events(span_events)
                        .compact(),
                )
                .try_init()?;
        }
    }

    Ok(())
}

/// Span wrapping one task from admission to its terminal result.
pub fn task_span(task_id: &str, priority: &str, task_type: &str) -> tracing::Span {
    span!(
        Level::INFO,
        "task",
        task_id = %task_id,
        priority = %priority,
        task_type = %task_type,
    )
}
