//! Failure classification from exit status and stderr.

use regex::Regex;
use std::sync::LazyLock;
use switchyard_runner::ProcessOutput;
use switchyard_utils::redaction::sanitize_stderr;

use crate::types::{AdapterError, FailureKind};

struct Rule {
    kind: FailureKind,
    pattern: Option<Regex>,
}

fn rule(kind: FailureKind, pattern: &str) -> Rule {
    Rule {
        kind,
        pattern: Regex::new(pattern).ok(),
    }
}

// Order matters: an auth failure that also mentions a 5xx is still auth.
static RULES: LazyLock<Vec<Rule>> = LazyLock::new(|| {
    vec![
        rule(
            FailureKind::Auth,
            r"(?i)\b(unauthori[sz]ed|invalid[ _-]?api[ _-]?key|authentication|not logged in|login required|forbidden|401|403)\b",
        ),
        rule(
            FailureKind::Quota,
            r"(?i)(rate[ _-]?limit|quota|too many requests|usage limit|insufficient (credits|balance)|\b429\b)",
        ),
        rule(
            FailureKind::Misconfigured,
            r"(?i)(unknown (option|flag|argument)|unrecognized (option|argument)|invalid model|model not found|no such model)",
        ),
        rule(
            FailureKind::Outage,
            r"(?i)(overloaded|service unavailable|bad gateway|internal server error|connection (refused|reset)|network (error|unreachable)|ETIMEDOUT|ECONNRESET|\b50[0234]\b)",
        ),
    ]
});

/// Classify a failed exit from its code and captured stderr.
#[must_use]
pub fn classify_failure(exit_code: Option<i32>, stderr: &str) -> FailureKind {
    for rule in RULES.iter() {
        if let Some(re) = &rule.pattern
            && re.is_match(stderr)
        {
            return rule.kind;
        }
    }
    match exit_code {
        // Shell conventions: not executable / not found.
        Some(126 | 127) => FailureKind::Misconfigured,
        _ => FailureKind::Crash,
    }
}

/// Build the error for a non-zero exit, with a redacted stderr tail.
#[must_use]
pub fn classify_output(output: &ProcessOutput) -> AdapterError {
    let kind = classify_failure(output.exit_code, &output.stderr);
    let tail = sanitize_stderr(&output.stderr);
    let message = match (output.exit_code, tail.is_empty()) {
        (Some(code), true) => format!("exited with code {code}"),
        (Some(code), false) => format!("exited with code {code}: {tail}"),
        (None, true) => "terminated by signal".to_string(),
        (None, false) => format!("terminated by signal: {tail}"),
    };
    AdapterError::new(kind, message).with_exit_code(output.exit_code)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn failed(code: Option<i32>, stderr: &str) -> ProcessOutput {
        ProcessOutput {
            stdout: String::new(),
            stderr: stderr.to_string(),
            exit_code: code,
            duration: Duration::from_millis(5),
        }
    }

    #[test]
    fn test_classifies_known_shapes() {
        assert_eq!(classify_failure(Some(1), "Error: Invalid API key"), FailureKind::Auth);
        assert_eq!(
            classify_failure(Some(1), "429 Too Many Requests"),
            FailureKind::Quota
        );
        assert_eq!(
            classify_failure(Some(1), "API Error: 529 overloaded"),
            FailureKind::Outage
        );
        assert_eq!(
            classify_failure(Some(2), "error: unknown option '--modle'"),
            FailureKind::Misconfigured
        );
    }

    #[test]
    fn test_falls_back_on_exit_code() {
        assert_eq!(classify_failure(Some(127), ""), FailureKind::Misconfigured);
        assert_eq!(classify_failure(Some(1), "segfault"), FailureKind::Crash);
        assert_eq!(classify_failure(None, ""), FailureKind::Crash);
    }

    #[test]
    fn test_classify_output_redacts_stderr() {
        let key = format!("sk-ant-{}", "x".repeat(30));
        let err = classify_output(&failed(Some(1), &format!("401 unauthorized for {key}")));
        assert_eq!(err.kind, FailureKind::Auth);
        assert_eq!(err.exit_code, Some(1));
        assert!(!err.message.contains(&key));
    }

    #[test]
    fn test_classify_output_signal_message() {
        let err = classify_output(&failed(None, ""));
        assert_eq!(err.message, "terminated by signal");
    }
}
