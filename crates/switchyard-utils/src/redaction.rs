//! Secret scrubbing for provider output that ends up in logs or errors.

use regex::Regex;
use std::sync::LazyLock;

/// Maximum number of stderr bytes kept in logs and error payloads.
pub const STDERR_TAIL_BYTES: usize = 2048;

const REPLACEMENT: &str = "***";

static SECRET_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        // Anthropic / OpenAI style keys
        r"sk-(?:ant-)?[A-Za-z0-9_-]{20,}",
        // Google API keys
        r"AIza[0-9A-Za-z_-]{35}",
        // GitHub tokens
        r"gh[pousr]_[A-Za-z0-9]{36,}",
        // AWS access key ids
        r"AKIA[0-9A-Z]{16}",
        // Bearer tokens in echoed headers
        r"(?i)bearer\s+[A-Za-z0-9._~+/=-]{16,}",
    ]
    .iter()
    .filter_map(|p| Regex::new(p).ok())
    .collect()
});

static ASSIGNMENT_PATTERN: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"(?i)\b([A-Z0-9_]*(?:API_KEY|TOKEN|SECRET|PASSWORD)[A-Z0-9_]*)\s*[=:]\s*\S+").ok()
});

/// Replace anything that looks like a credential with `***`.
#[must_use]
pub fn redact_secrets(text: &str) -> String {
    let mut out = text.to_string();
    if let Some(assignment) = ASSIGNMENT_PATTERN.as_ref() {
        out = assignment
            .replace_all(&out, format!("${{1}}={REPLACEMENT}"))
            .into_owned();
    }
    for pattern in SECRET_PATTERNS.iter() {
        out = pattern.replace_all(&out, REPLACEMENT).into_owned();
    }
    out
}

/// Keep the last `max_bytes` of `text`, respecting UTF-8 boundaries.
#[must_use]
pub fn tail(text: &str, max_bytes: usize) -> String {
    if text.len() <= max_bytes {
        return text.to_string();
    }
    let mut start = text.len() - max_bytes;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    text[start..].to_string()
}

/// Redacted, truncated stderr suitable for logs and error messages.
#[must_use]
pub fn sanitize_stderr(stderr: &str) -> String {
    redact_secrets(&tail(stderr.trim(), STDERR_TAIL_BYTES))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_redacts_api_keys() {
        let key = format!("sk-ant-{}", "a".repeat(40));
        let redacted = redact_secrets(&format!("auth failed for key {key}"));
        assert!(!redacted.contains(&key));
        assert!(redacted.contains("***"));
    }

    #[test]
    fn test_redacts_assignments() {
        let redacted = redact_secrets("env: ANTHROPIC_API_KEY=abc123 other=1");
        assert!(redacted.contains("ANTHROPIC_API_KEY=***"));
        assert!(!redacted.contains("abc123"));
        assert!(redacted.contains("other=1"));
    }

    #[test]
    fn test_plain_text_untouched() {
        assert_eq!(redact_secrets("rate limit exceeded"), "rate limit exceeded");
    }

    #[test]
    fn test_tail_respects_char_boundaries() {
        let text = "ééééé";
        let t = tail(text, 3);
        assert!(t.len() <= 3);
        assert!(text.ends_with(&t));
    }

    proptest! {
        #[test]
        fn prop_tail_never_exceeds_limit(s in "\\PC{0,200}", max in 0usize..64) {
            let t = tail(&s, max);
            prop_assert!(t.len() <= max);
            prop_assert!(s.ends_with(&t));
        }
    }
}
