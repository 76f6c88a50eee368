//! Model error classification.
//!
//! Decides, per failed attempt, whether to retry the same model, advance
//! to the next model in the chain, or abort the run entirely. The
//! decision is made from the error value itself — a structured HTTP
//! status when present, otherwise a status code or known pattern found in
//! the message. Unknown errors are treated as non-retryable.

use std::sync::OnceLock;

use ens_domain::error::Error;
use regex::Regex;

/// Disposition of a failed model attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Transient: retry the same model after backoff.
    Retry,
    /// Permanent for this model: advance to the next one in the chain.
    Advance,
    /// The session is going away: stop the chain walk entirely.
    Abort,
}

/// HTTP statuses worth retrying on the same model.
const RETRYABLE_STATUSES: &[u16] = &[500, 502, 503, 504, 408];

/// Message substrings marking a transient failure.
const RETRYABLE_PATTERNS: &[&str] = &[
    "timeout",
    "timed out",
    "connection reset",
    "connection refused",
    "no such host",
    "temporary",
    "overloaded",
];

/// Message substrings marking a failure that retrying cannot fix.
const FATAL_PATTERNS: &[&str] = &[
    "rate limit",
    "too many requests",
    "throttl",
    "quota",
    "capacity",
    "invalid",
    "unauthorized",
    "authentication",
    "api key",
];

/// Classify a model error into its disposition.
pub fn classify(err: &Error) -> Disposition {
    match err {
        Error::Canceled => Disposition::Abort,
        Error::Timeout(_) => Disposition::Retry,
        Error::Http(message) => from_message(message),
        Error::Provider { status, message, .. } => {
            if let Some(code) = status {
                return from_status(*code);
            }
            from_message(message)
        }
        _ => Disposition::Advance,
    }
}

fn from_status(code: u16) -> Disposition {
    if RETRYABLE_STATUSES.contains(&code) {
        Disposition::Retry
    } else {
        // 429 and every other 4xx are permanent for this model; so is
        // anything we cannot place.
        Disposition::Advance
    }
}

fn from_message(message: &str) -> Disposition {
    // A bare 3-digit status embedded in the text is the strongest signal.
    if let Some(code) = extract_status(message) {
        return from_status(code);
    }

    let lower = message.to_ascii_lowercase();
    if FATAL_PATTERNS.iter().any(|p| lower.contains(p)) {
        return Disposition::Advance;
    }
    if RETRYABLE_PATTERNS.iter().any(|p| lower.contains(p)) {
        return Disposition::Retry;
    }
    Disposition::Advance
}

/// Find a 3-digit HTTP status in an unstructured error message.
fn extract_status(message: &str) -> Option<u16> {
    static STATUS_RE: OnceLock<Regex> = OnceLock::new();
    let re = STATUS_RE.get_or_init(|| Regex::new(r"\b([1-5]\d{2})\b").expect("static regex"));
    re.captures(message)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
