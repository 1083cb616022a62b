//! Rate-limit detection for GraphQL responses
//!
//! A queue's quota is exhausted when the service answers 429, or answers 2xx
//! with an `errors` entry carrying code 88. The reset instant comes from the
//! `x-rate-limit-reset` header (epoch seconds).

use chrono::{DateTime, Utc};
use reqwest::header::HeaderMap;
use serde_json::Value;
use upstream::ErrorClassification;

pub const RATE_LIMIT_RESET_HEADER: &str = "x-rate-limit-reset";

/// GraphQL error code for "Rate limit exceeded".
pub const RATE_LIMIT_ERROR_CODE: i64 = 88;

/// Classify a non-success HTTP status.
///
/// 429 rotates to another account; 408/5xx retry on the same account;
/// every other status (401/403 included) is surfaced as-is.
pub fn classify_status(status: u16) -> ErrorClassification {
    match status {
        429 => ErrorClassification::RateLimited,
        408 | 500..=599 => ErrorClassification::Transient,
        _ => ErrorClassification::Permanent,
    }
}

/// Whether a 2xx body reports a rate limit through its `errors` list.
pub fn is_rate_limited_body(body: &Value) -> bool {
    body.get("errors")
        .and_then(Value::as_array)
        .is_some_and(|errors| {
            errors.iter().any(|e| {
                e.get("code").and_then(Value::as_i64) == Some(RATE_LIMIT_ERROR_CODE)
            })
        })
}

/// Reset instant announced by the response. Absent or unparseable → epoch.
pub fn reset_at(headers: &HeaderMap) -> DateTime<Utc> {
    headers
        .get(RATE_LIMIT_RESET_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<i64>().ok())
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
        .unwrap_or(DateTime::UNIX_EPOCH)
}
