//! Upstream HTTP plumbing shared by the login flow and the query engine
//!
//! Holds the endpoint/bearer configuration (`ClientConfig`), the per-account
//! HTTP session (`Session`: headers + cookies), and the classification used to
//! decide between rotation, retry, and surfacing an error.

pub mod config;
pub mod session;

pub use config::{
    ClientConfig, DEFAULT_BEARER_TOKEN, DEFAULT_USER_AGENT, GQL_URL, GUEST_TOKEN_URL, LOGIN_URL,
};
pub use session::{CSRF_COOKIE, Session};

/// Classification of upstream responses to determine retry/rotation strategy.
///
/// - RateLimited records the queue quota and rotates to another account
/// - Permanent surfaces immediately (credentials rejected, bad request)
/// - Transient retries on the same account within the local retry budget
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorClassification {
    /// Retryable on the same account (timeouts, 5xx)
    Transient,
    /// Queue quota exhausted for this account, rotate
    RateLimited,
    /// Not retryable (401/403/other 4xx)
    Permanent,
}

/// Errors from building upstream requests.
#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    #[error("invalid header {name}: {message}")]
    InvalidHeader { name: String, message: String },
}

/// Result alias for upstream operations.
pub type Result<T> = std::result::Result<T, UpstreamError>;
