//! Error types for pool operations

/// Errors from pool operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No account can ever serve the queue: pool empty, or every account
    /// inactive or locked for it.
    #[error("no accounts available for queue {queue}")]
    NoAccountsAvailable { queue: String },

    #[error("timed out waiting for an account for queue {queue}")]
    AcquireTimeout { queue: String },

    #[error("account not found: {0}")]
    NotFound(String),

    #[error("account store error: {0}")]
    Store(#[from] twitter_auth::Error),

    #[error(transparent)]
    Upstream(#[from] upstream::UpstreamError),
}

/// Result alias for pool operations.
pub type Result<T> = std::result::Result<T, Error>;
