//! Error types for GraphQL queries and page streams

/// Errors from queries and page streams.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Pool(#[from] twitter_pool::Error),

    /// Network failure or 5xx that outlasted the retry budget.
    #[error("{operation} via {account}: request failed: {message}")]
    Http {
        operation: String,
        account: String,
        message: String,
    },

    #[error("{operation} via {account}: upstream returned {status}: {body}")]
    Upstream {
        status: u16,
        operation: String,
        account: String,
        body: String,
    },

    /// Rate limited repeatedly with no future reset announced.
    #[error("{operation} via {account}: rate limited with no reset time")]
    RateLimited { operation: String, account: String },

    #[error("{operation}: malformed response: {message}")]
    Decode { operation: String, message: String },
}

/// Result alias for API operations.
pub type Result<T> = std::result::Result<T, Error>;
