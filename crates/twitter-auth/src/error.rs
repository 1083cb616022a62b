//! Error types for account storage and the login flow

/// Errors from account storage and login operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("upstream returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("protocol violation: {0}")]
    Protocol(String),

    #[error("verification code unavailable: {0}")]
    VerificationUnavailable(String),

    #[error("mailbox error: {0}")]
    Mailbox(String),

    #[error("account parse error: {0}")]
    AccountParse(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("account already exists: {0}")]
    AlreadyExists(String),

    #[error(transparent)]
    Upstream(#[from] upstream::UpstreamError),

    #[error("login step {step} failed for {username}: {source}")]
    Step {
        step: String,
        username: String,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// The underlying error with any step annotation removed.
    pub fn root(&self) -> &Error {
        match self {
            Error::Step { source, .. } => source.root(),
            other => other,
        }
    }

    pub fn is_protocol_violation(&self) -> bool {
        matches!(self.root(), Error::Protocol(_))
    }

    /// 403 from the login endpoints: the account is refused, not the request.
    pub fn is_forbidden(&self) -> bool {
        matches!(self.root(), Error::Status { status: 403, .. })
    }
}

/// Result alias for auth operations.
pub type Result<T> = std::result::Result<T, Error>;
