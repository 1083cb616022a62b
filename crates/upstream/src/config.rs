//! Endpoint and bearer configuration
//!
//! The bearer token identifies the public web client, not an account. It is a
//! per-instance value with a built-in default so tests and alternate
//! deployments can point the client somewhere else.

use std::time::Duration;

/// Public web-client bearer token used when no override is configured.
pub const DEFAULT_BEARER_TOKEN: &str = "AAAAAAAAAAAAAAAAAAAAANRILgAAAAAAnNwIzUejRCOuH5E6I8xnZz4puTs%3D1Zv7ttfk8LF81IUq16cHjhLTvJu4FA33AGWWjCpTnA";

/// Browser identity sent with every request.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.1 Safari/605.1.15";

/// Onboarding task endpoint driving the login flow.
pub const LOGIN_URL: &str = "https://api.twitter.com/1.1/onboarding/task.json";

/// Guest token activation endpoint (login bootstrap).
pub const GUEST_TOKEN_URL: &str = "https://api.twitter.com/1.1/guest/activate.json";

/// GraphQL base path; the operation id is appended.
pub const GQL_URL: &str = "https://twitter.com/i/api/graphql";

/// Upstream client configuration shared by login and query paths.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Bearer token without the `Bearer ` prefix
    pub bearer_token: String,
    pub user_agent: String,
    pub login_url: String,
    pub guest_token_url: String,
    pub gql_url: String,
    /// Per-request timeout
    pub timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            bearer_token: DEFAULT_BEARER_TOKEN.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            login_url: LOGIN_URL.to_string(),
            guest_token_url: GUEST_TOKEN_URL.to_string(),
            gql_url: GQL_URL.to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

impl ClientConfig {
    /// Point every endpoint at `base` (a mock server in tests, a relay in
    /// production). Paths keep the upstream layout.
    pub fn with_base_url(base: &str) -> Self {
        let base = base.trim_end_matches('/');
        Self {
            login_url: format!("{base}/1.1/onboarding/task.json"),
            guest_token_url: format!("{base}/1.1/guest/activate.json"),
            gql_url: format!("{base}/i/api/graphql"),
            ..Self::default()
        }
    }

    /// Full URL for a GraphQL operation id such as `abc123/SearchTimeline`.
    pub fn operation_url(&self, operation_id: &str) -> String {
        format!("{}/{}", self.gql_url.trim_end_matches('/'), operation_id)
    }

    /// Build the HTTP client used for every request made with this config.
    pub fn build_http_client(&self) -> reqwest::Result<reqwest::Client> {
        reqwest::Client::builder().timeout(self.timeout).build()
    }
}
