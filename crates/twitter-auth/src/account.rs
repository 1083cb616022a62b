//! Account record
//!
//! One scraping identity: login secrets, the session the server handed it,
//! and per-queue scheduling state. `limits` holds the UTC instant a queue
//! becomes usable again; `locks` marks queues excluded by an operator.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use upstream::Session;

#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub username: String,
    pub password: String,
    pub email: String,
    pub email_password: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mfa_secret: Option<String>,
    #[serde(default)]
    pub active: bool,
    #[serde(default)]
    pub cookies: BTreeMap<String, String>,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub limits: BTreeMap<String, DateTime<Utc>>,
    #[serde(default)]
    pub locks: BTreeMap<String, bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_msg: Option<String>,
}

impl Account {
    /// A fresh, inactive account with no session state.
    pub fn new(
        username: impl Into<String>,
        password: impl Into<String>,
        email: impl Into<String>,
        email_password: impl Into<String>,
    ) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            email: email.into(),
            email_password: email_password.into(),
            mfa_secret: None,
            active: false,
            cookies: BTreeMap::new(),
            headers: BTreeMap::new(),
            limits: BTreeMap::new(),
            locks: BTreeMap::new(),
            error_msg: None,
        }
    }

    pub fn with_mfa_secret(mut self, secret: impl Into<String>) -> Self {
        self.mfa_secret = Some(secret.into());
        self
    }

    pub fn is_locked(&self, queue: &str) -> bool {
        self.locks.get(queue).copied().unwrap_or(false)
    }

    pub fn limit_for(&self, queue: &str) -> Option<DateTime<Utc>> {
        self.limits.get(queue).copied()
    }

    /// Whether the account may serve `queue` at `now`, ignoring leases.
    ///
    /// A reset instant equal to `now` counts as expired.
    pub fn can_use(&self, queue: &str, now: DateTime<Utc>) -> bool {
        self.active
            && !self.is_locked(queue)
            && self.limit_for(queue).is_none_or(|reset| reset <= now)
    }

    /// Snapshot of the stored headers and cookies for issuing requests.
    pub fn session(&self) -> Session {
        Session::new(self.headers.clone(), self.cookies.clone())
    }

    pub fn set_session(&mut self, session: Session) {
        self.headers = session.headers;
        self.cookies = session.cookies;
    }
}

impl fmt::Debug for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Account")
            .field("username", &self.username)
            .field("email", &self.email)
            .field("password", &"[REDACTED]")
            .field("email_password", &"[REDACTED]")
            .field("mfa_secret", &self.mfa_secret.as_ref().map(|_| "[REDACTED]"))
            .field("active", &self.active)
            .field("limits", &self.limits)
            .field("locks", &self.locks)
            .field("error_msg", &self.error_msg)
            .finish_non_exhaustive()
    }
}
