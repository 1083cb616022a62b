//! Per-account HTTP session: dynamic headers and cookies
//!
//! Static client headers (bearer, user agent, locale) come from
//! `ClientConfig`; the session carries only what the server handed this
//! account (guest token, CSRF anchor, cookies). Stored headers override the
//! static ones when both name the same header.

use std::collections::BTreeMap;
use std::str::FromStr;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use tracing::{debug, warn};

use crate::config::ClientConfig;
use crate::{Result, UpstreamError};

/// Cookie that anchors CSRF protection once the login flow sets it.
pub const CSRF_COOKIE: &str = "ct0";

/// Session headers and cookies for one account.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    pub headers: BTreeMap<String, String>,
    pub cookies: BTreeMap<String, String>,
}

impl Session {
    pub fn new(headers: BTreeMap<String, String>, cookies: BTreeMap<String, String>) -> Self {
        Self { headers, cookies }
    }

    /// Current CSRF anchor cookie, if the server has set one.
    pub fn csrf_token(&self) -> Option<&str> {
        self.cookies.get(CSRF_COOKIE).map(String::as_str)
    }

    /// Switch to session auth mode once the CSRF cookie exists.
    ///
    /// Returns true when the headers were (re)applied.
    pub fn apply_csrf(&mut self) -> bool {
        let Some(ct0) = self.csrf_token().map(str::to_owned) else {
            return false;
        };
        self.headers.insert("x-csrf-token".into(), ct0);
        self.headers
            .insert("x-twitter-auth-type".into(), "OAuth2Session".into());
        true
    }

    /// Merge `Set-Cookie` headers from a response into the cookie set.
    ///
    /// Only the `name=value` pair is kept; attributes are ignored. An empty
    /// value deletes the cookie.
    pub fn absorb_set_cookies(&mut self, headers: &HeaderMap) {
        for value in headers.get_all(reqwest::header::SET_COOKIE) {
            let Ok(raw) = value.to_str() else {
                continue;
            };
            let pair = raw.split(';').next().unwrap_or_default();
            let Some((name, value)) = pair.split_once('=') else {
                continue;
            };
            let name = name.trim();
            let value = value.trim().trim_matches('"');
            if name.is_empty() {
                continue;
            }
            if value.is_empty() {
                self.cookies.remove(name);
            } else {
                debug!(cookie = name, "session cookie updated");
                self.cookies.insert(name.to_string(), value.to_string());
            }
        }
    }

    /// Render the `cookie` request header value (`a=1; b=2`).
    pub fn cookie_header(&self) -> Option<String> {
        if self.cookies.is_empty() {
            return None;
        }
        Some(
            self.cookies
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect::<Vec<_>>()
                .join("; "),
        )
    }

    /// Build the full request header map for this session.
    ///
    /// Static headers from `config` first, then stored session headers, then
    /// the cookie header. Invalid stored headers are skipped with a warning;
    /// an invalid static header (bad bearer token) is an error.
    pub fn header_map(&self, config: &ClientConfig) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        let bearer = format!("Bearer {}", config.bearer_token);
        headers.insert(reqwest::header::AUTHORIZATION, static_value("authorization", &bearer)?);
        headers.insert(
            reqwest::header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        headers.insert(
            reqwest::header::USER_AGENT,
            static_value("user-agent", &config.user_agent)?,
        );
        headers.insert(
            HeaderName::from_static("x-twitter-active-user"),
            HeaderValue::from_static("yes"),
        );
        headers.insert(
            HeaderName::from_static("x-twitter-client-language"),
            HeaderValue::from_static("en"),
        );

        for (name, value) in &self.headers {
            let header_name = match HeaderName::from_str(name) {
                Ok(n) => n,
                Err(e) => {
                    warn!(header = %name, error = %e, "skipping invalid session header name");
                    continue;
                }
            };
            let header_value = match HeaderValue::from_str(value) {
                Ok(v) => v,
                Err(e) => {
                    warn!(header = %name, error = %e, "skipping invalid session header value");
                    continue;
                }
            };
            headers.insert(header_name, header_value);
        }

        if let Some(cookie) = self.cookie_header() {
            match HeaderValue::from_str(&cookie) {
                Ok(v) => {
                    headers.insert(reqwest::header::COOKIE, v);
                }
                Err(e) => warn!(error = %e, "skipping invalid cookie header"),
            }
        }

        Ok(headers)
    }
}

fn static_value(name: &str, value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value).map_err(|e| UpstreamError::InvalidHeader {
        name: name.to_string(),
        message: e.to_string(),
    })
}
