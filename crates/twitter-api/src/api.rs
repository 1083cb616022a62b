//! Query engine: one-shot queries and cursor-paginated streams
//!
//! Every request runs under a pool lease for the operation's queue. A
//! rate-limit signal (429, or error code 88 in a 2xx body) records the reset
//! against the leased account, drops the lease and retries the same request
//! on the next account the pool grants. Network failures and 5xx responses
//! retry on the same lease with a fixed delay until the attempt budget runs
//! out.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::Stream;
use futures_util::stream;
use reqwest::Method;
use serde_json::{Map, Value, json};
use tracing::{debug, info, warn};
use twitter_pool::{Lease, Pool, classify_status, is_rate_limited_body, reset_at};
use upstream::{ClientConfig, ErrorClassification};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::operations::{
    CursorKind, OP_FOLLOWERS, OP_SEARCH_TIMELINE, OP_TWEET_DETAIL, OP_USER_BY_SCREEN_NAME,
    field_toggles, merged_features, queue_of,
};
use crate::page::{RawPage, extract_entries, find_cursor};

/// Longest response body kept in error messages.
const MAX_ERROR_BODY: usize = 512;

/// Retry budget for transient failures.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Total attempts per request on one lease, first try included.
    pub max_attempts: u32,
    pub retry_delay: Duration,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_delay: Duration::from_millis(100),
        }
    }
}

/// Outcome of one request on one lease.
enum Reply {
    Body(Value),
    /// Queue quota exhausted until the given instant.
    RateLimited(DateTime<Utc>),
}

/// GraphQL client over the account pool. Cheap to clone.
#[derive(Clone)]
pub struct Api {
    pool: Arc<Pool>,
    client: Arc<ClientConfig>,
    config: ApiConfig,
}

/// Everything a page stream needs between pages.
struct StreamState {
    api: Api,
    operation: String,
    variables: Map<String, Value>,
    features: Map<String, Value>,
    cursor_kind: CursorKind,
    limit: i64,
    lease: Option<Lease>,
    cursor: Option<String>,
    total: i64,
    done: bool,
    stream_id: Uuid,
}

impl Api {
    pub fn new(pool: Arc<Pool>, client: ClientConfig, config: ApiConfig) -> Self {
        Self {
            pool,
            client: Arc::new(client),
            config,
        }
    }

    pub fn pool(&self) -> &Arc<Pool> {
        &self.pool
    }

    /// Lazily page through `operation`.
    ///
    /// Pages come in cursor order. The stream ends after a page without a
    /// cursor, once `limit` entries have been yielded (`limit <= 0` means no
    /// limit), or at the first page with no entries (not yielded). The lease
    /// is held between pages and released when the stream ends or is dropped.
    pub fn stream(
        &self,
        operation: &str,
        variables: Map<String, Value>,
        features: Map<String, Value>,
        cursor_kind: CursorKind,
        limit: i64,
    ) -> impl Stream<Item = Result<RawPage>> + Send + use<> {
        let state = StreamState {
            api: self.clone(),
            operation: operation.to_owned(),
            variables,
            features: merged_features(features),
            cursor_kind,
            limit,
            lease: None,
            cursor: None,
            total: 0,
            done: false,
            stream_id: Uuid::new_v4(),
        };
        stream::try_unfold(state, next_page)
    }

    /// Single request with the same lease and rotation rules as `stream`.
    pub async fn query(
        &self,
        operation: &str,
        variables: Map<String, Value>,
        features: Map<String, Value>,
    ) -> Result<Value> {
        let params = encode_params(
            queue_of(operation),
            &variables,
            &merged_features(features),
        )?;
        let mut lease = None;
        self.send(&mut lease, operation, &params).await
    }

    /// Latest tweets matching `query`.
    pub fn search_raw(
        &self,
        query: &str,
        limit: i64,
    ) -> impl Stream<Item = Result<RawPage>> + Send + use<> {
        let variables = object(json!({
            "rawQuery": query,
            "count": 20,
            "product": "Latest",
            "querySource": "typed_query",
        }));
        self.stream(OP_SEARCH_TIMELINE, variables, Map::new(), CursorKind::Bottom, limit)
    }

    /// Replies under a tweet, following thread continuations.
    pub fn tweet_replies_raw(
        &self,
        tweet_id: u64,
        limit: i64,
    ) -> impl Stream<Item = Result<RawPage>> + Send + use<> {
        let variables = object(json!({
            "focalTweetId": tweet_id.to_string(),
            "referrer": "tweet",
            "with_rux_injections": true,
            "includePromotedContent": false,
            "withCommunity": true,
            "withQuickPromoteEligibilityTweetFields": true,
            "withBirdwatchNotes": true,
            "withVoice": true,
            "withV2Timeline": true,
        }));
        self.stream(
            OP_TWEET_DETAIL,
            variables,
            Map::new(),
            CursorKind::ShowMoreThreads,
            limit,
        )
    }

    pub fn followers_raw(
        &self,
        user_id: u64,
        limit: i64,
    ) -> impl Stream<Item = Result<RawPage>> + Send + use<> {
        let variables = object(json!({
            "userId": user_id.to_string(),
            "count": 20,
            "includePromotedContent": false,
        }));
        let features = object(json!({
            "responsive_web_twitter_article_notes_tab_enabled": false,
        }));
        self.stream(OP_FOLLOWERS, variables, features, CursorKind::Bottom, limit)
    }

    /// Profile lookup by screen name.
    pub async fn user_by_login_raw(&self, login: &str) -> Result<Value> {
        let variables = object(json!({
            "screen_name": login,
            "withSafetyModeUserFields": true,
        }));
        let features = object(json!({
            "highlights_tweets_tab_ui_enabled": true,
            "hidden_profile_likes_enabled": true,
            "creator_subscriptions_tweet_preview_api_enabled": true,
            "hidden_profile_subscriptions_enabled": true,
            "subscriptions_verification_info_verified_since_enabled": true,
            "subscriptions_verification_info_is_identity_verified_enabled": false,
            "responsive_web_twitter_article_notes_tab_enabled": false,
        }));
        self.query(OP_USER_BY_SCREEN_NAME, variables, features).await
    }

    /// Issue one request, rotating accounts on rate limits.
    ///
    /// `lease` is reused when present and refilled from the pool when empty;
    /// on return it holds the lease that produced the body. Rate limits that
    /// announce no future reset are retried after `retry_delay`, at most
    /// `max_attempts` times in a row.
    async fn send(
        &self,
        lease: &mut Option<Lease>,
        operation: &str,
        params: &[(&'static str, String)],
    ) -> Result<Value> {
        let queue = queue_of(operation);
        let mut stale_resets = 0;
        loop {
            if lease.is_none() {
                *lease = Some(self.pool.acquire(queue).await?);
            }
            let Some(current) = lease.as_ref() else {
                continue;
            };

            match self.send_once(current, operation, params).await? {
                Reply::Body(body) => return Ok(body),
                Reply::RateLimited(reset) => {
                    let username = current.username().to_owned();
                    self.pool.record_quota(&username, queue, reset).await?;
                    *lease = None;
                    info!(%username, queue, operation, "rate limited, rotating account");

                    // A reset already in the past frees the account at once.
                    if reset <= Utc::now() {
                        stale_resets += 1;
                        if stale_resets >= self.config.max_attempts.max(1) {
                            return Err(Error::RateLimited {
                                operation: operation.to_owned(),
                                account: username,
                            });
                        }
                        tokio::time::sleep(self.config.retry_delay).await;
                    }
                }
            }
        }
    }

    /// One request on one lease, retrying transient failures in place.
    async fn send_once(
        &self,
        lease: &Lease,
        operation: &str,
        params: &[(&'static str, String)],
    ) -> Result<Reply> {
        let url = self.client.operation_url(operation);
        let max_attempts = self.config.max_attempts.max(1);
        let http_error = |message: String| Error::Http {
            operation: operation.to_owned(),
            account: lease.username().to_owned(),
            message,
        };

        let mut last_failure = String::new();
        for attempt in 0..max_attempts {
            if attempt > 0 {
                warn!(
                    attempt,
                    operation,
                    username = lease.username(),
                    error = %last_failure,
                    "retrying request"
                );
                tokio::time::sleep(self.config.retry_delay).await;
            }

            let request = lease
                .request(Method::GET, &url)
                .map_err(Error::Pool)?
                .query(params);

            let response = match request.send().await {
                Ok(response) => response,
                Err(e) if e.is_builder() => return Err(http_error(e.to_string())),
                Err(e) => {
                    last_failure = e.to_string();
                    continue;
                }
            };

            let status = response.status();
            let headers = response.headers().clone();
            let text = match response.text().await {
                Ok(text) => text,
                Err(e) => {
                    last_failure = format!("reading response body: {e}");
                    continue;
                }
            };
            debug!(
                operation,
                username = lease.username(),
                status = status.as_u16(),
                "response"
            );

            if status.is_success() {
                let body: Value = serde_json::from_str(&text).map_err(|e| Error::Decode {
                    operation: operation.to_owned(),
                    message: e.to_string(),
                })?;
                if is_rate_limited_body(&body) {
                    return Ok(Reply::RateLimited(reset_at(&headers)));
                }
                return Ok(Reply::Body(body));
            }

            match classify_status(status.as_u16()) {
                ErrorClassification::RateLimited => {
                    return Ok(Reply::RateLimited(reset_at(&headers)));
                }
                ErrorClassification::Transient => {
                    last_failure = format!("upstream returned {status}");
                }
                ErrorClassification::Permanent => {
                    return Err(Error::Upstream {
                        status: status.as_u16(),
                        operation: operation.to_owned(),
                        account: lease.username().to_owned(),
                        body: truncate(text),
                    });
                }
            }
        }

        Err(http_error(format!("{last_failure} ({max_attempts} attempts)")))
    }
}

/// Fetch the next page of a stream, or end it.
async fn next_page(mut state: StreamState) -> Result<Option<(RawPage, StreamState)>> {
    if state.done {
        return Ok(None);
    }

    let queue = queue_of(&state.operation).to_owned();
    let mut variables = state.variables.clone();
    if let Some(cursor) = &state.cursor {
        variables.insert("cursor".into(), Value::String(cursor.clone()));
    }
    let params = encode_params(&queue, &variables, &state.features)?;

    let body = state
        .api
        .send(&mut state.lease, &state.operation, &params)
        .await?;
    let account = state
        .lease
        .as_ref()
        .map(|lease| lease.username().to_owned())
        .unwrap_or_default();

    let entry_count = extract_entries(&body).len();
    let next_cursor = find_cursor(&body, &state.cursor_kind);
    if entry_count == 0 {
        debug!(stream_id = %state.stream_id, %queue, "empty page, stream finished");
        return Ok(None);
    }

    state.total += entry_count as i64;
    let limit_reached = state.limit > 0 && state.total >= state.limit;
    state.done = next_cursor.is_none() || limit_reached;
    state.cursor.clone_from(&next_cursor);
    if state.done {
        state.lease = None;
    }
    debug!(
        stream_id = %state.stream_id,
        %queue,
        %account,
        entries = entry_count,
        total = state.total,
        finished = state.done,
        "page fetched"
    );

    let page = RawPage {
        json: body,
        entry_count,
        cursor: next_cursor,
        account,
    };
    Ok(Some((page, state)))
}

/// Query-string parameters: compact JSON per field.
fn encode_params(
    queue: &str,
    variables: &Map<String, Value>,
    features: &Map<String, Value>,
) -> Result<Vec<(&'static str, String)>> {
    let encode = |value: &Map<String, Value>| {
        serde_json::to_string(value).map_err(|e| Error::Decode {
            operation: queue.to_owned(),
            message: format!("encoding parameters: {e}"),
        })
    };
    let mut params = vec![
        ("variables", encode(variables)?),
        ("features", encode(features)?),
    ];
    if let Some(toggles) = field_toggles(queue) {
        params.push(("fieldToggles", toggles.to_string()));
    }
    Ok(params)
}

fn object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

fn truncate(mut body: String) -> String {
    if body.len() > MAX_ERROR_BODY {
        let mut end = MAX_ERROR_BODY;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        body.truncate(end);
    }
    body
}
