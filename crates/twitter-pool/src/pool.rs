//! Lease scheduling and per-account queue state
//!
//! The pool owns the live copy of every account. Selection, lease
//! bookkeeping and quota/lock mutation all happen under one `std::sync::Mutex`
//! that is never held across an `.await`. Every mutation that must survive a
//! restart is written through `AccountStore` while holding `persist_lock`, so
//! disk writes land in mutation order.
//!
//! Eligibility for queue Q: active, not locked for Q, reset instant for Q
//! absent or passed, and no outstanding lease on (account, Q). Among eligible
//! accounts the least recently leased wins; ties go to the lower username.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use twitter_auth::{Account, AccountStore, Authenticator, LoginOutcome};
use upstream::ClientConfig;

use crate::error::{Error, Result};

/// Scheduling knobs.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Give up waiting for an account after this long. `None` waits forever.
    pub acquire_timeout: Option<Duration>,
    /// Longest single sleep while waiting for an account.
    pub max_poll_interval: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            acquire_timeout: None,
            max_poll_interval: Duration::from_secs(5),
        }
    }
}

/// Counts from a `login_all` run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoginSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
}

struct Slot {
    account: Account,
    last_used: u64,
    leased: BTreeSet<String>,
}

#[derive(Default)]
struct State {
    slots: BTreeMap<String, Slot>,
    use_seq: u64,
}

enum Attempt {
    Granted(Account),
    /// Only temporary obstacles remain; the earliest known reset, if any.
    Wait(Option<DateTime<Utc>>),
}

/// Shared account pool. Construct with `Pool::load` and share the `Arc`.
pub struct Pool {
    state: Mutex<State>,
    changed: Notify,
    persist_lock: tokio::sync::Mutex<()>,
    store: Arc<AccountStore>,
    config: PoolConfig,
    http: reqwest::Client,
    client: ClientConfig,
}

impl Pool {
    /// Build a pool from every account currently in `store`.
    pub async fn load(
        store: Arc<AccountStore>,
        http: reqwest::Client,
        client: ClientConfig,
        config: PoolConfig,
    ) -> Result<Arc<Self>> {
        let accounts = store.load_all().await?;
        let slots: BTreeMap<String, Slot> = accounts
            .into_iter()
            .map(|account| {
                (
                    account.username.clone(),
                    Slot {
                        account,
                        last_used: 0,
                        leased: BTreeSet::new(),
                    },
                )
            })
            .collect();
        info!(accounts = slots.len(), "pool initialized");

        Ok(Arc::new(Self {
            state: Mutex::new(State { slots, use_seq: 0 }),
            changed: Notify::new(),
            persist_lock: tokio::sync::Mutex::new(()),
            store,
            config,
            http,
            client,
        }))
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Lease an account for `queue`, waiting while only temporary obstacles
    /// (pending resets, outstanding leases) stand in the way.
    pub async fn acquire(self: &Arc<Self>, queue: &str) -> Result<Lease> {
        let deadline = self.config.acquire_timeout.map(|t| Instant::now() + t);

        loop {
            let notified = self.changed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let next_reset = match self.try_acquire(queue)? {
                Attempt::Granted(account) => {
                    metrics::counter!("pool_leases_granted_total", "queue" => queue.to_owned())
                        .increment(1);
                    debug!(username = %account.username, queue, "lease granted");
                    return Ok(Lease {
                        pool: Arc::clone(self),
                        account,
                        queue: queue.to_owned(),
                    });
                }
                Attempt::Wait(next_reset) => next_reset,
            };

            let mut wait = self.config.max_poll_interval;
            if let Some(reset) = next_reset {
                let until_reset = (reset - Utc::now()).to_std().unwrap_or(Duration::ZERO);
                wait = wait.min(until_reset);
            }
            if let Some(deadline) = deadline {
                let now = Instant::now();
                if now >= deadline {
                    warn!(queue, "timed out waiting for an account");
                    return Err(Error::AcquireTimeout {
                        queue: queue.to_owned(),
                    });
                }
                wait = wait.min(deadline - now);
            }

            debug!(
                queue,
                wait_ms = wait.as_millis() as u64,
                next_reset = ?next_reset,
                "no account available, waiting"
            );
            tokio::select! {
                _ = &mut notified => {}
                _ = tokio::time::sleep(wait) => {}
            }
        }
    }

    fn try_acquire(&self, queue: &str) -> Result<Attempt> {
        let now = Utc::now();
        let mut state = self.state();

        let mut best: Option<(u64, &str)> = None;
        let mut next_reset: Option<DateTime<Utc>> = None;
        let mut temporarily_blocked = false;

        for (name, slot) in &state.slots {
            let account = &slot.account;
            if !account.active || account.is_locked(queue) {
                continue;
            }
            if let Some(reset) = account.limit_for(queue)
                && reset > now
            {
                temporarily_blocked = true;
                next_reset = Some(next_reset.map_or(reset, |r| r.min(reset)));
                continue;
            }
            if slot.leased.contains(queue) {
                temporarily_blocked = true;
                continue;
            }
            if best.is_none_or(|(used, _)| slot.last_used < used) {
                best = Some((slot.last_used, name.as_str()));
            }
        }

        let Some((_, chosen)) = best else {
            if temporarily_blocked {
                return Ok(Attempt::Wait(next_reset));
            }
            return Err(Error::NoAccountsAvailable {
                queue: queue.to_owned(),
            });
        };

        let chosen = chosen.to_owned();
        state.use_seq += 1;
        let seq = state.use_seq;
        let slot = state
            .slots
            .get_mut(&chosen)
            .ok_or_else(|| Error::NotFound(chosen.clone()))?;
        slot.last_used = seq;
        slot.leased.insert(queue.to_owned());
        Ok(Attempt::Granted(slot.account.clone()))
    }

    fn release_pair(&self, username: &str, queue: &str) {
        {
            let mut state = self.state();
            if let Some(slot) = state.slots.get_mut(username) {
                slot.leased.remove(queue);
            }
        }
        debug!(username, queue, "lease released");
        self.changed.notify_waiters();
    }

    /// Apply `mutate` to one account and persist the result.
    async fn update<F>(&self, username: &str, mutate: F) -> Result<Account>
    where
        F: FnOnce(&mut Account),
    {
        let _persist = self.persist_lock.lock().await;
        let snapshot = {
            let mut state = self.state();
            let slot = state
                .slots
                .get_mut(username)
                .ok_or_else(|| Error::NotFound(username.to_owned()))?;
            mutate(&mut slot.account);
            slot.account.clone()
        };
        self.store.save(&snapshot).await?;
        self.changed.notify_waiters();
        Ok(snapshot)
    }

    /// Mark `username` unusable for `queue` until `reset_at`.
    pub async fn record_quota(
        &self,
        username: &str,
        queue: &str,
        reset_at: DateTime<Utc>,
    ) -> Result<()> {
        self.update(username, |account| {
            account.limits.insert(queue.to_owned(), reset_at);
        })
        .await?;
        metrics::counter!("pool_quota_recorded_total", "queue" => queue.to_owned()).increment(1);
        info!(username, queue, reset_at = %reset_at, "queue rate limited");
        Ok(())
    }

    /// Exclude `username` from `queue` until `unlock`.
    pub async fn lock(&self, username: &str, queue: &str) -> Result<()> {
        self.update(username, |account| {
            account.locks.insert(queue.to_owned(), true);
        })
        .await?;
        info!(username, queue, "queue locked");
        Ok(())
    }

    pub async fn unlock(&self, username: &str, queue: &str) -> Result<()> {
        self.update(username, |account| {
            account.locks.remove(queue);
        })
        .await?;
        info!(username, queue, "queue unlocked");
        Ok(())
    }

    /// Store the outcome of a login attempt: session, active flag, diagnostic.
    pub async fn apply_login(&self, account: &Account) -> Result<()> {
        self.update(&account.username, |stored| {
            stored.cookies = account.cookies.clone();
            stored.headers = account.headers.clone();
            stored.active = account.active;
            stored.error_msg = account.error_msg.clone();
        })
        .await?;
        Ok(())
    }

    /// Log in every inactive account, one at a time.
    pub async fn login_all(&self, authenticator: &Authenticator) -> Result<LoginSummary> {
        let pending: Vec<Account> = self
            .state()
            .slots
            .values()
            .filter(|slot| !slot.account.active)
            .map(|slot| slot.account.clone())
            .collect();

        let mut summary = LoginSummary {
            total: pending.len(),
            ..LoginSummary::default()
        };
        info!(accounts = summary.total, "logging in inactive accounts");

        for mut account in pending {
            match authenticator.login(&mut account).await {
                Ok(LoginOutcome::Success | LoginOutcome::AlreadyActive) => summary.succeeded += 1,
                Ok(LoginOutcome::Rejected { message }) => {
                    warn!(username = %account.username, reason = %message, "account rejected");
                    summary.failed += 1;
                }
                Err(e) => {
                    warn!(username = %account.username, error = %e, "login failed");
                    summary.failed += 1;
                }
            }
            self.apply_login(&account).await?;
        }

        info!(
            total = summary.total,
            succeeded = summary.succeeded,
            failed = summary.failed,
            "login run finished"
        );
        Ok(summary)
    }

    /// Register a new account and persist it.
    pub async fn add_account(&self, account: Account) -> Result<()> {
        let _persist = self.persist_lock.lock().await;
        if self.state().slots.contains_key(&account.username) {
            return Err(Error::Store(twitter_auth::Error::AlreadyExists(
                account.username,
            )));
        }
        self.store.add(&account).await?;
        info!(username = %account.username, "account added to pool");
        self.state().slots.insert(
            account.username.clone(),
            Slot {
                account,
                last_used: 0,
                leased: BTreeSet::new(),
            },
        );
        self.changed.notify_waiters();
        Ok(())
    }

    /// Remove an account from the pool and the store.
    ///
    /// Outstanding leases stay valid until dropped.
    pub async fn remove_account(&self, username: &str) -> Result<Option<Account>> {
        let _persist = self.persist_lock.lock().await;
        let removed = self.state().slots.remove(username).map(|slot| slot.account);
        self.store.remove(username).await?;
        if removed.is_some() {
            info!(username, "account removed from pool");
        }
        self.changed.notify_waiters();
        Ok(removed)
    }

    /// Snapshot of one account.
    pub fn account(&self, username: &str) -> Option<Account> {
        self.state()
            .slots
            .get(username)
            .map(|slot| slot.account.clone())
    }

    /// Usernames that `acquire(queue)` could hand out right now.
    pub fn available(&self, queue: &str) -> Vec<String> {
        let now = Utc::now();
        self.state()
            .slots
            .values()
            .filter(|slot| slot.account.can_use(queue, now) && !slot.leased.contains(queue))
            .map(|slot| slot.account.username.clone())
            .collect()
    }

    /// Pool summary for operators.
    ///
    /// Status: every account active → healthy, some → degraded,
    /// none (or empty pool) → unhealthy.
    pub fn health(&self) -> serde_json::Value {
        let now = Utc::now();
        let state = self.state();

        let mut active_count = 0usize;
        let accounts: Vec<serde_json::Value> = state
            .slots
            .values()
            .map(|slot| {
                let account = &slot.account;
                if account.active {
                    active_count += 1;
                }
                let locked: Vec<&String> = account
                    .locks
                    .iter()
                    .filter(|(_, locked)| **locked)
                    .map(|(queue, _)| queue)
                    .collect();
                let limits: BTreeMap<&String, i64> = account
                    .limits
                    .iter()
                    .filter(|(_, reset)| **reset > now)
                    .map(|(queue, reset)| (queue, (*reset - now).num_seconds()))
                    .collect();
                serde_json::json!({
                    "username": account.username,
                    "active": account.active,
                    "locked": locked,
                    "limit_remaining_secs": limits,
                    "leased": slot.leased,
                    "error_msg": account.error_msg,
                })
            })
            .collect();

        let total = state.slots.len();
        let status = if total > 0 && active_count == total {
            "healthy"
        } else if active_count > 0 {
            "degraded"
        } else {
            "unhealthy"
        };

        serde_json::json!({
            "status": status,
            "accounts_total": total,
            "accounts_active": active_count,
            "accounts_inactive": total - active_count,
            "accounts": accounts,
        })
    }
}

/// Exclusive use of one account for one queue.
///
/// Dropping the lease releases it and wakes tasks waiting in `acquire`.
pub struct Lease {
    pool: Arc<Pool>,
    account: Account,
    queue: String,
}

impl Lease {
    /// Account snapshot taken when the lease was granted.
    pub fn account(&self) -> &Account {
        &self.account
    }

    pub fn username(&self) -> &str {
        &self.account.username
    }

    pub fn queue(&self) -> &str {
        &self.queue
    }

    /// Request builder carrying this account's headers and cookies.
    pub fn request(&self, method: reqwest::Method, url: &str) -> Result<reqwest::RequestBuilder> {
        let headers = self.account.session().header_map(&self.pool.client)?;
        Ok(self.pool.http.request(method, url).headers(headers))
    }

    /// End the lease. Equivalent to dropping it.
    pub fn release(self) {}
}

impl std::fmt::Debug for Lease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lease")
            .field("username", &self.account.username)
            .field("queue", &self.queue)
            .finish()
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        self.pool.release_pair(&self.account.username, &self.queue);
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use axum::Router;
    use axum::routing::post;
    use chrono::Duration as ChronoDuration;
    use twitter_auth::LoginConfig;

    use super::*;

    const Q: &str = "SearchTimeline";

    fn active(username: &str) -> Account {
        let mut account = Account::new(username, "pw", format!("{username}@example.com"), "epw");
        account.active = true;
        account
    }

    async fn test_store(dir: &tempfile::TempDir, accounts: &[Account]) -> Arc<AccountStore> {
        let store = AccountStore::open(dir.path().to_path_buf()).await.unwrap();
        for account in accounts {
            store.add(account).await.unwrap();
        }
        Arc::new(store)
    }

    async fn test_pool(dir: &tempfile::TempDir, accounts: &[Account], config: PoolConfig) -> Arc<Pool> {
        let store = test_store(dir, accounts).await;
        let client = ClientConfig::default();
        let http = client.build_http_client().unwrap();
        Pool::load(store, http, client, config).await.unwrap()
    }

    fn fast() -> PoolConfig {
        PoolConfig {
            acquire_timeout: Some(Duration::from_secs(5)),
            max_poll_interval: Duration::from_millis(20),
        }
    }

    #[tokio::test]
    async fn least_recently_used_rotation() {
        let dir = tempfile::tempdir().unwrap();
        let pool = test_pool(&dir, &[active("bob"), active("alice"), active("carol")], fast()).await;

        let mut order = Vec::new();
        for _ in 0..4 {
            let lease = pool.acquire(Q).await.unwrap();
            order.push(lease.username().to_owned());
        }
        assert_eq!(order, vec!["alice", "bob", "carol", "alice"]);
    }

    #[tokio::test]
    async fn queues_are_independent() {
        let dir = tempfile::tempdir().unwrap();
        let pool = test_pool(&dir, &[active("alice")], fast()).await;

        let search = pool.acquire(Q).await.unwrap();
        let followers = pool.acquire("Followers").await.unwrap();
        assert_eq!(search.username(), "alice");
        assert_eq!(followers.username(), "alice");
    }

    #[tokio::test]
    async fn concurrent_leases_are_exclusive() {
        let dir = tempfile::tempdir().unwrap();
        let pool = test_pool(&dir, &[active("alice"), active("bob")], fast()).await;
        let held: Arc<Mutex<HashSet<String>>> = Arc::default();

        let mut handles = vec![];
        for _ in 0..16 {
            let pool = pool.clone();
            let held = held.clone();
            handles.push(tokio::spawn(async move {
                let lease = pool.acquire(Q).await.unwrap();
                let name = lease.username().to_owned();
                assert!(held.lock().unwrap().insert(name.clone()), "{name} leased twice");
                tokio::time::sleep(Duration::from_millis(5)).await;
                held.lock().unwrap().remove(&name);
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(pool.available(Q).len(), 2);
    }

    #[tokio::test]
    async fn waiter_wakes_when_lease_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let config = PoolConfig {
            acquire_timeout: Some(Duration::from_secs(5)),
            max_poll_interval: Duration::from_secs(60),
        };
        let pool = test_pool(&dir, &[active("alice")], config).await;

        let first = pool.acquire(Q).await.unwrap();
        let waiter = tokio::spawn({
            let pool = pool.clone();
            async move { pool.acquire(Q).await.map(|l| l.username().to_owned()) }
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!waiter.is_finished());

        first.release();
        let name = tokio::time::timeout(Duration::from_secs(2), waiter)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(name, "alice");
    }

    #[tokio::test]
    async fn rate_limited_account_is_skipped_until_reset() {
        let dir = tempfile::tempdir().unwrap();
        let pool = test_pool(&dir, &[active("alice"), active("bob")], fast()).await;

        pool.record_quota("alice", Q, Utc::now() + ChronoDuration::hours(1))
            .await
            .unwrap();

        for _ in 0..3 {
            let lease = pool.acquire(Q).await.unwrap();
            assert_eq!(lease.username(), "bob");
        }
        assert_eq!(pool.available(Q), vec!["bob"]);
        assert_eq!(pool.available("Followers"), vec!["alice", "bob"]);
    }

    #[tokio::test]
    async fn acquire_waits_for_reset() {
        let dir = tempfile::tempdir().unwrap();
        let pool = test_pool(&dir, &[active("alice")], fast()).await;

        let reset = Utc::now() + ChronoDuration::milliseconds(200);
        pool.record_quota("alice", Q, reset).await.unwrap();

        let lease = pool.acquire(Q).await.unwrap();
        assert_eq!(lease.username(), "alice");
        assert!(Utc::now() >= reset);
    }

    #[tokio::test]
    async fn acquire_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let config = PoolConfig {
            acquire_timeout: Some(Duration::from_millis(100)),
            max_poll_interval: Duration::from_millis(20),
        };
        let pool = test_pool(&dir, &[active("alice")], config).await;
        pool.record_quota("alice", Q, Utc::now() + ChronoDuration::hours(1))
            .await
            .unwrap();

        let result = pool.acquire(Q).await;
        assert!(matches!(result, Err(Error::AcquireTimeout { queue }) if queue == Q));
    }

    #[tokio::test]
    async fn empty_pool_fails_fast() {
        let dir = tempfile::tempdir().unwrap();
        let pool = test_pool(&dir, &[], PoolConfig::default()).await;

        let result = pool.acquire(Q).await;
        assert!(matches!(result, Err(Error::NoAccountsAvailable { .. })));
    }

    #[tokio::test]
    async fn all_inactive_fails_fast() {
        let dir = tempfile::tempdir().unwrap();
        let inactive = Account::new("alice", "pw", "a@example.com", "epw");
        let pool = test_pool(&dir, &[inactive], PoolConfig::default()).await;

        let result = pool.acquire(Q).await;
        assert!(matches!(result, Err(Error::NoAccountsAvailable { .. })));
    }

    #[tokio::test]
    async fn all_locked_fails_fast() {
        let dir = tempfile::tempdir().unwrap();
        let pool = test_pool(&dir, &[active("alice"), active("bob")], PoolConfig::default()).await;
        pool.lock("alice", Q).await.unwrap();
        pool.lock("bob", Q).await.unwrap();

        let result = pool.acquire(Q).await;
        assert!(matches!(result, Err(Error::NoAccountsAvailable { queue }) if queue == Q));
        assert!(pool.acquire("Followers").await.is_ok());
    }

    #[tokio::test]
    async fn lock_survives_reload_until_unlock() {
        let dir = tempfile::tempdir().unwrap();
        let pool = test_pool(&dir, &[active("alice"), active("bob")], fast()).await;
        pool.lock("alice", Q).await.unwrap();
        drop(pool);

        let store = Arc::new(AccountStore::open(dir.path().to_path_buf()).await.unwrap());
        let client = ClientConfig::default();
        let http = client.build_http_client().unwrap();
        let reloaded = Pool::load(store, http, client, fast()).await.unwrap();
        assert_eq!(reloaded.available(Q), vec!["bob"]);

        reloaded.unlock("alice", Q).await.unwrap();
        assert_eq!(reloaded.available(Q), vec!["alice", "bob"]);
        assert!(!reloaded.account("alice").unwrap().is_locked(Q));
    }

    #[tokio::test]
    async fn session_state_round_trips_through_store() {
        let dir = tempfile::tempdir().unwrap();
        let pool = test_pool(
            &dir,
            &[active("alice"), active("bob"), active("carol")],
            fast(),
        )
        .await;

        let mut alice = pool.account("alice").unwrap();
        alice.cookies.insert("ct0".into(), "csrf".into());
        alice.headers.insert("x-csrf-token".into(), "csrf".into());
        pool.apply_login(&alice).await.unwrap();
        pool.record_quota("alice", Q, Utc::now() + ChronoDuration::hours(1))
            .await
            .unwrap();
        pool.lock("bob", "Followers").await.unwrap();

        let queues = [Q, "Followers", "TweetDetail"];
        let before: Vec<_> = queues.iter().map(|q| pool.available(q)).collect();
        drop(pool);

        let store = Arc::new(AccountStore::open(dir.path().to_path_buf()).await.unwrap());
        let client = ClientConfig::default();
        let http = client.build_http_client().unwrap();
        let reloaded = Pool::load(store, http, client, fast()).await.unwrap();
        let after: Vec<_> = queues.iter().map(|q| reloaded.available(q)).collect();

        assert_eq!(before, after);
        assert_eq!(
            reloaded.account("alice").unwrap().cookies.get("ct0").map(String::as_str),
            Some("csrf")
        );
    }

    #[tokio::test]
    async fn record_quota_unknown_account_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let pool = test_pool(&dir, &[], fast()).await;

        let result = pool.record_quota("ghost", Q, Utc::now()).await;
        assert!(matches!(result, Err(Error::NotFound(name)) if name == "ghost"));
    }

    #[tokio::test]
    async fn lease_request_carries_account_session() {
        let dir = tempfile::tempdir().unwrap();
        let mut alice = active("alice");
        alice.cookies.insert("ct0".into(), "csrf-1".into());
        alice.headers.insert("x-csrf-token".into(), "csrf-1".into());
        let pool = test_pool(&dir, &[alice], fast()).await;

        let lease = pool.acquire(Q).await.unwrap();
        let request = lease
            .request(reqwest::Method::GET, "http://127.0.0.1/graphql")
            .unwrap()
            .build()
            .unwrap();
        assert_eq!(request.headers()["x-csrf-token"], "csrf-1");
        assert_eq!(request.headers()["cookie"], "ct0=csrf-1");
    }

    #[tokio::test]
    async fn add_and_remove_account() {
        let dir = tempfile::tempdir().unwrap();
        let pool = test_pool(&dir, &[active("alice")], fast()).await;

        pool.add_account(active("bob")).await.unwrap();
        assert_eq!(pool.available(Q), vec!["alice", "bob"]);
        assert!(matches!(
            pool.add_account(active("bob")).await,
            Err(Error::Store(twitter_auth::Error::AlreadyExists(_)))
        ));

        let removed = pool.remove_account("alice").await.unwrap();
        assert!(removed.is_some());
        assert_eq!(pool.available(Q), vec!["bob"]);
        assert!(!dir.path().join("alice.json").exists());
    }

    #[tokio::test]
    async fn health_reports_status_and_accounts() {
        let dir = tempfile::tempdir().unwrap();
        let inactive = Account::new("carol", "pw", "c@example.com", "epw");
        let pool = test_pool(&dir, &[active("alice"), active("bob"), inactive], fast()).await;
        pool.lock("bob", Q).await.unwrap();
        pool.record_quota("alice", Q, Utc::now() + ChronoDuration::minutes(10))
            .await
            .unwrap();

        let health = pool.health();
        assert_eq!(health["status"], "degraded");
        assert_eq!(health["accounts_total"], 3);
        assert_eq!(health["accounts_active"], 2);
        assert_eq!(health["accounts_inactive"], 1);

        let accounts = health["accounts"].as_array().unwrap();
        assert_eq!(accounts[0]["username"], "alice");
        let remaining = accounts[0]["limit_remaining_secs"][Q].as_i64().unwrap();
        assert!(remaining > 500 && remaining <= 600, "got {remaining}");
        assert_eq!(accounts[1]["locked"], serde_json::json!([Q]));
    }

    #[tokio::test]
    async fn health_empty_pool_is_unhealthy() {
        let dir = tempfile::tempdir().unwrap();
        let pool = test_pool(&dir, &[], fast()).await;
        assert_eq!(pool.health()["status"], "unhealthy");
    }

    /// Onboarding server that finishes every flow immediately.
    async fn start_login_server() -> String {
        let app = Router::new()
            .route(
                "/1.1/guest/activate.json",
                post(|| async { axum::Json(serde_json::json!({ "guest_token": "gt" })) }),
            )
            .route(
                "/1.1/onboarding/task.json",
                post(|| async {
                    (
                        [("set-cookie", "ct0=csrf")],
                        axum::Json(serde_json::json!({ "flow_token": "f", "subtasks": [] })),
                    )
                }),
            );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn login_all_activates_and_persists() {
        let dir = tempfile::tempdir().unwrap();
        let pool = test_pool(
            &dir,
            &[
                active("alice"),
                Account::new("bob", "pw", "b@example.com", "epw"),
                Account::new("carol", "pw", "c@example.com", "epw"),
            ],
            fast(),
        )
        .await;

        let base = start_login_server().await;
        let client = ClientConfig::with_base_url(&base);
        let http = client.build_http_client().unwrap();
        let authenticator = Authenticator::new(http, client, LoginConfig::default());

        let summary = pool.login_all(&authenticator).await.unwrap();
        assert_eq!(
            summary,
            LoginSummary {
                total: 2,
                succeeded: 2,
                failed: 0
            }
        );
        assert_eq!(pool.available(Q), vec!["alice", "bob", "carol"]);

        let stored = AccountStore::open(dir.path().to_path_buf())
            .await
            .unwrap()
            .load("bob")
            .await
            .unwrap()
            .unwrap();
        assert!(stored.active);
        assert_eq!(stored.headers.get("x-guest-token").map(String::as_str), Some("gt"));
        assert_eq!(stored.cookies.get("ct0").map(String::as_str), Some("csrf"));
    }
}
