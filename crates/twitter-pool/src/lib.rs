//! Lease scheduler over the account pool
//!
//! Hands out exclusive (account, queue) leases with least-recently-used
//! rotation, tracks per-queue rate-limit resets and manual locks, and
//! persists every change through `AccountStore`. The pool's in-memory map is
//! the live view; the store is its durable copy.
//!
//! Account lifecycle:
//! 1. Account registered via `add_account` → stored inactive
//! 2. `login_all` runs the login flow → session captured, account active
//! 3. `acquire(queue)` leases the least recently used eligible account
//! 4. Upstream signals a rate limit → `record_quota` until the reset instant
//! 5. Reset instant passes → account eligible for that queue again
//! 6. Operator `lock`s a queue → excluded until `unlock`

pub mod error;
pub mod pool;
pub mod quota;

pub use error::{Error, Result};
pub use pool::{Lease, LoginSummary, Pool, PoolConfig};
pub use quota::{classify_status, is_rate_limited_body, reset_at};
