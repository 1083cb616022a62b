//! GraphQL query engine over the account pool
//!
//! `Api::stream` turns a cursor-paginated operation into a lazy stream of
//! raw pages; `Api::query` issues a single request. Both lease an account
//! per operation queue and rotate to another account when a queue's quota
//! runs out.

pub mod api;
pub mod error;
pub mod operations;
pub mod page;

pub use api::{Api, ApiConfig};
pub use error::{Error, Result};
pub use operations::{
    CursorKind, OP_FOLLOWERS, OP_LIST_LATEST_TWEETS, OP_SEARCH_TIMELINE, OP_TWEET_DETAIL,
    OP_USER_BY_SCREEN_NAME, default_features, queue_of,
};
pub use page::{RawPage, extract_entries, find_cursor};
