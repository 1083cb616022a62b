//! GraphQL operation catalog
//!
//! Operation ids are `<hash>/<Name>`; the name doubles as the rate-limit
//! queue. Feature flags are sent with every request and may be overridden
//! per call.

use serde_json::{Map, Value, json};

pub const OP_SEARCH_TIMELINE: &str = "fZK7JipRHWtiZsTodhsTfQ/SearchTimeline";
pub const OP_USER_BY_SCREEN_NAME: &str = "k5XapwcSikNsEsILW5FvgA/UserByScreenName";
pub const OP_TWEET_DETAIL: &str = "B9_KmbkLhXt6jRwGjJrweg/TweetDetail";
pub const OP_FOLLOWERS: &str = "ZG1BQPaRSg04qo55kKaW2g/Followers";
pub const OP_LIST_LATEST_TWEETS: &str = "HjsWc-nwwHKYwHenbHm-tw/ListLatestTweetsTimeline";

/// Queues that must send `fieldToggles`.
const FIELD_TOGGLE_QUEUES: &[&str] = &["SearchTimeline", "ListLatestTweetsTimeline"];

/// Rate-limit queue for an operation id: the segment after the last `/`.
pub fn queue_of(operation: &str) -> &str {
    operation.rsplit('/').next().unwrap_or(operation)
}

pub fn field_toggles(queue: &str) -> Option<Value> {
    FIELD_TOGGLE_QUEUES
        .contains(&queue)
        .then(|| json!({ "withArticleRichContentState": false }))
}

/// Which continuation marker a stream follows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CursorKind {
    /// Ordinary "load more".
    Bottom,
    /// More replies under a thread.
    ShowMoreThreads,
    Custom(String),
}

impl CursorKind {
    pub fn as_str(&self) -> &str {
        match self {
            CursorKind::Bottom => "Bottom",
            CursorKind::ShowMoreThreads => "ShowMoreThreads",
            CursorKind::Custom(kind) => kind,
        }
    }
}

/// Feature flags sent when a call doesn't override them.
pub fn default_features() -> Map<String, Value> {
    let flags = [
        ("c9s_tweet_anatomy_moderator_badge_enabled", true),
        ("creator_subscriptions_tweet_preview_api_enabled", true),
        ("freedom_of_speech_not_reach_fetch_enabled", true),
        ("graphql_is_translatable_rweb_tweet_is_translatable_enabled", true),
        ("longform_notetweets_consumption_enabled", true),
        ("longform_notetweets_inline_media_enabled", true),
        ("longform_notetweets_rich_text_read_enabled", true),
        ("responsive_web_edit_tweet_api_enabled", true),
        ("responsive_web_enhance_cards_enabled", false),
        ("responsive_web_graphql_exclude_directive_enabled", true),
        ("responsive_web_graphql_skip_user_profile_image_extensions_enabled", false),
        ("responsive_web_graphql_timeline_navigation_enabled", true),
        ("responsive_web_twitter_article_tweet_consumption_enabled", true),
        ("responsive_web_media_download_video_enabled", true),
        ("rweb_video_timestamps_enabled", true),
        ("standardized_nudges_misinfo", true),
        ("tweet_awards_web_tipping_enabled", false),
        ("tweet_with_visibility_results_prefer_gql_limited_actions_policy_enabled", true),
        ("tweetypie_unmention_optimization_enabled", true),
        ("verified_phone_label_enabled", false),
        ("view_counts_everywhere_api_enabled", true),
    ];
    flags
        .into_iter()
        .map(|(name, on)| (name.to_owned(), Value::Bool(on)))
        .collect()
}

/// Defaults with `overrides` applied on top.
pub fn merged_features(overrides: Map<String, Value>) -> Map<String, Value> {
    let mut features = default_features();
    features.extend(overrides);
    features
}
