//! Timeline page inspection
//!
//! Responses nest their `entries` array and cursor objects at depths that
//! differ per operation, so both are found by depth-first search in document
//! order.

use serde_json::Value;

use crate::operations::CursorKind;

const CURSOR_ENTRY_PREFIX: &str = "cursor-";

/// One response page as returned by the service.
#[derive(Debug, Clone)]
pub struct RawPage {
    pub json: Value,
    /// Non-cursor entries on this page.
    pub entry_count: usize,
    /// Continuation for the next page, if the service offered one.
    pub cursor: Option<String>,
    /// Account that served the page.
    pub account: String,
}

/// First value stored under `key`, depth-first.
pub fn find_key<'a>(value: &'a Value, key: &str) -> Option<&'a Value> {
    match value {
        Value::Object(map) => map.iter().find_map(|(k, v)| {
            if k == key {
                Some(v)
            } else {
                find_key(v, key)
            }
        }),
        Value::Array(items) => items.iter().find_map(|v| find_key(v, key)),
        _ => None,
    }
}

/// First object satisfying `pred`, depth-first.
pub fn find_object<'a>(value: &'a Value, pred: &dyn Fn(&Value) -> bool) -> Option<&'a Value> {
    match value {
        Value::Object(map) => {
            if pred(value) {
                return Some(value);
            }
            map.values().find_map(|v| find_object(v, pred))
        }
        Value::Array(items) => items.iter().find_map(|v| find_object(v, pred)),
        _ => None,
    }
}

/// Content entries of a page, cursor entries excluded.
pub fn extract_entries(body: &Value) -> Vec<&Value> {
    find_key(body, "entries")
        .and_then(Value::as_array)
        .map(|entries| {
            entries
                .iter()
                .filter(|entry| {
                    !entry
                        .get("entryId")
                        .and_then(Value::as_str)
                        .is_some_and(|id| id.starts_with(CURSOR_ENTRY_PREFIX))
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Value of the first cursor object of the given kind.
pub fn find_cursor(body: &Value, kind: &CursorKind) -> Option<String> {
    let wanted = kind.as_str();
    find_object(body, &|obj| {
        obj.get("cursorType").and_then(Value::as_str) == Some(wanted)
    })
    .and_then(|obj| obj.get("value"))
    .and_then(Value::as_str)
    .map(str::to_owned)
}
