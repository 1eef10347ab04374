//! Snapshot text format for the shared medium.
//!
//! A snapshot is a JSON object. Keys serialize in sorted order, so two equal
//! states always produce identical text.

use crate::State;
use serde_json::Value;

/// Serializes a state into snapshot text.
pub fn encode_snapshot(state: &State) -> crate::Result<String> {
    Ok(serde_json::to_string(state)?)
}

/// Parses snapshot text. Anything other than a JSON object is an error.
pub fn decode_snapshot(text: &str) -> crate::Result<State> {
    Ok(serde_json::from_str(text)?)
}

/// Best-effort parse for snapshots that failed [`decode_snapshot`].
///
/// Strips surrounding whitespace, BOM and NUL padding, accepts a snapshot
/// that was itself stored as a JSON string, and ignores trailing garbage
/// after the first complete object.
pub fn decode_snapshot_lenient(text: &str) -> Option<State> {
    let trimmed = text.trim_matches(|c: char| c.is_whitespace() || c == '\u{feff}' || c == '\0');

    if let Ok(state) = serde_json::from_str::<State>(trimmed) {
        return Some(state);
    }

    if let Ok(Value::String(inner)) = serde_json::from_str::<Value>(trimmed) {
        if let Ok(state) = serde_json::from_str::<State>(inner.trim()) {
            return Some(state);
        }
    }

    serde_json::Deserializer::from_str(trimmed)
        .into_iter::<State>()
        .next()
        .and_then(Result::ok)
}
