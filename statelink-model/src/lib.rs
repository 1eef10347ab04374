//! State shape model for statelink.
//!
//! This crate holds the pure, I/O-free pieces that every other statelink
//! crate builds on:
//! - [`State`]: the JSON mapping that is the single source of truth
//! - [`StatePath`] and [`discover_paths`]: addressable nested locations
//! - [`format_accessor_name`]: the `get*`/`set*` naming convention
//! - [`clean_state`]: redaction of private paths before persistence
//! - [`encode_snapshot`] / [`decode_snapshot`]: the shared-medium text format
//!
//! Nothing here mutates its input. Writes produce a new [`State`].

mod naming;
mod path;
mod redact;
mod snapshot;

pub use naming::{
    accessor_name_for_key, accessor_name_for_path, format_accessor_name, is_reserved_segment,
    AccessorVerb, PATH_SEPARATOR,
};
pub use path::{discover_paths, get_at, merge_shallow, set_at, StatePath};
pub use redact::{clean_state, clean_state_report, RedactionWarning};
pub use snapshot::{decode_snapshot, decode_snapshot_lenient, encode_snapshot};

/// A state object: string keys mapped to JSON values.
///
/// Nested mappings are `Value::Object`; arrays are treated as opaque leaves.
pub type State = serde_json::Map<String, serde_json::Value>;

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, ModelError>;

/// Errors that can occur in model operations.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("state path must have at least one segment")]
    EmptyPath,
}
