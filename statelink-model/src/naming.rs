//! Accessor naming convention.
//!
//! `count` becomes `getCount`/`setCount`; the path `["nested", "value"]`
//! becomes `getNested_value`/`setNested_value`. A key or segment that already
//! starts with an uppercase character is never given a generated accessor.

use crate::path::StatePath;

/// Separator used when joining path segments into an accessor name.
pub const PATH_SEPARATOR: char = '_';

/// The verb prefix of an accessor name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccessorVerb {
    Get,
    Set,
}

impl AccessorVerb {
    /// The lowercase prefix, `get` or `set`.
    pub const fn prefix(self) -> &'static str {
        match self {
            Self::Get => "get",
            Self::Set => "set",
        }
    }
}

/// True if `segment` opts out of generated accessors.
pub fn is_reserved_segment(segment: &str) -> bool {
    segment.chars().next().is_some_and(char::is_uppercase)
}

/// Formats `name` as an accessor name for `verb`.
///
/// Returns `None` when no accessor should be generated: the name starts with
/// an uppercase character, or is empty.
pub fn format_accessor_name(name: &str, verb: AccessorVerb) -> Option<String> {
    let mut chars = name.chars();
    let first = chars.next()?;
    if first.is_uppercase() {
        return None;
    }
    let prefix = verb.prefix();
    let mut out = String::with_capacity(prefix.len() + name.len());
    out.push_str(prefix);
    out.extend(first.to_uppercase());
    out.push_str(chars.as_str());
    Some(out)
}

/// Accessor name for a top-level key.
pub fn accessor_name_for_key(key: &str, verb: AccessorVerb) -> Option<String> {
    format_accessor_name(key, verb)
}

/// Accessor name for a path. Any reserved segment excludes the whole path.
pub fn accessor_name_for_path(path: &StatePath, verb: AccessorVerb) -> Option<String> {
    if path.segments().iter().any(|s| is_reserved_segment(s)) {
        return None;
    }
    format_accessor_name(&path.joined(), verb)
}
