//! Engine configuration.

use crate::error::EngineResult;
use serde::{Deserialize, Serialize};
use statelink_sync::SyncOptions;
use std::collections::BTreeMap;

/// Options controlling accessor generation, overwrite policy, bundle key
/// renames and (optionally) synchronization.
///
/// Deserializes from the camelCase option names:
///
/// ```
/// use statelink_engine::EngineOptions;
///
/// let options = EngineOptions::from_json(r#"{"nestedSetters": true}"#).unwrap();
/// assert!(options.nested_setters);
/// assert!(options.dynamic_getters);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineOptions {
    /// Generate a setter per top-level key.
    pub dynamic_setters: bool,
    /// Generate a getter per top-level key.
    pub dynamic_getters: bool,
    /// Also generate setters for nested paths.
    pub nested_setters: bool,
    /// Also generate getters for nested paths.
    pub nested_getters: bool,
    /// Let custom accessors replace generated ones.
    pub allow_setter_overwrite: bool,
    /// Emit warnings for blocked overwrites.
    pub development_warnings: bool,
    /// 0 drops silently, 1 drops with a warning, 2+ fails the build.
    pub overwrite_protection_level: u8,
    /// Keys or underscore-joined paths that get no generated accessors.
    pub ignored_names: Vec<String>,
    /// Bundle key renames: default key → new key.
    pub rename: BTreeMap<String, String>,
    /// Synchronization descriptor. `None` keeps the engine local.
    pub sync: Option<SyncOptions>,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            dynamic_setters: true,
            dynamic_getters: true,
            nested_setters: false,
            nested_getters: true,
            allow_setter_overwrite: true,
            development_warnings: true,
            overwrite_protection_level: 1,
            ignored_names: Vec::new(),
            rename: BTreeMap::new(),
            sync: None,
        }
    }
}

impl EngineOptions {
    /// Parses options from JSON.
    pub fn from_json(json: &str) -> EngineResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// The policy applied when a custom accessor shadows a generated one.
    pub fn overwrite_policy(&self) -> OverwritePolicy {
        OverwritePolicy {
            allow: self.allow_setter_overwrite,
            warnings: self.development_warnings,
            level: self.overwrite_protection_level,
        }
    }

    /// Whether `name` was listed in `ignored_names`.
    pub fn is_ignored(&self, name: &str) -> bool {
        self.ignored_names.iter().any(|n| n == name)
    }
}

/// How name collisions between custom and generated accessors resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OverwritePolicy {
    pub allow: bool,
    pub warnings: bool,
    pub level: u8,
}
