//! The synchronization descriptor.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use statelink_model::StatePath;

/// Describes how one state instance is shared between execution contexts.
///
/// Field names deserialize from the camelCase option names, so
/// `{"name": "app", "subscriberWindows": ["inspector"]}` is a valid config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SyncOptions {
    /// Storage key on the shared medium. Required and unique per instance.
    pub name: String,
    /// Identity of the provider context. Defaults to `name`.
    pub provider_window: Option<String>,
    /// Identities of subscriber contexts.
    pub subscriber_windows: Vec<String>,
    /// Whether the provider merges the persisted snapshot on startup.
    pub initialize_from_local_storage: bool,
    /// Whether the provider closes its children when it unloads.
    pub remove_children_on_unload: bool,
    /// Whether the provider clears the storage key when it unloads.
    pub clear_storage_on_unload: bool,
    /// Keys and paths that never reach the shared medium.
    pub private_state_paths: Vec<StatePath>,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            name: String::new(),
            provider_window: None,
            subscriber_windows: Vec::new(),
            initialize_from_local_storage: false,
            remove_children_on_unload: true,
            clear_storage_on_unload: true,
            private_state_paths: Vec::new(),
        }
    }
}

impl SyncOptions {
    /// Options with the given storage key and every other field defaulted.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Sets the provider identity.
    #[must_use]
    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider_window = Some(provider.into());
        self
    }

    /// Sets the subscriber identities.
    #[must_use]
    pub fn with_subscribers<I, S>(mut self, subscribers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.subscriber_windows = subscribers.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the private paths.
    #[must_use]
    pub fn with_private_paths<I, P>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<StatePath>,
    {
        self.private_state_paths = paths.into_iter().map(Into::into).collect();
        self
    }

    /// Checks the descriptor is usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::MissingSyncName);
        }
        Ok(())
    }

    /// The storage key used on the shared medium.
    pub fn storage_key(&self) -> &str {
        &self.name
    }

    /// The provider identity, falling back to `name`.
    pub fn effective_provider(&self) -> &str {
        match self.provider_window.as_deref() {
            Some(provider) if !provider.is_empty() => provider,
            _ => &self.name,
        }
    }

    /// Whether `identity` is one of the subscribers.
    pub fn is_subscriber(&self, identity: &str) -> bool {
        self.subscriber_windows.iter().any(|s| s == identity)
    }
}
