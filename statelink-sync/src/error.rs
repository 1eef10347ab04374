//! Error types for the sync layer.

use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur in sync operations.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Shared medium read/write failure.
    #[error("storage error: {0}")]
    Storage(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Snapshot could not be encoded or decoded.
    #[error("snapshot error: {0}")]
    Snapshot(#[from] statelink_model::ModelError),

    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Window name is not one of the configured subscribers.
    #[error("unknown window: {0}")]
    UnknownWindow(String),

    /// A provider-only operation was attempted from another context.
    #[error("window management is only available to the provider context (current: {0})")]
    NotProvider(String),

    /// The host failed to spawn a window.
    #[error("failed to open window {name}: {reason}")]
    WindowOpen { name: String, reason: String },

    /// Channel closed.
    #[error("channel closed")]
    ChannelClosed,
}

/// Fatal setup errors. Construction aborts when one of these is raised.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// Synchronization was enabled without a storage key name.
    #[error("synchronization requires a non-empty `name`")]
    MissingSyncName,

    /// A rename target or namespaced group collides with a framework name.
    #[error("`{0}` is reserved and cannot be used as a bundle key")]
    ReservedName(String),

    /// Two bundle entries would end up under the same key.
    #[error("bundle key `{0}` is used more than once")]
    DuplicateBundleKey(String),

    /// A custom accessor collides with a generated one under strict policy.
    #[error("custom accessor `{0}` would overwrite a generated accessor")]
    OverwriteConflict(String),
}
