//! Error types for the engine.

use statelink_sync::{ConfigError, SyncError};
use thiserror::Error;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors that can occur while building or driving an engine.
///
/// State mutations themselves never fail; these cover setup and lookups.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Fatal configuration problem found at build time.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Shared medium or window failure.
    #[error("sync error: {0}")]
    Sync(#[from] SyncError),

    /// Configuration JSON could not be parsed.
    #[error("invalid configuration: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Synchronization options were given without a shared channel.
    #[error("synchronization is configured but no shared channel was provided")]
    MissingChannel,

    /// No accessor registered under this name.
    #[error("unknown accessor: {0}")]
    UnknownAccessor(String),

    /// No method registered under this name.
    #[error("unknown method: {0}")]
    UnknownMethod(String),

    /// No reducer registered under this name.
    #[error("unknown reducer: {0}")]
    UnknownReducer(String),
}
