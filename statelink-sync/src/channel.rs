//! Shared channel abstraction.
//!
//! A [`SharedChannel`] is one execution context's view of the shared medium.
//! Writes made through a channel are announced to every *other* channel on
//! the same medium; the writer never hears about its own writes.

use crate::error::SyncResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;
use tracing::debug;
use uuid::Uuid;

/// Identifies one execution context attached to a medium.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContextId(Uuid);

impl ContextId {
    /// Creates a new random context ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parses a context ID from a string.
    pub fn parse(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl Default for ContextId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Announces that a key on the medium changed. Carries no value; listeners
/// re-read the medium.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeNotice {
    /// The key that changed.
    pub key: String,
    /// The context that wrote it.
    pub origin: ContextId,
}

/// One context's handle on the shared medium.
#[async_trait]
pub trait SharedChannel: Send + Sync {
    /// The context this channel belongs to.
    fn context_id(&self) -> ContextId;

    /// Reads the raw value stored under `key`.
    async fn read(&self, key: &str) -> SyncResult<Option<String>>;

    /// Stores `value` under `key`. Other contexts are notified only if the
    /// stored value actually changed.
    async fn write(&self, key: &str, value: &str) -> SyncResult<()>;

    /// Removes `key`. Other contexts are notified if it existed.
    async fn remove(&self, key: &str) -> SyncResult<()>;

    /// Subscribes to external changes of `key`.
    fn subscribe(&self, key: &str) -> ChangeSubscription;
}

/// Receives change notices for a single key written by other contexts.
pub struct ChangeSubscription {
    key: String,
    own: ContextId,
    rx: broadcast::Receiver<ChangeNotice>,
}

impl ChangeSubscription {
    /// Wraps a raw notice receiver, filtering to `key` and dropping notices
    /// that originate from `own`.
    pub fn new(key: impl Into<String>, own: ContextId, rx: broadcast::Receiver<ChangeNotice>) -> Self {
        Self {
            key: key.into(),
            own,
            rx,
        }
    }

    /// The key this subscription watches.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Waits for the next external change.
    /// Returns `None` once the medium is gone.
    pub async fn recv(&mut self) -> Option<ChangeNotice> {
        loop {
            match self.rx.recv().await {
                Ok(notice) if notice.key == self.key && notice.origin != self.own => {
                    return Some(notice);
                }
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    // Notices carry no payload, so one re-read covers all of them.
                    debug!("change subscription for {} lagged by {}", self.key, skipped);
                    return Some(ChangeNotice {
                        key: self.key.clone(),
                        origin: self.own,
                    });
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}
