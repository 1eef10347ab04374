//! In-process shared medium.
//!
//! Every [`MemoryChannel`] created from the same [`MemoryMedium`] sees the
//! same entries, the way browser tabs of one origin share local storage.

use crate::channel::{ChangeNotice, ChangeSubscription, ContextId, SharedChannel};
use crate::error::SyncResult;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::broadcast;
use tracing::debug;

const NOTICE_CAPACITY: usize = 64;

/// A process-local key-value medium shared by many channels.
#[derive(Clone)]
pub struct MemoryMedium {
    inner: Arc<MemoryInner>,
}

struct MemoryInner {
    entries: Mutex<HashMap<String, String>>,
    notices: broadcast::Sender<ChangeNotice>,
}

impl MemoryMedium {
    /// Creates an empty medium.
    pub fn new() -> Self {
        let (notices, _) = broadcast::channel(NOTICE_CAPACITY);
        Self {
            inner: Arc::new(MemoryInner {
                entries: Mutex::new(HashMap::new()),
                notices,
            }),
        }
    }

    /// Attaches a new execution context to this medium.
    pub fn channel(&self) -> MemoryChannel {
        MemoryChannel {
            id: ContextId::new(),
            medium: self.clone(),
        }
    }

    /// Reads an entry directly, bypassing any channel.
    pub fn get(&self, key: &str) -> Option<String> {
        self.entries().get(key).cloned()
    }

    /// Whether `key` is present.
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries().contains_key(key)
    }

    /// All stored keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.entries().keys().cloned().collect();
        keys.sort();
        keys
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, String>> {
        self.inner
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn notify(&self, key: &str, origin: ContextId) {
        // No receivers is fine: nobody is listening yet.
        let _ = self.inner.notices.send(ChangeNotice {
            key: key.to_string(),
            origin,
        });
    }
}

impl Default for MemoryMedium {
    fn default() -> Self {
        Self::new()
    }
}

/// One context's view of a [`MemoryMedium`].
#[derive(Clone)]
pub struct MemoryChannel {
    id: ContextId,
    medium: MemoryMedium,
}

impl MemoryChannel {
    /// The medium this channel is attached to.
    pub fn medium(&self) -> &MemoryMedium {
        &self.medium
    }
}

#[async_trait]
impl SharedChannel for MemoryChannel {
    fn context_id(&self) -> ContextId {
        self.id
    }

    async fn read(&self, key: &str) -> SyncResult<Option<String>> {
        Ok(self.medium.get(key))
    }

    async fn write(&self, key: &str, value: &str) -> SyncResult<()> {
        let changed = {
            let mut entries = self.medium.entries();
            match entries.get(key) {
                Some(existing) if existing == value => false,
                _ => {
                    entries.insert(key.to_string(), value.to_string());
                    true
                }
            }
        };

        if changed {
            debug!("context {} wrote {} ({} bytes)", self.id, key, value.len());
            self.medium.notify(key, self.id);
        }
        Ok(())
    }

    async fn remove(&self, key: &str) -> SyncResult<()> {
        let existed = self.medium.entries().remove(key).is_some();
        if existed {
            debug!("context {} removed {}", self.id, key);
            self.medium.notify(key, self.id);
        }
        Ok(())
    }

    fn subscribe(&self, key: &str) -> ChangeSubscription {
        ChangeSubscription::new(key, self.id, self.medium.inner.notices.subscribe())
    }
}
