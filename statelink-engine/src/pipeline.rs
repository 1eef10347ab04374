//! The update pipeline: the only way state changes.
//!
//! Every mutation takes the update lock, computes the next state from the
//! current one, commits it (notifying the host through a watch channel),
//! persists the redacted snapshot when synchronization is on, and only then
//! completes. Awaiting one update before issuing the next therefore gives
//! read-after-write consistency within a context.

use statelink_model::{clean_state, encode_snapshot, merge_shallow, State, StatePath};
use statelink_sync::{Role, SharedChannel};
use std::fmt;
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tracing::{debug, warn};

/// Called with the committed state before the update's future completes.
pub type Callback = Box<dyn FnOnce(&State) + Send>;

/// Pure updater: previous state in, partial state out.
pub type Updater = Box<dyn FnOnce(&State) -> State + Send>;

/// A state change submitted to the pipeline.
pub enum Update {
    /// Top-level keys to merge into the current state.
    Partial(State),
    /// Computes the partial state from the state current at commit time.
    Updater(Updater),
}

impl Update {
    /// Wraps a closure as an [`Update::Updater`].
    pub fn updater<F>(f: F) -> Self
    where
        F: FnOnce(&State) -> State + Send + 'static,
    {
        Self::Updater(Box::new(f))
    }
}

impl From<State> for Update {
    fn from(partial: State) -> Self {
        Self::Partial(partial)
    }
}

impl fmt::Debug for Update {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Partial(partial) => f.debug_tuple("Partial").field(partial).finish(),
            Self::Updater(_) => f.write_str("Updater(..)"),
        }
    }
}

/// Where and how committed state is persisted.
pub(crate) struct Persistence {
    pub channel: Arc<dyn SharedChannel>,
    pub key: String,
    pub private_paths: Vec<StatePath>,
    pub role: Role,
}

/// The update pipeline. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct Pipeline {
    inner: Arc<PipelineInner>,
}

struct PipelineInner {
    state: watch::Sender<Arc<State>>,
    update_lock: Mutex<()>,
    persistence: Option<Persistence>,
}

impl Pipeline {
    /// A local pipeline with no persistence.
    pub fn new(initial: State) -> Self {
        Self::with_persistence(initial, None)
    }

    pub(crate) fn with_persistence(initial: State, persistence: Option<Persistence>) -> Self {
        let (state, _) = watch::channel(Arc::new(initial));
        Self {
            inner: Arc::new(PipelineInner {
                state,
                update_lock: Mutex::new(()),
                persistence,
            }),
        }
    }

    /// The committed state.
    pub fn state(&self) -> Arc<State> {
        self.inner.state.borrow().clone()
    }

    /// Receives every commit. This is the host's render-on-update signal.
    pub fn subscribe(&self) -> watch::Receiver<Arc<State>> {
        self.inner.state.subscribe()
    }

    /// Whether commits are written to a shared medium.
    pub fn is_persistent(&self) -> bool {
        self.inner.persistence.is_some()
    }

    /// Merges `update` into the current state, commits, persists, runs
    /// `callback`, and resolves to the new state.
    pub async fn set_state(&self, update: Update, callback: Option<Callback>) -> Arc<State> {
        let next = {
            let _guard = self.inner.update_lock.lock().await;
            let current = self.state();
            let partial = match update {
                Update::Partial(partial) => partial,
                Update::Updater(f) => f(&current),
            };
            let next = Arc::new(merge_shallow(&current, partial));
            self.commit_and_persist(next).await
        };

        if let Some(callback) = callback {
            callback(&next);
        }
        next
    }

    /// Replaces the whole state, bypassing merge semantics.
    pub async fn replace_state(&self, next: State) -> Arc<State> {
        let _guard = self.inner.update_lock.lock().await;
        self.commit_and_persist(Arc::new(next)).await
    }

    /// Computes a full replacement from the state current at commit time.
    pub async fn replace_with<F>(&self, f: F) -> Arc<State>
    where
        F: FnOnce(&State) -> State + Send,
    {
        let _guard = self.inner.update_lock.lock().await;
        let next = f(&self.state());
        self.commit_and_persist(Arc::new(next)).await
    }

    /// Persists the committed state without changing it.
    pub(crate) async fn flush(&self) {
        let _guard = self.inner.update_lock.lock().await;
        let current = self.state();
        self.persist(&current).await;
    }

    async fn commit_and_persist(&self, next: Arc<State>) -> Arc<State> {
        self.inner.state.send_replace(next.clone());
        self.persist(&next).await;
        next
    }

    async fn persist(&self, state: &State) {
        let Some(persistence) = &self.inner.persistence else {
            return;
        };

        let snapshot = if persistence.private_paths.is_empty() {
            encode_snapshot(state)
        } else {
            encode_snapshot(&clean_state(state, &persistence.private_paths))
        };

        let text = match snapshot {
            Ok(text) => text,
            Err(e) => {
                warn!("failed to encode snapshot for {}: {e}", persistence.key);
                return;
            }
        };

        match persistence.channel.write(&persistence.key, &text).await {
            Ok(()) => debug!(
                "{} persisted {} ({} bytes)",
                persistence.role,
                persistence.key,
                text.len()
            ),
            Err(e) => warn!("failed to persist {}: {e}", persistence.key),
        }
    }
}
