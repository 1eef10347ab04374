//! Synchronization runtime.
//!
//! Owns one context's link to the shared medium once the engine is built:
//! the change listener, reconciliation of external snapshots into the live
//! state, and teardown on unload.

use crate::error::EngineResult;
use crate::pipeline::{Pipeline, Update};
use statelink_model::{
    clean_state, decode_snapshot, decode_snapshot_lenient, get_at, merge_shallow, set_at, State, StatePath,
};
use statelink_sync::{Role, SharedChannel, SyncOptions, WindowRegistry};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Computes the state a context starts from.
///
/// The provider keeps its defaults unless `initialize_from_local_storage` is
/// set, in which case the persisted snapshot is merged over them. A
/// subscriber always starts from the persisted snapshot, falling back to its
/// redacted defaults when nothing usable is stored.
pub(crate) async fn initial_state(
    channel: &dyn SharedChannel,
    options: &SyncOptions,
    role: Role,
    defaults: State,
) -> State {
    let key = options.storage_key();
    let load = role == Role::Subscriber || options.initialize_from_local_storage;
    if !load {
        return defaults;
    }

    let persisted = match channel.read(key).await {
        Ok(Some(text)) => decode_any(key, &text),
        Ok(None) => None,
        Err(e) => {
            warn!("failed to read initial snapshot for {}: {e}", key);
            None
        }
    };

    match (role, persisted) {
        (Role::Provider, Some(persisted)) => {
            info!("provider of {} initialized from shared medium", key);
            merge_shallow(&defaults, persisted)
        }
        (Role::Provider, None) => defaults,
        (Role::Subscriber, Some(persisted)) => {
            info!("subscriber of {} initialized from shared medium", key);
            persisted
        }
        (Role::Subscriber, None) => {
            debug!("nothing persisted under {}; subscriber starts from redacted defaults", key);
            clean_state(&defaults, &options.private_state_paths)
        }
    }
}

fn decode_any(key: &str, text: &str) -> Option<State> {
    match decode_snapshot(text) {
        Ok(state) => Some(state),
        Err(e) => {
            warn!("malformed snapshot under {}: {e}; retrying leniently", key);
            decode_snapshot_lenient(text)
        }
    }
}

// Private values never travel through the medium, so whatever the live state
// holds at those paths is carried over into the incoming snapshot.
fn restore_private(mut incoming: State, current: &State, private_paths: &[StatePath]) -> State {
    for path in private_paths {
        if let Some(value) = get_at(current, path) {
            incoming = set_at(&incoming, path, value.clone());
        }
    }
    incoming
}

/// What the listener task and [`SyncRuntime::reconcile`] share.
struct SyncLink {
    channel: Arc<dyn SharedChannel>,
    options: SyncOptions,
    role: Role,
    pipeline: Pipeline,
}

impl SyncLink {
    async fn reconcile(&self) -> EngineResult<Option<Arc<State>>> {
        let key = self.options.storage_key();
        let Some(text) = self.channel.read(key).await? else {
            debug!("{} cleared on shared medium; keeping local state", key);
            return Ok(None);
        };

        let private_paths = self.options.private_state_paths.clone();

        match decode_snapshot(&text) {
            Ok(incoming) => {
                let current = self.pipeline.state();
                let merged = merge_shallow(&current, restore_private(incoming.clone(), &current, &private_paths));
                if merged == *current {
                    return Ok(None);
                }
                debug!("{} merging external snapshot of {}", self.role, key);
                let update = Update::updater(move |prev: &State| restore_private(incoming, prev, &private_paths));
                Ok(Some(self.pipeline.set_state(update, None).await))
            }
            Err(e) => {
                warn!("malformed snapshot under {}: {e}; falling back to full replacement", key);
                let Some(incoming) = decode_snapshot_lenient(&text) else {
                    warn!("snapshot under {} is unreadable; ignoring change", key);
                    return Ok(None);
                };
                let next = self
                    .pipeline
                    .replace_with(move |prev| restore_private(incoming, prev, &private_paths))
                    .await;
                Ok(Some(next))
            }
        }
    }
}

/// One context's live link to the shared medium.
pub(crate) struct SyncRuntime {
    link: Arc<SyncLink>,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl SyncRuntime {
    pub(crate) fn new(channel: Arc<dyn SharedChannel>, options: SyncOptions, role: Role, pipeline: Pipeline) -> Self {
        Self {
            link: Arc::new(SyncLink {
                channel,
                options,
                role,
                pipeline,
            }),
            listener: Mutex::new(None),
        }
    }

    pub(crate) fn options(&self) -> &SyncOptions {
        &self.link.options
    }

    /// Whether the change listener is running.
    pub(crate) fn is_listening(&self) -> bool {
        self.listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    /// Publishes the provider's initial snapshot and starts listening for
    /// external changes. Calling it again is a no-op.
    pub(crate) async fn start(&self) -> EngineResult<()> {
        if self.is_listening() {
            return Ok(());
        }

        let key = self.link.options.storage_key().to_string();
        // Subscribe before publishing or re-reading so no change slips past.
        let mut changes = self.link.channel.subscribe(&key);

        match self.link.role {
            Role::Provider => self.link.pipeline.flush().await,
            Role::Subscriber => {
                self.link.reconcile().await?;
            }
        }

        let link = self.link.clone();
        let task = tokio::spawn(async move {
            while let Some(notice) = changes.recv().await {
                debug!("{} observed change of {} from {}", link.role, notice.key, notice.origin);
                if let Err(e) = link.reconcile().await {
                    warn!("failed to reconcile {}: {e}", notice.key);
                }
            }
            debug!("change listener for {} stopped", key);
        });

        *self.listener.lock().unwrap_or_else(PoisonError::into_inner) = Some(task);
        info!(
            "{} {} listening on {}",
            self.link.role,
            self.link.channel.context_id(),
            self.link.options.storage_key()
        );
        Ok(())
    }

    /// Applies the snapshot currently on the medium. Resolves to the new
    /// state, or `None` when nothing changed.
    pub(crate) async fn reconcile(&self) -> EngineResult<Option<Arc<State>>> {
        self.link.reconcile().await
    }

    /// Stops listening, clears the storage key (provider only) and closes
    /// direct children, as configured.
    pub(crate) async fn unload(&self, windows: Option<&WindowRegistry>) -> EngineResult<()> {
        self.stop();

        let options = &self.link.options;
        if self.link.role == Role::Provider && options.clear_storage_on_unload {
            self.link.channel.remove(options.storage_key()).await?;
            info!("cleared {} from shared medium", options.storage_key());
        }

        if options.remove_children_on_unload {
            if let Some(windows) = windows {
                let closed = windows.close_all();
                info!("closed {} child window(s) on unload", closed);
            }
        }
        Ok(())
    }

    fn stop(&self) {
        if let Some(task) = self.listener.lock().unwrap_or_else(PoisonError::into_inner).take() {
            task.abort();
        }
    }
}

impl Drop for SyncRuntime {
    fn drop(&mut self) {
        self.stop();
    }
}
