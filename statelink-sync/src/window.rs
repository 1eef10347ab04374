//! Child window lifecycle.
//!
//! Only the provider context spawns windows. The [`WindowRegistry`] records
//! a handle per subscriber name; closing goes through the handle. Cascading
//! closure is not recursive: each context closes its direct children on
//! unload, and grandchildren are closed by their own parent running the same
//! teardown.

use crate::error::{SyncError, SyncResult};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info};

/// Window features passed to the host when spawning, e.g. `width=800`.
pub type WindowParams = BTreeMap<String, String>;

/// A handle to a spawned execution context.
pub trait WindowHandle: Send + Sync {
    /// The identity the child was spawned with.
    fn name(&self) -> &str;

    /// Instructs the child to terminate.
    fn close(&self);

    /// Whether the child has been told to close.
    fn is_closed(&self) -> bool;
}

/// Spawns execution contexts.
pub trait WindowHost: Send + Sync {
    /// Opens `url` as a new context carrying identity `name`.
    fn open(&self, url: &str, name: &str, params: &WindowParams) -> SyncResult<Arc<dyn WindowHandle>>;
}

/// The provider's registry of spawned subscriber windows.
pub struct WindowRegistry {
    host: Arc<dyn WindowHost>,
    subscribers: HashSet<String>,
    children: Mutex<HashMap<String, Arc<dyn WindowHandle>>>,
}

impl WindowRegistry {
    /// Creates an empty registry that may only spawn the given subscribers.
    pub fn new<I, S>(host: Arc<dyn WindowHost>, subscribers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            host,
            subscribers: subscribers.into_iter().map(Into::into).collect(),
            children: Mutex::new(HashMap::new()),
        }
    }

    /// Spawns a subscriber window and records its handle.
    ///
    /// A name that is already open is overwritten without closing the old
    /// handle; closing it first is the caller's job.
    pub fn open(&self, url: &str, name: &str, params: &WindowParams) -> SyncResult<Arc<dyn WindowHandle>> {
        if !self.subscribers.contains(name) {
            return Err(SyncError::UnknownWindow(name.to_string()));
        }
        let handle = self.host.open(url, name, params)?;
        let previous = self.children().insert(name.to_string(), handle.clone());
        if previous.is_some() {
            debug!("window {} reopened; previous handle dropped from registry", name);
        }
        info!("opened window {} at {}", name, url);
        Ok(handle)
    }

    /// Closes and forgets the named window. Unknown names are a no-op.
    /// Returns whether a window was closed.
    pub fn close(&self, name: &str) -> bool {
        let handle = self.children().remove(name);
        match handle {
            Some(handle) => {
                handle.close();
                info!("closed window {}", name);
                true
            }
            None => false,
        }
    }

    /// Closes every registered window and empties the registry.
    /// Returns how many were closed.
    pub fn close_all(&self) -> usize {
        let drained: Vec<_> = self.children().drain().collect();
        for (name, handle) in &drained {
            handle.close();
            debug!("closed child window {}", name);
        }
        drained.len()
    }

    /// The live registry: name → handle.
    pub fn get_children(&self) -> HashMap<String, Arc<dyn WindowHandle>> {
        self.children().clone()
    }

    /// Names of the registered windows, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.children().keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of registered windows.
    pub fn len(&self) -> usize {
        self.children().len()
    }

    /// Whether no windows are registered.
    pub fn is_empty(&self) -> bool {
        self.children().is_empty()
    }

    fn children(&self) -> MutexGuard<'_, HashMap<String, Arc<dyn WindowHandle>>> {
        self.children.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for WindowRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WindowRegistry")
            .field("subscribers", &self.subscribers)
            .field("children", &self.names())
            .finish()
    }
}

/// A recording window host for tests and headless embedding.
pub mod mock {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    /// A window that only records whether it was closed.
    #[derive(Debug)]
    pub struct MockWindow {
        name: String,
        url: String,
        params: WindowParams,
        closed: AtomicBool,
    }

    impl MockWindow {
        /// The URL the window was opened with.
        pub fn url(&self) -> &str {
            &self.url
        }

        /// The params the window was opened with.
        pub fn params(&self) -> &WindowParams {
            &self.params
        }
    }

    impl WindowHandle for MockWindow {
        fn name(&self) -> &str {
            &self.name
        }

        fn close(&self) {
            self.closed.store(true, Ordering::SeqCst);
        }

        fn is_closed(&self) -> bool {
            self.closed.load(Ordering::SeqCst)
        }
    }

    /// Records every window it opens.
    #[derive(Debug, Default)]
    pub struct MockWindowHost {
        opened: Mutex<Vec<Arc<MockWindow>>>,
        fail_with: Mutex<Option<String>>,
    }

    impl MockWindowHost {
        /// Creates a host that opens every window successfully.
        pub fn new() -> Self {
            Self::default()
        }

        /// Makes subsequent opens fail with `reason`.
        pub fn fail_opens(&self, reason: impl Into<String>) {
            *self.fail_with.lock().unwrap_or_else(PoisonError::into_inner) = Some(reason.into());
        }

        /// Every window opened so far, in order.
        pub fn opened(&self) -> Vec<Arc<MockWindow>> {
            self.opened.lock().unwrap_or_else(PoisonError::into_inner).clone()
        }
    }

    impl WindowHost for MockWindowHost {
        fn open(&self, url: &str, name: &str, params: &WindowParams) -> SyncResult<Arc<dyn WindowHandle>> {
            if let Some(reason) = self.fail_with.lock().unwrap_or_else(PoisonError::into_inner).clone() {
                return Err(SyncError::WindowOpen {
                    name: name.to_string(),
                    reason,
                });
            }
            let window = Arc::new(MockWindow {
                name: name.to_string(),
                url: url.to_string(),
                params: params.clone(),
                closed: AtomicBool::new(false),
            });
            self.opened
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(window.clone());
            Ok(window)
        }
    }
}
