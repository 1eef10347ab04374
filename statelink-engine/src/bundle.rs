//! The bundle handed to the host on every commit.
//!
//! A bundle maps keys (`state`, `setters`, `getters`, ...) to engine
//! components. Keys can be renamed, but never onto a reserved name.

use crate::accessors::{GetterMap, SetterMap};
use crate::dispatch::DispatcherMap;
use crate::handle::{EngineHandle, MethodMap};
use statelink_model::State;
use statelink_sync::{ConfigError, WindowRegistry};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// Names owned by the engine. Neither renames nor method groups may use them.
pub const RESERVED_NAMES: &[&str] = &[
    "state",
    "setState",
    "setters",
    "getters",
    "methods",
    "constants",
    "reducers",
    "windowManager",
    "dispatch",
    "subscribe",
];

/// Whether `name` is reserved.
pub fn is_reserved_name(name: &str) -> bool {
    RESERVED_NAMES.contains(&name)
}

/// Which engine component a bundle key points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BundleSlot {
    State,
    Setters,
    Getters,
    Methods,
    Constants,
    Group(String),
    Reducers,
    WindowManager,
}

impl BundleSlot {
    /// The key used when no rename applies.
    pub fn default_key(&self) -> &str {
        match self {
            Self::State => "state",
            Self::Setters => "setters",
            Self::Getters => "getters",
            Self::Methods => "methods",
            Self::Constants => "constants",
            Self::Group(name) => name,
            Self::Reducers => "reducers",
            Self::WindowManager => "windowManager",
        }
    }
}

/// Resolves final bundle keys, applying `rename` and rejecting reserved or
/// duplicate keys.
pub(crate) fn layout<'a>(
    rename: &BTreeMap<String, String>,
    groups: impl IntoIterator<Item = &'a String>,
    has_reducers: bool,
    has_windows: bool,
) -> Result<BTreeMap<String, BundleSlot>, ConfigError> {
    let mut slots = vec![
        BundleSlot::State,
        BundleSlot::Setters,
        BundleSlot::Getters,
        BundleSlot::Methods,
        BundleSlot::Constants,
    ];
    for group in groups {
        if is_reserved_name(group) {
            return Err(ConfigError::ReservedName(group.clone()));
        }
        slots.push(BundleSlot::Group(group.clone()));
    }
    if has_reducers {
        slots.push(BundleSlot::Reducers);
    }
    if has_windows {
        slots.push(BundleSlot::WindowManager);
    }

    for target in rename.values() {
        if is_reserved_name(target) {
            return Err(ConfigError::ReservedName(target.clone()));
        }
    }

    let mut keys = BTreeMap::new();
    for slot in slots {
        let key = rename
            .get(slot.default_key())
            .cloned()
            .unwrap_or_else(|| slot.default_key().to_string());
        if keys.contains_key(&key) {
            return Err(ConfigError::DuplicateBundleKey(key));
        }
        keys.insert(key, slot);
    }

    for source in rename.keys() {
        if !keys.values().any(|slot| slot.default_key() == source) {
            debug!("rename source {} matches no bundle entry", source);
        }
    }

    Ok(keys)
}

/// A borrowed view of one bundle entry.
#[derive(Debug, Clone, Copy)]
pub enum BundleEntry<'a> {
    State(&'a State),
    Setters(&'a SetterMap),
    Getters(&'a GetterMap),
    Methods(&'a MethodMap),
    Constants(&'a State),
    Group(&'a MethodMap),
    Reducers(&'a DispatcherMap),
    WindowManager(&'a Arc<WindowRegistry>),
}

/// The snapshot of named engine components delivered to the host.
#[derive(Clone)]
pub struct Bundle {
    state: Arc<State>,
    handle: EngineHandle,
    keys: Arc<BTreeMap<String, BundleSlot>>,
}

impl Bundle {
    pub(crate) fn new(state: Arc<State>, handle: EngineHandle, keys: Arc<BTreeMap<String, BundleSlot>>) -> Self {
        Self { state, handle, keys }
    }

    /// The state this bundle was taken at.
    pub fn state(&self) -> &State {
        &self.state
    }

    /// The handle to invoke accessors and methods with.
    pub fn handle(&self) -> &EngineHandle {
        &self.handle
    }

    /// All keys, sorted.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.keys.keys().map(String::as_str)
    }

    /// The slot a key resolves to.
    pub fn slot(&self, key: &str) -> Option<&BundleSlot> {
        self.keys.get(key)
    }

    /// Looks up a bundle entry by its (possibly renamed) key.
    pub fn get(&self, key: &str) -> Option<BundleEntry<'_>> {
        let entry = match self.keys.get(key)? {
            BundleSlot::State => BundleEntry::State(&self.state),
            BundleSlot::Setters => BundleEntry::Setters(self.handle.setters()),
            BundleSlot::Getters => BundleEntry::Getters(self.handle.getters()),
            BundleSlot::Methods => BundleEntry::Methods(self.handle.methods()),
            BundleSlot::Constants => BundleEntry::Constants(self.handle.constants()),
            BundleSlot::Group(name) => BundleEntry::Group(self.handle.group(name)?),
            BundleSlot::Reducers => BundleEntry::Reducers(self.handle.dispatchers()),
            BundleSlot::WindowManager => BundleEntry::WindowManager(self.handle.windows()?),
        };
        Some(entry)
    }
}
