//! Accessor factory.
//!
//! Builds a named getter and setter per top-level key and, optionally, per
//! nested path of the initial state. Accessors carry no reference to the
//! engine; they are invoked with an explicit [`EngineHandle`] and always act
//! on the live state, never on a snapshot taken at build time.

use crate::config::{EngineOptions, OverwritePolicy};
use crate::handle::EngineHandle;
use crate::pipeline::{Callback, Update, Updater};
use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::Value;
use statelink_model::{accessor_name_for_path, discover_paths, get_at, set_at, AccessorVerb, State, StatePath};
use statelink_sync::ConfigError;
use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, warn};

/// The value passed to a setter.
pub enum SetValue {
    /// Replaces the target key or path.
    Value(Value),
    /// Computes a partial state from the previous state.
    Updater(Updater),
}

impl SetValue {
    /// Wraps a closure as a [`SetValue::Updater`].
    pub fn updater<F>(f: F) -> Self
    where
        F: FnOnce(&State) -> State + Send + 'static,
    {
        Self::Updater(Box::new(f))
    }
}

impl From<Value> for SetValue {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}

impl fmt::Debug for SetValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(value) => f.debug_tuple("Value").field(value).finish(),
            Self::Updater(_) => f.write_str("Updater(..)"),
        }
    }
}

/// Reads from the live state.
pub type GetterFn = Arc<dyn Fn(&EngineHandle) -> Option<Value> + Send + Sync>;

/// Writes through the update pipeline.
pub type SetterFn =
    Arc<dyn Fn(EngineHandle, SetValue, Option<Callback>) -> BoxFuture<'static, Arc<State>> + Send + Sync>;

/// Where an accessor came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessorSource {
    /// Derived from the state shape at this path.
    Generated(StatePath),
    /// Supplied by the caller.
    Custom,
}

/// A named getter.
#[derive(Clone)]
pub struct Getter {
    name: String,
    source: AccessorSource,
    f: GetterFn,
}

impl Getter {
    /// A caller-supplied getter.
    pub fn custom<F>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&EngineHandle) -> Option<Value> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            source: AccessorSource::Custom,
            f: Arc::new(f),
        }
    }

    fn for_path(name: String, path: StatePath) -> Self {
        let target = path.clone();
        Self {
            name,
            source: AccessorSource::Generated(path),
            f: Arc::new(move |handle: &EngineHandle| get_at(&handle.state(), &target).cloned()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source(&self) -> &AccessorSource {
        &self.source
    }

    /// Reads the current value.
    pub fn get(&self, handle: &EngineHandle) -> Option<Value> {
        (self.f)(handle)
    }
}

impl fmt::Debug for Getter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Getter")
            .field("name", &self.name)
            .field("source", &self.source)
            .finish()
    }
}

/// A named setter.
#[derive(Clone)]
pub struct Setter {
    name: String,
    source: AccessorSource,
    f: SetterFn,
}

impl Setter {
    /// A caller-supplied setter.
    pub fn custom<F, Fut>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(EngineHandle, SetValue, Option<Callback>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Arc<State>> + Send + 'static,
    {
        Self {
            name: name.into(),
            source: AccessorSource::Custom,
            f: Arc::new(
                move |handle: EngineHandle, value: SetValue, callback: Option<Callback>| {
                    f(handle, value, callback).boxed()
                },
            ),
        }
    }

    fn for_path(name: String, path: StatePath) -> Self {
        let target = path.clone();
        let f: SetterFn = Arc::new(move |handle: EngineHandle, value: SetValue, callback: Option<Callback>| {
            let target = target.clone();
            async move {
                let update = match value {
                    SetValue::Updater(updater) => Update::Updater(updater),
                    // Written inside the pipeline so the copy is made from the
                    // state current at commit time.
                    SetValue::Value(value) => Update::updater(move |prev: &State| set_at(prev, &target, value)),
                };
                handle.set_state(update, callback).await
            }
            .boxed()
        });
        Self {
            name,
            source: AccessorSource::Generated(path),
            f,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source(&self) -> &AccessorSource {
        &self.source
    }

    /// Sets the value and resolves to the committed state.
    pub async fn call(&self, handle: &EngineHandle, value: impl Into<SetValue>) -> Arc<State> {
        (self.f)(handle.clone(), value.into(), None).await
    }

    /// Like [`Setter::call`], running `callback` with the new state first.
    pub async fn call_with(
        &self,
        handle: &EngineHandle,
        value: impl Into<SetValue>,
        callback: Callback,
    ) -> Arc<State> {
        (self.f)(handle.clone(), value.into(), Some(callback)).await
    }
}

impl fmt::Debug for Setter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Setter")
            .field("name", &self.name)
            .field("source", &self.source)
            .finish()
    }
}

pub type GetterMap = BTreeMap<String, Getter>;
pub type SetterMap = BTreeMap<String, Setter>;

/// Two distinct paths that format to the same accessor name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameCollision {
    pub name: String,
    /// The path that owns the name.
    pub kept: StatePath,
    /// The path that lost it.
    pub dropped: StatePath,
}

// Top-level keys first, then nested paths in discovery order. On a name
// collision the later path wins.
fn generate<T>(
    state: &State,
    ignored_names: &[String],
    include_nested: bool,
    verb: AccessorVerb,
    make: impl Fn(String, StatePath) -> T,
) -> (BTreeMap<String, T>, Vec<NameCollision>) {
    let mut targets: Vec<StatePath> = state.keys().map(|k| StatePath::key(k.as_str())).collect();
    if include_nested {
        targets.extend(discover_paths(state));
    }

    let mut entries: BTreeMap<String, StatePath> = BTreeMap::new();
    let mut collisions = Vec::new();

    for path in targets {
        if ignored_names.iter().any(|n| *n == path.joined()) {
            debug!("skipping ignored accessor target {}", path);
            continue;
        }
        let Some(name) = accessor_name_for_path(&path, verb) else {
            continue;
        };
        if let Some(previous) = entries.insert(name.clone(), path.clone()) {
            warn!(
                "accessor {} derived from both {} and {}; keeping {}",
                name, previous, path, path
            );
            collisions.push(NameCollision {
                name,
                kept: path,
                dropped: previous,
            });
        }
    }

    let accessors = entries
        .into_iter()
        .map(|(name, path)| (name.clone(), make(name, path)))
        .collect();
    (accessors, collisions)
}

fn generate_getters(state: &State, ignored_names: &[String], include_nested: bool) -> (GetterMap, Vec<NameCollision>) {
    generate(state, ignored_names, include_nested, AccessorVerb::Get, Getter::for_path)
}

fn generate_setters(state: &State, ignored_names: &[String], include_nested: bool) -> (SetterMap, Vec<NameCollision>) {
    generate(state, ignored_names, include_nested, AccessorVerb::Set, Setter::for_path)
}

/// Builds a getter for every top-level key and, with `include_nested`, every
/// nested path. Names listed in `ignored_names` are skipped.
pub fn create_state_getters(state: &State, ignored_names: &[String], include_nested: bool) -> GetterMap {
    generate_getters(state, ignored_names, include_nested).0
}

/// Builds a setter for every top-level key and, with `include_nested`, every
/// nested path. Names listed in `ignored_names` are skipped.
pub fn create_state_setters(state: &State, ignored_names: &[String], include_nested: bool) -> SetterMap {
    generate_setters(state, ignored_names, include_nested).0
}

/// Merges caller-supplied accessors into generated ones under `policy`.
///
/// When overwriting is allowed custom entries always win. Otherwise a
/// colliding custom entry is dropped (silently at level 0, with a warning at
/// level 1) or the whole build fails (level 2 and above).
pub fn apply_overrides<T>(
    generated: &mut BTreeMap<String, T>,
    custom: BTreeMap<String, T>,
    policy: OverwritePolicy,
) -> Result<(), ConfigError> {
    for (name, entry) in custom {
        if !policy.allow && generated.contains_key(&name) {
            match policy.level {
                0 => {
                    debug!("dropping custom accessor {} in favour of generated one", name);
                    continue;
                }
                1 => {
                    if policy.warnings {
                        warn!(
                            "custom accessor {} collides with a generated accessor and was ignored; \
                             set allowSetterOverwrite to replace it",
                            name
                        );
                    }
                    continue;
                }
                _ => return Err(ConfigError::OverwriteConflict(name)),
            }
        }
        generated.insert(name, entry);
    }
    Ok(())
}

/// The compiled getters and setters of one engine.
#[derive(Debug, Clone, Default)]
pub struct AccessorRegistry {
    getters: GetterMap,
    setters: SetterMap,
    collisions: Vec<NameCollision>,
}

impl AccessorRegistry {
    /// Generates accessors for `state` according to `options`, then applies
    /// the custom ones under the overwrite policy.
    pub fn build(
        state: &State,
        options: &EngineOptions,
        custom_getters: GetterMap,
        custom_setters: SetterMap,
    ) -> Result<Self, ConfigError> {
        let mut collisions = Vec::new();

        let mut getters = if options.dynamic_getters {
            let (getters, found) = generate_getters(state, &options.ignored_names, options.nested_getters);
            collisions.extend(found);
            getters
        } else {
            GetterMap::new()
        };

        let mut setters = if options.dynamic_setters {
            let (setters, found) = generate_setters(state, &options.ignored_names, options.nested_setters);
            collisions.extend(found);
            setters
        } else {
            SetterMap::new()
        };

        let policy = options.overwrite_policy();
        apply_overrides(&mut getters, custom_getters, policy)?;
        apply_overrides(&mut setters, custom_setters, policy)?;

        debug!(
            "accessor registry built: {} getters, {} setters",
            getters.len(),
            setters.len()
        );

        Ok(Self {
            getters,
            setters,
            collisions,
        })
    }

    pub fn getters(&self) -> &GetterMap {
        &self.getters
    }

    pub fn setters(&self) -> &SetterMap {
        &self.setters
    }

    pub fn getter(&self, name: &str) -> Option<&Getter> {
        self.getters.get(name)
    }

    pub fn setter(&self, name: &str) -> Option<&Setter> {
        self.setters.get(name)
    }

    /// Names claimed by more than one generated path.
    pub fn collisions(&self) -> &[NameCollision] {
        &self.collisions
    }
}
