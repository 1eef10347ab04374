//! Engine construction and lifecycle.
//!
//! [`StateEngineBuilder`] collects the initial state, options and
//! caller-supplied pieces, then [`StateEngineBuilder::build`] validates the
//! configuration, assigns the context's role, loads the initial state and
//! wires the accessors, pipeline and dispatchers together.

use crate::accessors::{AccessorRegistry, Getter, GetterMap, Setter, SetterMap};
use crate::bundle::{self, Bundle, BundleSlot};
use crate::config::EngineOptions;
use crate::dispatch::{create_dispatchers, Action, Reducer};
use crate::error::{EngineError, EngineResult};
use crate::handle::{EngineHandle, HandleInner, Method, MethodMap};
use crate::pipeline::{Persistence, Pipeline};
use crate::sync::{initial_state, SyncRuntime};
use serde_json::Value;
use statelink_model::State;
use statelink_sync::{
    assign_role, Role, SharedChannel, SyncError, WindowHandle, WindowHost, WindowParams, WindowRegistry,
};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

/// Collects everything needed to build a [`StateEngine`].
pub struct StateEngineBuilder {
    state: State,
    options: EngineOptions,
    getters: GetterMap,
    setters: SetterMap,
    methods: MethodMap,
    groups: BTreeMap<String, MethodMap>,
    constants: State,
    reducers: BTreeMap<String, Reducer>,
    channel: Option<Arc<dyn SharedChannel>>,
    window_host: Option<Arc<dyn WindowHost>>,
    identity: Option<String>,
}

impl StateEngineBuilder {
    /// Starts a builder from the default state.
    pub fn new(state: State) -> Self {
        Self {
            state,
            options: EngineOptions::default(),
            getters: GetterMap::new(),
            setters: SetterMap::new(),
            methods: MethodMap::new(),
            groups: BTreeMap::new(),
            constants: State::new(),
            reducers: BTreeMap::new(),
            channel: None,
            window_host: None,
            identity: None,
        }
    }

    #[must_use]
    pub fn options(mut self, options: EngineOptions) -> Self {
        self.options = options;
        self
    }

    /// Adds a custom getter, subject to the overwrite policy.
    #[must_use]
    pub fn getter(mut self, getter: Getter) -> Self {
        self.getters.insert(getter.name().to_string(), getter);
        self
    }

    /// Adds a custom setter, subject to the overwrite policy.
    #[must_use]
    pub fn setter(mut self, setter: Setter) -> Self {
        self.setters.insert(setter.name().to_string(), setter);
        self
    }

    #[must_use]
    pub fn method(mut self, method: Method) -> Self {
        self.methods.insert(method.name().to_string(), method);
        self
    }

    /// Adds a method to a namespaced group exposed under the group's name.
    #[must_use]
    pub fn group_method(mut self, group: impl Into<String>, method: Method) -> Self {
        self.groups
            .entry(group.into())
            .or_default()
            .insert(method.name().to_string(), method);
        self
    }

    #[must_use]
    pub fn constant(mut self, key: impl Into<String>, value: Value) -> Self {
        self.constants.insert(key.into(), value);
        self
    }

    #[must_use]
    pub fn constants(mut self, constants: State) -> Self {
        self.constants.extend(constants);
        self
    }

    #[must_use]
    pub fn reducer<F>(mut self, name: impl Into<String>, reducer: F) -> Self
    where
        F: Fn(&State, &Action) -> State + Send + Sync + 'static,
    {
        self.reducers.insert(name.into(), Arc::new(reducer));
        self
    }

    /// The shared medium view of this context. Required when `options.sync`
    /// is set.
    #[must_use]
    pub fn channel(mut self, channel: Arc<dyn SharedChannel>) -> Self {
        self.channel = Some(channel);
        self
    }

    /// Lets the provider spawn child windows.
    #[must_use]
    pub fn window_host(mut self, host: Arc<dyn WindowHost>) -> Self {
        self.window_host = Some(host);
        self
    }

    /// The identity this context currently carries.
    #[must_use]
    pub fn identity(mut self, identity: impl Into<String>) -> Self {
        self.identity = Some(identity.into());
        self
    }

    /// Validates the configuration and builds the engine.
    ///
    /// Fails on a missing sync name, a reserved or duplicate bundle key, an
    /// overwrite conflict under strict policy, or sync options without a
    /// channel. Reading the shared medium never fails the build; unreadable
    /// snapshots fall back to defaults.
    pub async fn build(self) -> EngineResult<StateEngine> {
        let Self {
            state,
            options,
            getters,
            setters,
            methods,
            groups,
            constants,
            reducers,
            channel,
            window_host,
            identity,
        } = self;

        // Accessors follow the declared shape so every context exposes the
        // same names, whatever it loads from the medium.
        let registry = AccessorRegistry::build(&state, &options, getters, setters)?;

        let mut role = None;
        let mut assigned_identity = identity;
        let mut persistence = None;
        let mut runtime_parts = None;
        let mut windows = None;
        let mut initial = state;

        if let Some(sync) = &options.sync {
            sync.validate()?;
            let channel = channel.ok_or(EngineError::MissingChannel)?;

            let assignment = assign_role(assigned_identity.as_deref(), sync);
            if assignment.reassigned {
                info!(
                    "identity {:?} reassigned to provider {}",
                    assigned_identity, assignment.identity
                );
            }

            initial = initial_state(channel.as_ref(), sync, assignment.role, initial).await;

            if assignment.role == Role::Provider {
                windows = window_host
                    .map(|host| Arc::new(WindowRegistry::new(host, sync.subscriber_windows.iter().cloned())));
            }

            persistence = Some(Persistence {
                channel: channel.clone(),
                key: sync.storage_key().to_string(),
                private_paths: sync.private_state_paths.clone(),
                role: assignment.role,
            });
            runtime_parts = Some((channel, sync.clone(), assignment.role));
            role = Some(assignment.role);
            assigned_identity = Some(assignment.identity);
        }

        let layout = bundle::layout(&options.rename, groups.keys(), !reducers.is_empty(), windows.is_some())?;

        let pipeline = Pipeline::with_persistence(initial, persistence);
        let dispatchers = create_dispatchers(reducers, &pipeline);
        let runtime = runtime_parts
            .map(|(channel, sync, role)| SyncRuntime::new(channel, sync, role, pipeline.clone()));

        let handle = EngineHandle::new(HandleInner {
            pipeline,
            registry,
            methods,
            groups,
            constants,
            dispatchers,
            windows,
        });

        debug!(
            "engine built ({}): {} getters, {} setters, bundle keys {:?}",
            role.map_or_else(|| "local".to_string(), |r| r.to_string()),
            handle.getters().len(),
            handle.setters().len(),
            layout.keys().collect::<Vec<_>>()
        );

        Ok(StateEngine {
            handle,
            layout: Arc::new(layout),
            role,
            identity: assigned_identity,
            runtime,
        })
    }
}

/// A built engine bound to one execution context.
pub struct StateEngine {
    handle: EngineHandle,
    layout: Arc<BTreeMap<String, BundleSlot>>,
    role: Option<Role>,
    identity: Option<String>,
    runtime: Option<SyncRuntime>,
}

impl StateEngine {
    /// Shorthand for `StateEngineBuilder::new(state)`.
    pub fn builder(state: State) -> StateEngineBuilder {
        StateEngineBuilder::new(state)
    }

    pub fn handle(&self) -> &EngineHandle {
        &self.handle
    }

    /// The committed state.
    pub fn state(&self) -> Arc<State> {
        self.handle.state()
    }

    /// `None` when synchronization is off.
    pub fn role(&self) -> Option<Role> {
        self.role
    }

    /// The identity after role assignment.
    pub fn identity(&self) -> Option<&str> {
        self.identity.as_deref()
    }

    pub fn is_synchronized(&self) -> bool {
        self.runtime.is_some()
    }

    /// The bundle for the current state.
    pub fn bundle(&self) -> Bundle {
        Bundle::new(self.handle.state(), self.handle.clone(), self.layout.clone())
    }

    // ── Windows ──────────────────────────────────────────────────

    fn windows(&self) -> EngineResult<&Arc<WindowRegistry>> {
        self.handle.windows().ok_or_else(|| {
            let current = self.identity.clone().unwrap_or_default();
            EngineError::Sync(SyncError::NotProvider(current))
        })
    }

    /// Spawns a subscriber window.
    pub fn open_window(&self, url: &str, name: &str, params: &WindowParams) -> EngineResult<Arc<dyn WindowHandle>> {
        Ok(self.windows()?.open(url, name, params)?)
    }

    /// Closes a child window. Unknown names are a no-op returning `false`.
    pub fn close_window(&self, name: &str) -> EngineResult<bool> {
        Ok(self.windows()?.close(name))
    }

    /// The open child windows.
    pub fn children(&self) -> EngineResult<HashMap<String, Arc<dyn WindowHandle>>> {
        Ok(self.windows()?.get_children())
    }

    // ── Lifecycle ────────────────────────────────────────────────

    /// Starts listening for external changes. A local engine has nothing to
    /// start.
    pub async fn start(&self) -> EngineResult<()> {
        match &self.runtime {
            Some(runtime) => runtime.start().await,
            None => Ok(()),
        }
    }

    /// Whether the change listener is running.
    pub fn is_listening(&self) -> bool {
        self.runtime.as_ref().is_some_and(SyncRuntime::is_listening)
    }

    /// Applies the snapshot currently on the shared medium once.
    pub async fn reconcile(&self) -> EngineResult<Option<Arc<State>>> {
        match &self.runtime {
            Some(runtime) => runtime.reconcile().await,
            None => Ok(None),
        }
    }

    /// Tears the context down: stops listening, then clears storage and
    /// closes children as configured.
    pub async fn unload(&self) -> EngineResult<()> {
        let Some(runtime) = &self.runtime else {
            return Ok(());
        };
        runtime.unload(self.handle.windows().map(Arc::as_ref)).await?;
        info!(
            "{} unloaded from {}",
            self.identity.as_deref().unwrap_or("context"),
            runtime.options().storage_key()
        );
        Ok(())
    }
}

impl fmt::Debug for StateEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateEngine")
            .field("role", &self.role)
            .field("identity", &self.identity)
            .field("bundle", &self.layout.keys().collect::<Vec<_>>())
            .finish()
    }
}
