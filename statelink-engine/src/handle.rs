//! The explicit engine handle passed to accessors and methods.

use crate::accessors::{AccessorRegistry, GetterMap, SetValue, SetterMap};
use crate::dispatch::{Action, DispatcherMap};
use crate::error::{EngineError, EngineResult};
use crate::pipeline::{Callback, Pipeline, Update};
use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::Value;
use statelink_model::State;
use statelink_sync::WindowRegistry;
use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::watch;

/// A caller-supplied method: receives the handle and a JSON argument.
pub type MethodFn = Arc<dyn Fn(EngineHandle, Value) -> BoxFuture<'static, Value> + Send + Sync>;

/// A named method exposed to the host.
#[derive(Clone)]
pub struct Method {
    name: String,
    f: MethodFn,
}

impl Method {
    pub fn new<F, Fut>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(EngineHandle, Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Value> + Send + 'static,
    {
        Self {
            name: name.into(),
            f: Arc::new(move |handle: EngineHandle, args: Value| f(handle, args).boxed()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn call(&self, handle: &EngineHandle, args: Value) -> Value {
        (self.f)(handle.clone(), args).await
    }
}

impl fmt::Debug for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Method").field("name", &self.name).finish()
    }
}

pub type MethodMap = BTreeMap<String, Method>;

pub(crate) struct HandleInner {
    pub(crate) pipeline: Pipeline,
    pub(crate) registry: AccessorRegistry,
    pub(crate) methods: MethodMap,
    pub(crate) groups: BTreeMap<String, MethodMap>,
    pub(crate) constants: State,
    pub(crate) dispatchers: DispatcherMap,
    pub(crate) windows: Option<Arc<WindowRegistry>>,
}

/// Everything a custom setter, getter or method may touch: the live state,
/// the update pipeline, sibling accessors, methods and dispatchers.
///
/// Cloning is cheap; all clones refer to the same engine.
#[derive(Clone)]
pub struct EngineHandle {
    inner: Arc<HandleInner>,
}

impl EngineHandle {
    pub(crate) fn new(inner: HandleInner) -> Self {
        Self {
            inner: Arc::new(inner),
        }
    }

    // ── State ────────────────────────────────────────────────────

    /// The committed state.
    pub fn state(&self) -> Arc<State> {
        self.inner.pipeline.state()
    }

    /// Submits an update through the pipeline.
    pub async fn set_state(&self, update: impl Into<Update>, callback: Option<Callback>) -> Arc<State> {
        self.inner.pipeline.set_state(update.into(), callback).await
    }

    /// Receives every commit.
    pub fn subscribe(&self) -> watch::Receiver<Arc<State>> {
        self.inner.pipeline.subscribe()
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.inner.pipeline
    }

    // ── Accessors ────────────────────────────────────────────────

    pub fn registry(&self) -> &AccessorRegistry {
        &self.inner.registry
    }

    pub fn getters(&self) -> &GetterMap {
        self.inner.registry.getters()
    }

    pub fn setters(&self) -> &SetterMap {
        self.inner.registry.setters()
    }

    /// Invokes the named getter. `Ok(None)` means the path holds no value.
    pub fn get(&self, getter: &str) -> EngineResult<Option<Value>> {
        let getter = self
            .inner
            .registry
            .getter(getter)
            .ok_or_else(|| EngineError::UnknownAccessor(getter.to_string()))?;
        Ok(getter.get(self))
    }

    /// Invokes the named setter.
    pub async fn set(&self, setter: &str, value: impl Into<SetValue>) -> EngineResult<Arc<State>> {
        let setter = self
            .inner
            .registry
            .setter(setter)
            .ok_or_else(|| EngineError::UnknownAccessor(setter.to_string()))?;
        Ok(setter.call(self, value).await)
    }

    // ── Methods & constants ──────────────────────────────────────

    pub fn methods(&self) -> &MethodMap {
        &self.inner.methods
    }

    /// A namespaced method group.
    pub fn group(&self, name: &str) -> Option<&MethodMap> {
        self.inner.groups.get(name)
    }

    pub fn groups(&self) -> &BTreeMap<String, MethodMap> {
        &self.inner.groups
    }

    /// Calls a top-level method.
    pub async fn call(&self, method: &str, args: Value) -> EngineResult<Value> {
        let method = self
            .inner
            .methods
            .get(method)
            .ok_or_else(|| EngineError::UnknownMethod(method.to_string()))?;
        Ok(method.call(self, args).await)
    }

    /// Calls a method inside a namespaced group.
    pub async fn call_in(&self, group: &str, method: &str, args: Value) -> EngineResult<Value> {
        let method = self
            .group(group)
            .and_then(|methods| methods.get(method))
            .ok_or_else(|| EngineError::UnknownMethod(format!("{group}.{method}")))?;
        Ok(method.call(self, args).await)
    }

    pub fn constants(&self) -> &State {
        &self.inner.constants
    }

    // ── Dispatch ─────────────────────────────────────────────────

    pub fn dispatchers(&self) -> &DispatcherMap {
        &self.inner.dispatchers
    }

    /// Runs the named reducer against the current state.
    pub async fn dispatch(&self, reducer: &str, action: Action) -> EngineResult<Arc<State>> {
        let dispatcher = self
            .inner
            .dispatchers
            .get(reducer)
            .ok_or_else(|| EngineError::UnknownReducer(reducer.to_string()))?;
        Ok(dispatcher.dispatch_current(action).await)
    }

    // ── Windows ──────────────────────────────────────────────────

    /// The child window registry; present only in the provider context.
    pub fn windows(&self) -> Option<&Arc<WindowRegistry>> {
        self.inner.windows.as_ref()
    }
}

impl fmt::Debug for EngineHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineHandle")
            .field("getters", &self.getters().len())
            .field("setters", &self.setters().len())
            .field("methods", &self.inner.methods.len())
            .finish()
    }
}
