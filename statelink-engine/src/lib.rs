//! State engine for statelink.
//!
//! Wraps a state object with generated accessors and a single update
//! pipeline, and optionally keeps it synchronized with other execution
//! contexts through a shared medium.
//!
//! ## Components
//!
//! - **Accessors**: `get*`/`set*` functions derived from the state's shape,
//!   merged with caller-supplied ones under an overwrite policy
//! - **Pipeline**: the only mutation path; serializes updates, notifies the
//!   host, and persists the redacted snapshot
//! - **Dispatch**: reducers committed as full-state replacements
//! - **Bundle**: the named components handed to the host
//! - **Engine**: builder, role assignment, change listener and teardown
//!
//! Custom setters, getters and methods receive an explicit [`EngineHandle`]
//! instead of closing over the engine.
//!
//! # Example
//!
//! ```
//! use serde_json::json;
//! use statelink_engine::StateEngine;
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let state = json!({"count": 1}).as_object().cloned().unwrap();
//! let engine = StateEngine::builder(state).build().await.unwrap();
//!
//! engine.handle().set("setCount", json!(5)).await.unwrap();
//! assert_eq!(engine.handle().get("getCount").unwrap(), Some(json!(5)));
//! # });
//! ```

mod accessors;
mod bundle;
mod config;
mod dispatch;
mod engine;
mod error;
mod handle;
mod pipeline;
mod sync;

pub use accessors::{
    apply_overrides, create_state_getters, create_state_setters, AccessorRegistry, AccessorSource, Getter,
    GetterFn, GetterMap, NameCollision, SetValue, Setter, SetterFn, SetterMap,
};
pub use bundle::{is_reserved_name, Bundle, BundleEntry, BundleSlot, RESERVED_NAMES};
pub use config::{EngineOptions, OverwritePolicy};
pub use dispatch::{create_dispatchers, Action, Dispatcher, DispatcherMap, Reducer};
pub use engine::{StateEngine, StateEngineBuilder};
pub use error::{EngineError, EngineResult};
pub use handle::{EngineHandle, Method, MethodFn, MethodMap};
pub use pipeline::{Callback, Pipeline, Update, Updater};
