//! Reducer dispatch.
//!
//! A dispatcher runs a pure reducer and commits its result as a full-state
//! replacement. There is no merge step: whatever the reducer returns becomes
//! the state.

use crate::pipeline::Pipeline;
use serde_json::Value;
use statelink_model::State;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// The action passed to a reducer.
pub type Action = Value;

/// A pure reduction: `(state, action) → new state`.
pub type Reducer = Arc<dyn Fn(&State, &Action) -> State + Send + Sync>;

/// A reducer bound to the pipeline it commits through.
#[derive(Clone)]
pub struct Dispatcher {
    name: String,
    reducer: Reducer,
    pipeline: Pipeline,
}

impl Dispatcher {
    pub(crate) fn new(name: String, reducer: Reducer, pipeline: Pipeline) -> Self {
        Self {
            name,
            reducer,
            pipeline,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Reduces `state` with `action` and commits the result.
    pub async fn dispatch(&self, state: &State, action: Action) -> Arc<State> {
        debug!("dispatching {} on {}", action, self.name);
        let next = (self.reducer)(state, &action);
        self.pipeline.replace_state(next).await
    }

    /// Reduces the state current at commit time.
    pub async fn dispatch_current(&self, action: Action) -> Arc<State> {
        debug!("dispatching {} on {}", action, self.name);
        let reducer = self.reducer.clone();
        self.pipeline
            .replace_with(move |state| reducer(state, &action))
            .await
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher").field("name", &self.name).finish()
    }
}

pub type DispatcherMap = BTreeMap<String, Dispatcher>;

/// Wraps every reducer in a dispatcher committing through `pipeline`.
pub fn create_dispatchers(reducers: BTreeMap<String, Reducer>, pipeline: &Pipeline) -> DispatcherMap {
    reducers
        .into_iter()
        .map(|(name, reducer)| {
            let dispatcher = Dispatcher::new(name.clone(), reducer, pipeline.clone());
            (name, dispatcher)
        })
        .collect()
}
