//! Property-based tests for the engine.
//!
//! - A generated setter called with the value already present leaves the
//!   state deep-equal to before
//! - A generated setter followed by its getter returns what was set
//! - The persisted snapshot never carries a private key

use proptest::prelude::*;
use serde_json::{Map, Value};
use statelink_engine::{AccessorSource, EngineOptions, StateEngine};
use statelink_model::{accessor_name_for_path, decode_snapshot, discover_paths, get_at, AccessorVerb, State, StatePath};
use statelink_sync::{MemoryMedium, SyncOptions};
use std::sync::Arc;

// =============================================================================
// HELPER STRATEGIES
// =============================================================================

fn key_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z][a-z0-9]{0,5}").unwrap()
}

fn leaf_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        any::<bool>().prop_map(Value::Bool),
        any::<i32>().prop_map(Value::from),
        prop::string::string_regex("[a-z]{0,6}").unwrap().prop_map(Value::String),
    ]
}

fn value_strategy() -> impl Strategy<Value = Value> {
    leaf_strategy().prop_recursive(2, 12, 3, |inner| {
        prop::collection::btree_map(key_strategy(), inner, 0..3)
            .prop_map(|m| Value::Object(m.into_iter().collect::<Map<String, Value>>()))
    })
}

fn state_strategy() -> impl Strategy<Value = State> {
    prop::collection::btree_map(key_strategy(), value_strategy(), 1..5)
        .prop_map(|m| m.into_iter().collect())
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

fn nested() -> EngineOptions {
    EngineOptions {
        nested_setters: true,
        ..Default::default()
    }
}

fn targets(state: &State) -> Vec<StatePath> {
    let mut paths: Vec<StatePath> = state.keys().map(|k| StatePath::key(k.as_str())).collect();
    paths.extend(discover_paths(state));
    paths
}

// =============================================================================
// SETTERS
// =============================================================================

proptest! {
    #[test]
    fn setting_current_value_is_idempotent(s in state_strategy()) {
        let rt = runtime();
        let after = rt.block_on(async {
            let engine = StateEngine::builder(s.clone()).options(nested()).build().await.unwrap();
            let handle = engine.handle();
            for path in targets(&s) {
                let name = accessor_name_for_path(&path, AccessorVerb::Set).unwrap();
                // Colliding names may resolve to a different path.
                let Some(setter) = handle.setters().get(&name) else { continue };
                let current = get_at(&handle.state(), &path).cloned().unwrap_or(Value::Null);
                if setter.source() == &AccessorSource::Generated(path.clone()) {
                    setter.call(handle, current).await;
                }
            }
            engine.state()
        });
        prop_assert_eq!(&*after, &s);
    }

    #[test]
    fn getter_reads_back_what_setter_wrote(s in state_strategy(), v in leaf_strategy()) {
        let rt = runtime();
        rt.block_on(async {
            let engine = StateEngine::builder(s.clone()).options(nested()).build().await.unwrap();
            let handle = engine.handle();
            let key = s.keys().next().cloned().unwrap();
            let setter = accessor_name_for_path(&StatePath::key(key.as_str()), AccessorVerb::Set).unwrap();
            let getter = accessor_name_for_path(&StatePath::key(key.as_str()), AccessorVerb::Get).unwrap();

            handle.set(&setter, v.clone()).await.unwrap();

            assert_eq!(handle.get(&getter).unwrap(), Some(v));
        });
    }
}

// =============================================================================
// REDACTION
// =============================================================================

proptest! {
    #[test]
    fn persisted_snapshot_never_has_private_keys(
        s in state_strategy(),
        private_count in 0usize..3,
        update in leaf_strategy(),
    ) {
        let private: Vec<String> = s.keys().take(private_count).cloned().collect();
        let rt = runtime();
        let snapshot = rt.block_on(async {
            let medium = MemoryMedium::new();
            let options = EngineOptions {
                sync: Some(SyncOptions::new("prop").with_private_paths(private.iter().map(String::as_str))),
                ..Default::default()
            };
            let engine = StateEngine::builder(s.clone())
                .options(options)
                .channel(Arc::new(medium.channel()))
                .build()
                .await
                .unwrap();
            engine.start().await.unwrap();
            let mut partial = State::new();
            partial.insert("extra".into(), update);
            engine.handle().set_state(partial, None).await;
            decode_snapshot(&medium.get("prop").unwrap()).unwrap()
        });

        for key in &private {
            prop_assert!(!snapshot.contains_key(key));
        }
        for (key, value) in &s {
            if !private.contains(key) && key != "extra" {
                prop_assert_eq!(snapshot.get(key), Some(value));
            }
        }
        prop_assert!(snapshot.contains_key("extra") || private.iter().any(|k| k == "extra"));
    }
}
