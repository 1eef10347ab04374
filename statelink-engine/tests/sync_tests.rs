use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use statelink_engine::{EngineError, EngineOptions, StateEngine};
use statelink_model::{decode_snapshot, State, StatePath};
use statelink_sync::window::mock::MockWindowHost;
use statelink_sync::{
    ConfigError, MemoryMedium, Role, SharedChannel, SqliteMedium, SqliteMediumConfig, SyncError, SyncOptions,
    WindowParams,
};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::time::timeout;
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn state(value: Value) -> State {
    value.as_object().cloned().unwrap()
}

fn sync_options() -> SyncOptions {
    SyncOptions::new("app")
        .with_subscribers(["inspector", "console"])
        .with_private_paths(["secret"])
}

fn with_sync(sync: SyncOptions) -> EngineOptions {
    EngineOptions {
        sync: Some(sync),
        ..Default::default()
    }
}

fn defaults() -> State {
    state(json!({"secret": 1, "public": 2}))
}

async fn provider(medium: &MemoryMedium, sync: SyncOptions) -> StateEngine {
    init_tracing();
    StateEngine::builder(defaults())
        .options(with_sync(sync))
        .channel(Arc::new(medium.channel()))
        .window_host(Arc::new(MockWindowHost::new()))
        .identity("app")
        .build()
        .await
        .unwrap()
}

async fn subscriber(medium: &MemoryMedium, sync: SyncOptions) -> StateEngine {
    init_tracing();
    StateEngine::builder(defaults())
        .options(with_sync(sync))
        .channel(Arc::new(medium.channel()))
        .identity("inspector")
        .build()
        .await
        .unwrap()
}

fn persisted(medium: &MemoryMedium) -> Option<State> {
    medium.get("app").map(|text| decode_snapshot(&text).unwrap())
}

async fn wait_for(engine: &StateEngine, check: impl Fn(&State) -> bool) {
    timeout(Duration::from_secs(2), async {
        loop {
            if check(&engine.state()) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("state did not converge");
}

// ── Configuration ────────────────────────────────────────────────

#[tokio::test]
async fn missing_sync_name_fails_build() {
    let medium = MemoryMedium::new();
    let result = StateEngine::builder(State::new())
        .options(with_sync(SyncOptions::default()))
        .channel(Arc::new(medium.channel()))
        .build()
        .await;

    assert!(matches!(result, Err(EngineError::Config(ConfigError::MissingSyncName))));
}

#[tokio::test]
async fn sync_without_channel_fails_build() {
    let result = StateEngine::builder(State::new())
        .options(with_sync(sync_options()))
        .build()
        .await;

    assert!(matches!(result, Err(EngineError::MissingChannel)));
}

#[tokio::test]
async fn local_engine_has_no_role() {
    let engine = StateEngine::builder(defaults()).build().await.unwrap();

    assert_eq!(engine.role(), None);
    assert!(!engine.is_synchronized());
    engine.start().await.unwrap();
    assert_eq!(engine.reconcile().await.unwrap(), None);
    engine.unload().await.unwrap();
}

// ── Role assignment ──────────────────────────────────────────────

#[tokio::test]
async fn stale_identity_becomes_provider() {
    let medium = MemoryMedium::new();
    let engine = StateEngine::builder(defaults())
        .options(with_sync(sync_options()))
        .channel(Arc::new(medium.channel()))
        .identity("old-page")
        .build()
        .await
        .unwrap();

    assert_eq!(engine.role(), Some(Role::Provider));
    assert_eq!(engine.identity(), Some("app"));
}

#[tokio::test]
async fn subscriber_identity_is_kept() {
    let medium = MemoryMedium::new();
    let engine = subscriber(&medium, sync_options()).await;

    assert_eq!(engine.role(), Some(Role::Subscriber));
    assert_eq!(engine.identity(), Some("inspector"));
}

// ── Persistence and redaction ────────────────────────────────────

#[tokio::test]
async fn provider_persists_redacted_snapshot() {
    let medium = MemoryMedium::new();
    let engine = provider(&medium, sync_options()).await;

    engine.handle().set("setPublic", json!(3)).await.unwrap();

    assert_eq!(persisted(&medium), Some(state(json!({"public": 3}))));
    // The live state keeps the private value.
    assert_eq!(engine.state()["secret"], json!(1));
}

#[tokio::test]
async fn provider_start_publishes_initial_snapshot() {
    let medium = MemoryMedium::new();
    let engine = provider(&medium, sync_options()).await;
    assert_eq!(persisted(&medium), None);

    engine.start().await.unwrap();

    assert!(engine.is_listening());
    assert_eq!(persisted(&medium), Some(state(json!({"public": 2}))));
}

#[tokio::test]
async fn nested_private_path_is_redacted() {
    let medium = MemoryMedium::new();
    let sync = SyncOptions::new("app").with_private_paths([StatePath::from(["user", "token"])]);
    let engine = StateEngine::builder(state(json!({"user": {"name": "ada", "token": "t0k"}})))
        .options(with_sync(sync))
        .channel(Arc::new(medium.channel()))
        .build()
        .await
        .unwrap();

    engine.start().await.unwrap();

    assert_eq!(persisted(&medium), Some(state(json!({"user": {"name": "ada"}}))));
    assert_eq!(engine.state()["user"]["token"], json!("t0k"));
}

// ── Initialization ───────────────────────────────────────────────

#[tokio::test]
async fn subscriber_replaces_defaults_with_persisted_snapshot() {
    let medium = MemoryMedium::new();
    medium.channel().write("app", r#"{"public":7}"#).await.unwrap();
    let sync = SyncOptions {
        initialize_from_local_storage: false,
        ..sync_options()
    };

    let engine = subscriber(&medium, sync).await;

    assert_eq!(*engine.state(), state(json!({"public": 7})));
}

#[tokio::test]
async fn subscriber_without_snapshot_starts_redacted() {
    let medium = MemoryMedium::new();

    let engine = subscriber(&medium, sync_options()).await;

    assert_eq!(*engine.state(), state(json!({"public": 2})));
}

#[tokio::test]
async fn provider_ignores_snapshot_by_default() {
    let medium = MemoryMedium::new();
    medium.channel().write("app", r#"{"public":9}"#).await.unwrap();

    let engine = provider(&medium, sync_options()).await;

    assert_eq!(*engine.state(), defaults());
}

#[tokio::test]
async fn provider_merges_snapshot_when_asked() {
    let medium = MemoryMedium::new();
    medium.channel().write("app", r#"{"public":9}"#).await.unwrap();
    let sync = SyncOptions {
        initialize_from_local_storage: true,
        ..sync_options()
    };

    let engine = provider(&medium, sync).await;

    assert_eq!(*engine.state(), state(json!({"secret": 1, "public": 9})));
}

#[tokio::test]
async fn subscriber_keeps_generated_accessors_of_declared_shape() {
    let medium = MemoryMedium::new();
    medium.channel().write("app", r#"{"public":7}"#).await.unwrap();

    let engine = subscriber(&medium, sync_options()).await;

    assert!(engine.handle().getters().contains_key("getSecret"));
    assert_eq!(engine.handle().get("getSecret").unwrap(), None);
}

// ── Propagation ──────────────────────────────────────────────────

#[tokio::test]
async fn provider_changes_reach_subscriber() {
    let medium = MemoryMedium::new();
    let provider = provider(&medium, sync_options()).await;
    provider.start().await.unwrap();
    let subscriber = subscriber(&medium, sync_options()).await;
    subscriber.start().await.unwrap();

    provider.handle().set("setPublic", json!(42)).await.unwrap();

    wait_for(&subscriber, |s| s.get("public") == Some(&json!(42))).await;
    assert_eq!(subscriber.state().get("secret"), None);
}

#[tokio::test]
async fn subscriber_changes_reach_provider_without_losing_private_values() {
    let medium = MemoryMedium::new();
    let provider = provider(&medium, sync_options()).await;
    provider.start().await.unwrap();
    let subscriber = subscriber(&medium, sync_options()).await;
    subscriber.start().await.unwrap();

    subscriber.handle().set("setPublic", json!(5)).await.unwrap();

    wait_for(&provider, |s| s.get("public") == Some(&json!(5))).await;
    assert_eq!(provider.state()["secret"], json!(1));
    assert_eq!(persisted(&medium), Some(state(json!({"public": 5}))));
}

#[tokio::test]
async fn dispatch_persists_redacted_snapshot() {
    let medium = MemoryMedium::new();
    let provider = StateEngine::builder(defaults())
        .options(with_sync(sync_options()))
        .channel(Arc::new(medium.channel()))
        .reducer("bump", |s: &State, action: &Value| {
            let mut next = s.clone();
            next.insert("public".into(), action["to"].clone());
            next
        })
        .identity("app")
        .build()
        .await
        .unwrap();
    provider.start().await.unwrap();
    let subscriber = subscriber(&medium, sync_options()).await;
    subscriber.start().await.unwrap();

    let next = provider.handle().dispatch("bump", json!({"to": 9})).await.unwrap();

    assert_eq!(*next, state(json!({"secret": 1, "public": 9})));
    assert_eq!(persisted(&medium), Some(state(json!({"public": 9}))));
    wait_for(&subscriber, |s| s.get("public") == Some(&json!(9))).await;
    assert_eq!(*subscriber.state(), state(json!({"public": 9})));
}

#[tokio::test]
async fn subscriber_merge_restores_key_removed_by_dispatch() {
    init_tracing();
    let medium = MemoryMedium::new();
    let declared = state(json!({"secret": 1, "public": 2, "extra": 3}));
    let provider = StateEngine::builder(declared.clone())
        .options(with_sync(sync_options()))
        .channel(Arc::new(medium.channel()))
        .reducer("reset", |s: &State, _: &Value| {
            let mut next = State::new();
            next.insert("secret".into(), s["secret"].clone());
            next.insert("public".into(), json!(5));
            next
        })
        .identity("app")
        .build()
        .await
        .unwrap();
    provider.start().await.unwrap();
    let subscriber = StateEngine::builder(declared)
        .options(with_sync(sync_options()))
        .channel(Arc::new(medium.channel()))
        .identity("inspector")
        .build()
        .await
        .unwrap();
    subscriber.start().await.unwrap();

    let next = provider.handle().dispatch("reset", Value::Null).await.unwrap();
    assert_eq!(next.get("extra"), None);

    // The subscriber still holds `extra`; its merge writes it back and the
    // provider merges it in again.
    wait_for(&provider, |s| s.get("extra") == Some(&json!(3))).await;
    wait_for(&subscriber, |s| s.get("public") == Some(&json!(5))).await;
    assert_eq!(*provider.state(), state(json!({"secret": 1, "public": 5, "extra": 3})));
    assert_eq!(persisted(&medium), Some(state(json!({"public": 5, "extra": 3}))));
}

#[tokio::test]
async fn reconcile_restores_nested_private_values() {
    let medium = MemoryMedium::new();
    let sync = SyncOptions::new("app").with_private_paths([StatePath::from(["user", "token"])]);
    let engine = StateEngine::builder(state(json!({"user": {"name": "ada", "token": "t0k"}})))
        .options(with_sync(sync))
        .channel(Arc::new(medium.channel()))
        .build()
        .await
        .unwrap();

    medium
        .channel()
        .write("app", r#"{"user":{"name":"grace"}}"#)
        .await
        .unwrap();
    let next = engine.reconcile().await.unwrap().unwrap();

    assert_eq!(*next, state(json!({"user": {"name": "grace", "token": "t0k"}})));
}

#[tokio::test]
async fn reconcile_without_change_commits_nothing() {
    let medium = MemoryMedium::new();
    let engine = provider(&medium, sync_options()).await;
    engine.start().await.unwrap();

    assert_eq!(engine.reconcile().await.unwrap(), None);
}

#[tokio::test]
async fn cleared_key_keeps_local_state() {
    let medium = MemoryMedium::new();
    let engine = subscriber(&medium, sync_options()).await;
    medium.channel().remove("app").await.unwrap();

    assert_eq!(engine.reconcile().await.unwrap(), None);
    assert_eq!(*engine.state(), state(json!({"public": 2})));
}

#[tokio::test]
async fn malformed_snapshot_falls_back_to_full_replacement() {
    let medium = MemoryMedium::new();
    let engine = StateEngine::builder(state(json!({"secret": 1, "public": 2, "extra": 3})))
        .options(with_sync(sync_options()))
        .channel(Arc::new(medium.channel()))
        .build()
        .await
        .unwrap();

    medium
        .channel()
        .write("app", "\u{feff}{\"public\":5} trailing")
        .await
        .unwrap();
    engine.reconcile().await.unwrap();

    // `extra` is dropped by the replacement; the private value survives.
    assert_eq!(*engine.state(), state(json!({"secret": 1, "public": 5})));
}

#[tokio::test]
async fn unreadable_snapshot_is_ignored() {
    let medium = MemoryMedium::new();
    let engine = provider(&medium, sync_options()).await;

    medium.channel().write("app", "not json at all").await.unwrap();

    assert_eq!(engine.reconcile().await.unwrap(), None);
    assert_eq!(*engine.state(), defaults());
}

// ── Windows and teardown ─────────────────────────────────────────

#[tokio::test]
async fn provider_opens_and_closes_children() {
    let medium = MemoryMedium::new();
    let engine = provider(&medium, sync_options()).await;

    let window = engine
        .open_window("/inspect", "inspector", &WindowParams::new())
        .unwrap();
    assert_eq!(window.name(), "inspector");
    assert_eq!(engine.children().unwrap().len(), 1);

    assert!(engine.close_window("inspector").unwrap());
    assert!(window.is_closed());
    assert!(!engine.close_window("inspector").unwrap());
    assert!(engine.children().unwrap().is_empty());
}

#[tokio::test]
async fn provider_rejects_unknown_window_names() {
    let medium = MemoryMedium::new();
    let engine = provider(&medium, sync_options()).await;

    let result = engine.open_window("/x", "stranger", &WindowParams::new());

    assert!(matches!(result, Err(EngineError::Sync(SyncError::UnknownWindow(name))) if name == "stranger"));
}

#[tokio::test]
async fn subscriber_cannot_manage_windows() {
    let medium = MemoryMedium::new();
    let engine = subscriber(&medium, sync_options()).await;

    assert!(matches!(
        engine.open_window("/x", "console", &WindowParams::new()),
        Err(EngineError::Sync(SyncError::NotProvider(_)))
    ));
    assert!(engine.children().is_err());
}

#[tokio::test]
async fn provider_unload_clears_storage_and_closes_children() {
    let medium = MemoryMedium::new();
    let engine = provider(&medium, sync_options()).await;
    engine.start().await.unwrap();
    let a = engine.open_window("/a", "inspector", &WindowParams::new()).unwrap();
    let b = engine.open_window("/b", "console", &WindowParams::new()).unwrap();

    engine.unload().await.unwrap();

    assert!(!medium.contains_key("app"));
    assert!(a.is_closed());
    assert!(b.is_closed());
    assert!(!engine.is_listening());
}

#[tokio::test]
async fn unload_respects_flags() {
    let medium = MemoryMedium::new();
    let sync = SyncOptions {
        clear_storage_on_unload: false,
        remove_children_on_unload: false,
        ..sync_options()
    };
    let engine = provider(&medium, sync).await;
    engine.start().await.unwrap();
    let child = engine.open_window("/a", "inspector", &WindowParams::new()).unwrap();

    engine.unload().await.unwrap();

    assert!(medium.contains_key("app"));
    assert!(!child.is_closed());
}

#[tokio::test]
async fn subscriber_unload_leaves_storage() {
    let medium = MemoryMedium::new();
    medium.channel().write("app", r#"{"public":1}"#).await.unwrap();
    let engine = subscriber(&medium, sync_options()).await;
    engine.start().await.unwrap();

    engine.unload().await.unwrap();

    assert!(medium.contains_key("app"));
}

// ── SQLite medium ────────────────────────────────────────────────

#[tokio::test]
async fn engines_sync_through_sqlite_medium() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let config = SqliteMediumConfig {
        poll_interval_ms: 10,
        ..Default::default()
    };
    let medium = SqliteMedium::open(dir.path().join("shared.db"), config).unwrap();

    let provider = StateEngine::builder(defaults())
        .options(with_sync(sync_options()))
        .channel(Arc::new(medium.channel().unwrap()))
        .build()
        .await
        .unwrap();
    provider.start().await.unwrap();

    let subscriber = StateEngine::builder(defaults())
        .options(with_sync(sync_options()))
        .channel(Arc::new(medium.channel().unwrap()))
        .identity("console")
        .build()
        .await
        .unwrap();
    subscriber.start().await.unwrap();
    assert_eq!(*subscriber.state(), state(json!({"public": 2})));

    provider.handle().set("setPublic", json!(11)).await.unwrap();
    wait_for(&subscriber, |s| s.get("public") == Some(&json!(11))).await;

    subscriber.handle().set("setPublic", json!(12)).await.unwrap();
    wait_for(&provider, |s| s.get("public") == Some(&json!(12))).await;
    assert_eq!(provider.state()["secret"], json!(1));

    provider.unload().await.unwrap();
    let reader = medium.channel().unwrap();
    assert_eq!(reader.read("app").await.unwrap(), None);
}
