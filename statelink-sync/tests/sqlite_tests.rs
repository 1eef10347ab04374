use statelink_sync::{SharedChannel, SqliteMedium, SqliteMediumConfig};
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

fn open_medium(dir: &TempDir) -> SqliteMedium {
    init_tracing();
    SqliteMedium::open(
        dir.path().join("shared.db"),
        SqliteMediumConfig {
            poll_interval_ms: 10,
            ..Default::default()
        },
    )
    .unwrap()
}

#[test]
fn default_config() {
    let config = SqliteMediumConfig::default();
    assert_eq!(config.poll_interval_ms, 250);
    assert_eq!(config.busy_timeout_ms, 5_000);
}

#[tokio::test]
async fn write_then_read_across_connections() {
    let dir = TempDir::new().unwrap();
    let medium = open_medium(&dir);
    let a = medium.channel().unwrap();
    let b = medium.channel().unwrap();

    a.write("app", r#"{"x":1}"#).await.unwrap();
    assert_eq!(b.read("app").await.unwrap().as_deref(), Some(r#"{"x":1}"#));
}

#[tokio::test]
async fn reopened_medium_keeps_entries() {
    let dir = TempDir::new().unwrap();
    {
        let medium = open_medium(&dir);
        medium.channel().unwrap().write("app", "v1").await.unwrap();
    }
    let medium = open_medium(&dir);
    assert_eq!(
        medium.channel().unwrap().read("app").await.unwrap().as_deref(),
        Some("v1")
    );
}

#[tokio::test]
async fn remove_leaves_no_value() {
    let dir = TempDir::new().unwrap();
    let medium = open_medium(&dir);
    let a = medium.channel().unwrap();

    a.write("app", "v1").await.unwrap();
    a.remove("app").await.unwrap();
    assert_eq!(a.read("app").await.unwrap(), None);
    assert!(a.keys().await.unwrap().is_empty());

    a.write("app", "v2").await.unwrap();
    assert_eq!(a.read("app").await.unwrap().as_deref(), Some("v2"));
}

#[tokio::test]
async fn keys_lists_live_entries() {
    let dir = TempDir::new().unwrap();
    let medium = open_medium(&dir);
    let a = medium.channel().unwrap();
    a.write("b", "1").await.unwrap();
    a.write("a", "1").await.unwrap();
    assert_eq!(a.keys().await.unwrap(), vec!["a".to_string(), "b".to_string()]);
}

#[tokio::test]
async fn polling_delivers_external_changes() {
    let dir = TempDir::new().unwrap();
    let medium = open_medium(&dir);
    let writer = medium.channel().unwrap();
    let reader = medium.channel().unwrap();

    let mut sub = reader.subscribe("app");
    writer.write("app", "v1").await.unwrap();

    let notice = timeout(Duration::from_secs(2), sub.recv())
        .await
        .expect("notice within poll window")
        .expect("subscription open");
    assert_eq!(notice.key, "app");
    assert_eq!(notice.origin, writer.context_id());
}

#[tokio::test]
async fn polling_ignores_own_writes() {
    let dir = TempDir::new().unwrap();
    let medium = open_medium(&dir);
    let writer = medium.channel().unwrap();

    let mut sub = writer.subscribe("app");
    writer.write("app", "v1").await.unwrap();

    assert!(timeout(Duration::from_millis(100), sub.recv()).await.is_err());
}

#[tokio::test]
async fn pre_existing_entries_do_not_notify() {
    let dir = TempDir::new().unwrap();
    let medium = open_medium(&dir);
    medium.channel().unwrap().write("app", "old").await.unwrap();

    let reader = medium.channel().unwrap();
    let mut sub = reader.subscribe("app");
    assert!(timeout(Duration::from_millis(100), sub.recv()).await.is_err());
}
