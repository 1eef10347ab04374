//! Cross-process shared medium backed by a SQLite file.
//!
//! Each [`SqliteChannel`] holds its own connection, so channels in different
//! processes pointing at the same file share entries. SQLite has no change
//! events; a watcher task polls row revisions and turns revisions written by
//! other contexts into [`ChangeNotice`]s.

use crate::channel::{ChangeNotice, ChangeSubscription, ContextId, SharedChannel};
use crate::error::{SyncError, SyncResult};
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

const NOTICE_CAPACITY: usize = 64;

/// Configuration for a SQLite medium.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SqliteMediumConfig {
    /// How often each channel polls for external changes (ms).
    pub poll_interval_ms: u64,
    /// How long a connection waits on a locked database (ms).
    pub busy_timeout_ms: u64,
}

impl Default for SqliteMediumConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 250,
            busy_timeout_ms: 5_000,
        }
    }
}

/// A SQLite file used as the shared medium.
#[derive(Debug, Clone)]
pub struct SqliteMedium {
    path: PathBuf,
    config: SqliteMediumConfig,
}

impl SqliteMedium {
    /// Opens (or creates) a medium at the given path.
    pub fn open(path: impl AsRef<Path>, config: SqliteMediumConfig) -> SyncResult<Self> {
        let medium = Self {
            path: path.as_ref().to_path_buf(),
            config,
        };
        let conn = medium.connect()?;
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS shared_state (
                key TEXT PRIMARY KEY,
                value TEXT,
                writer TEXT NOT NULL,
                revision INTEGER NOT NULL
            );
            ",
        )
        .map_err(|e| SyncError::Storage(format!("failed to init shared medium schema: {e}")))?;
        Ok(medium)
    }

    /// The database file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Attaches a new execution context to this medium.
    pub fn channel(&self) -> SyncResult<SqliteChannel> {
        let (notices, _) = broadcast::channel(NOTICE_CAPACITY);
        Ok(SqliteChannel {
            id: ContextId::new(),
            conn: Arc::new(Mutex::new(self.connect()?)),
            poll_interval: Duration::from_millis(self.config.poll_interval_ms.max(1)),
            notices,
            watcher: Mutex::new(None),
        })
    }

    fn connect(&self) -> SyncResult<Connection> {
        let conn = Connection::open(&self.path)
            .map_err(|e| SyncError::Storage(format!("failed to open shared medium: {e}")))?;
        conn.busy_timeout(Duration::from_millis(self.config.busy_timeout_ms))
            .map_err(|e| SyncError::Storage(format!("failed to set busy timeout: {e}")))?;
        Ok(conn)
    }
}

/// One context's view of a [`SqliteMedium`].
pub struct SqliteChannel {
    id: ContextId,
    conn: Arc<Mutex<Connection>>,
    poll_interval: Duration,
    notices: broadcast::Sender<ChangeNotice>,
    watcher: Mutex<Option<JoinHandle<()>>>,
}

impl SqliteChannel {
    /// All keys currently holding a value, sorted.
    pub async fn keys(&self) -> SyncResult<Vec<String>> {
        self.blocking(|conn| {
            let mut stmt = conn
                .prepare("SELECT key FROM shared_state WHERE value IS NOT NULL ORDER BY key")
                .map_err(|e| SyncError::Storage(format!("failed to prepare key query: {e}")))?;
            let rows = stmt
                .query_map([], |row| row.get::<_, String>(0))
                .map_err(|e| SyncError::Storage(format!("failed to list keys: {e}")))?;
            rows.collect::<Result<Vec<_>, _>>()
                .map_err(|e| SyncError::Storage(format!("failed to read key row: {e}")))
        })
        .await
    }

    async fn blocking<T, F>(&self, op: F) -> SyncResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> SyncResult<T> + Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let guard = conn.lock().unwrap_or_else(PoisonError::into_inner);
            op(&guard)
        })
        .await
        .map_err(|e| SyncError::Storage(format!("shared medium task failed: {e}")))?
    }

    fn start_watcher(&self) {
        let mut slot = self.watcher.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.is_some() {
            return;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("no tokio runtime; external changes on the shared medium will not be observed");
            return;
        };

        let baseline = {
            let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
            match load_revisions(&conn) {
                Ok(revisions) => revisions,
                Err(e) => {
                    warn!("failed to read shared medium revisions: {e}");
                    HashMap::new()
                }
            }
        };

        let conn = self.conn.clone();
        let notices = self.notices.clone();
        let own = self.id;
        let poll_interval = self.poll_interval;

        *slot = Some(runtime.spawn(async move {
            let mut seen = baseline;
            let mut ticker = tokio::time::interval(poll_interval);
            loop {
                ticker.tick().await;
                let conn = conn.clone();
                let polled = tokio::task::spawn_blocking(move || {
                    let guard = conn.lock().unwrap_or_else(PoisonError::into_inner);
                    load_revisions(&guard)
                })
                .await;

                let current = match polled {
                    Ok(Ok(current)) => current,
                    Ok(Err(e)) => {
                        warn!("shared medium poll failed: {e}");
                        continue;
                    }
                    Err(_) => break,
                };

                for (key, (revision, writer)) in &current {
                    let changed = seen.get(key).is_none_or(|(prev, _)| prev != revision);
                    if changed && *writer != own.to_string() {
                        debug!("external change on {} (revision {})", key, revision);
                        let origin = ContextId::parse(writer).unwrap_or_default();
                        let _ = notices.send(ChangeNotice {
                            key: key.clone(),
                            origin,
                        });
                    }
                }
                seen = current;
            }
        }));
    }
}

impl Drop for SqliteChannel {
    fn drop(&mut self) {
        if let Some(handle) = self
            .watcher
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            handle.abort();
        }
    }
}

fn load_revisions(conn: &Connection) -> SyncResult<HashMap<String, (i64, String)>> {
    let mut stmt = conn
        .prepare("SELECT key, revision, writer FROM shared_state")
        .map_err(|e| SyncError::Storage(format!("failed to prepare revision query: {e}")))?;
    let rows = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                (row.get::<_, i64>(1)?, row.get::<_, String>(2)?),
            ))
        })
        .map_err(|e| SyncError::Storage(format!("failed to query revisions: {e}")))?;
    rows.collect::<Result<HashMap<_, _>, _>>()
        .map_err(|e| SyncError::Storage(format!("failed to read revision row: {e}")))
}

#[async_trait]
impl SharedChannel for SqliteChannel {
    fn context_id(&self) -> ContextId {
        self.id
    }

    async fn read(&self, key: &str) -> SyncResult<Option<String>> {
        let key = key.to_string();
        self.blocking(move |conn| {
            conn.query_row(
                "SELECT value FROM shared_state WHERE key = ?1",
                params![key],
                |row| row.get::<_, Option<String>>(0),
            )
            .optional()
            .map(Option::flatten)
            .map_err(|e| SyncError::Storage(format!("failed to read {key}: {e}")))
        })
        .await
    }

    async fn write(&self, key: &str, value: &str) -> SyncResult<()> {
        let key = key.to_string();
        let value = value.to_string();
        let writer = self.id.to_string();
        self.blocking(move |conn| {
            // Unchanged values keep their revision, so no notice is produced.
            conn.execute(
                "INSERT INTO shared_state (key, value, writer, revision) VALUES (?1, ?2, ?3, 1)
                 ON CONFLICT(key) DO UPDATE SET
                    value = excluded.value,
                    writer = excluded.writer,
                    revision = shared_state.revision + 1
                 WHERE shared_state.value IS NOT excluded.value",
                params![key, value, writer],
            )
            .map_err(|e| SyncError::Storage(format!("failed to write {key}: {e}")))?;
            Ok(())
        })
        .await
    }

    async fn remove(&self, key: &str) -> SyncResult<()> {
        let key = key.to_string();
        let writer = self.id.to_string();
        self.blocking(move |conn| {
            // Tombstone instead of DELETE so pollers still see a new revision.
            conn.execute(
                "UPDATE shared_state SET value = NULL, writer = ?2, revision = revision + 1
                 WHERE key = ?1 AND value IS NOT NULL",
                params![key, writer],
            )
            .map_err(|e| SyncError::Storage(format!("failed to remove {key}: {e}")))?;
            Ok(())
        })
        .await
    }

    fn subscribe(&self, key: &str) -> ChangeSubscription {
        let rx = self.notices.subscribe();
        self.start_watcher();
        ChangeSubscription::new(key, self.id, rx)
    }
}
