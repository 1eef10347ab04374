//! Snapshot operations behind the `statelink` binary.

use anyhow::{bail, Context, Result};
use statelink_model::{
    clean_state, decode_snapshot, decode_snapshot_lenient, encode_snapshot, merge_shallow, State, StatePath,
};
use statelink_sync::SharedChannel;
use tracing::{debug, warn};

/// Reads and decodes the snapshot stored under `key`.
///
/// Malformed snapshots are re-parsed leniently, the same way a running
/// engine recovers them.
pub async fn read_snapshot(channel: &dyn SharedChannel, key: &str) -> Result<Option<State>> {
    let Some(text) = channel.read(key).await? else {
        return Ok(None);
    };
    match decode_snapshot(&text) {
        Ok(state) => Ok(Some(state)),
        Err(e) => {
            warn!("snapshot under {} is malformed ({e}); decoding leniently", key);
            decode_snapshot_lenient(&text)
                .map(Some)
                .with_context(|| format!("snapshot under {key} is unreadable"))
        }
    }
}

/// Writes `json` as the snapshot under `key`, or shallow-merges it into the
/// stored snapshot with `merge`. Returns what was written.
pub async fn write_snapshot(channel: &dyn SharedChannel, key: &str, json: &str, merge: bool) -> Result<State> {
    let incoming: State = serde_json::from_str(json).context("value must be a JSON object")?;

    let next = if merge {
        let current = read_snapshot(channel, key).await?.unwrap_or_default();
        merge_shallow(&current, incoming)
    } else {
        incoming
    };

    let text = encode_snapshot(&next)?;
    channel.write(key, &text).await?;
    debug!("wrote {} bytes to {}", text.len(), key);
    Ok(next)
}

/// Removes `key`. Returns whether it held a snapshot.
pub async fn clear_snapshot(channel: &dyn SharedChannel, key: &str) -> Result<bool> {
    let existed = channel.read(key).await?.is_some();
    if existed {
        channel.remove(key).await?;
    }
    Ok(existed)
}

/// Parses `a.b.c` into a path.
pub fn parse_path(dotted: &str) -> Result<StatePath> {
    if dotted.split('.').any(str::is_empty) {
        bail!("invalid path `{dotted}`");
    }
    Ok(StatePath::new(dotted.split('.'))?)
}

/// Renders a snapshot for the terminal, dropping `hide` paths first.
pub fn render(state: &State, hide: &[StatePath], pretty: bool) -> Result<String> {
    let visible = if hide.is_empty() {
        state.clone()
    } else {
        clean_state(state, hide)
    };
    let text = if pretty {
        serde_json::to_string_pretty(&visible)?
    } else {
        serde_json::to_string(&visible)?
    };
    Ok(text)
}
