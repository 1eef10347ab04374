//! Redaction of private state before it leaves the owning context.

use crate::path::StatePath;
use crate::State;
use serde_json::{Map, Value};
use tracing::warn;

/// A private path that could not be walked because an intermediate key was
/// missing or was not a mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedactionWarning {
    /// The private path being removed.
    pub path: StatePath,
    /// The segment at which the walk stopped.
    pub missing_segment: String,
}

/// Returns a copy of `state` with every private path removed.
///
/// The input is never modified. See [`clean_state_report`] for the list of
/// paths that could not be walked.
#[must_use]
pub fn clean_state(state: &State, private_paths: &[StatePath]) -> State {
    clean_state_report(state, private_paths).0
}

/// Like [`clean_state`], also returning a warning per private path whose
/// intermediate keys do not exist. Remaining paths are still processed.
pub fn clean_state_report(
    state: &State,
    private_paths: &[StatePath],
) -> (State, Vec<RedactionWarning>) {
    let mut cleaned = state.clone();
    let mut warnings = Vec::new();

    for path in private_paths {
        if let Err(missing_segment) = remove_at(&mut cleaned, path.segments()) {
            warn!(
                "private path {} not found in state (missing `{}`), skipping",
                path, missing_segment
            );
            warnings.push(RedactionWarning {
                path: path.clone(),
                missing_segment,
            });
        }
    }

    (cleaned, warnings)
}

fn remove_at(map: &mut Map<String, Value>, segments: &[String]) -> Result<(), String> {
    match segments {
        [] => Ok(()),
        [last] => {
            map.remove(last);
            Ok(())
        }
        [head, rest @ ..] => match map.get_mut(head) {
            Some(Value::Object(child)) => remove_at(child, rest),
            _ => Err(head.clone()),
        },
    }
}
