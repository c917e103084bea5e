//! JSON state file holding the in-memory collections between runs.

use std::path::Path;

use nfa_storage::{MemoryState, MemoryStorage};

use crate::CliError;

/// Load the store from `path`. A missing file is an empty store.
pub(crate) fn load(path: &Path) -> Result<MemoryStorage, CliError> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!(path = %path.display(), "no state file, starting empty");
            return Ok(MemoryStorage::new());
        }
        Err(e) => {
            return Err(CliError::State {
                path: path.display().to_string(),
                reason: e.to_string(),
            })
        }
    };
    let state: MemoryState = serde_json::from_str(&content).map_err(|e| CliError::State {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;
    Ok(MemoryStorage::from_state(state))
}

/// Write the store to `path`, replacing the previous contents.
pub(crate) async fn save(storage: &MemoryStorage, path: &Path) -> Result<(), CliError> {
    let state = storage.export().await;
    let json = serde_json::to_string_pretty(&state).map_err(|e| CliError::State {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;
    std::fs::write(path, json).map_err(|e| CliError::State {
        path: path.display().to_string(),
        reason: e.to_string(),
    })
}
