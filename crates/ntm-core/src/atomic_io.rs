//! Write-temp-then-rename helpers for the `.ntm/` JSON files (manifest,
//! spawn-state, ratelimits). Renaming is atomic on the same filesystem, so a
//! concurrent reader (the resilience monitor, a dashboard) never observes a
//! torn write. Grounded on the temp-file-then-`create_new` pattern used by
//! the project's own pidfile lock (see [`crate::lockfile`]).

use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::Result;

/// Serialize `value` as pretty JSON and atomically replace `path`.
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp_path = tmp_path_for(path);
    let body = serde_json::to_vec_pretty(value)?;
    std::fs::write(&tmp_path, body)?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

/// Read and deserialize JSON from `path`. Returns `Ok(None)` if the file
/// does not exist.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    if !path.exists() {
        return Ok(None);
    }
    let body = std::fs::read(path)?;
    Ok(Some(serde_json::from_slice(&body)?))
}

/// Remove `path` if it exists; a missing file is not an error.
pub fn remove_if_exists(path: &Path) -> Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

fn tmp_path_for(path: &Path) -> std::path::PathBuf {
    let pid = std::process::id();
    let file_name = path.file_name().and_then(|n| n.to_str()).unwrap_or("tmp");
    path.with_file_name(format!(".{file_name}.{pid}.tmp"))
}
