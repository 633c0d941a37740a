//! Crash-safe JSON files shared by the history and template stores
//!
//! Every save copies the previous file to `<file>.bak`, writes `<file>.tmp`
//! and renames it into place, so an interrupted write never leaves a
//! malformed file behind. Loading falls back to the backup copy.

use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};

use crate::PersistenceError;

/// What a load found on disk
#[derive(Debug)]
pub(crate) enum Loaded<T> {
    /// Neither the file nor a backup exists
    Missing,
    Found(T),
    /// The file exists but neither it nor its backup could be read
    Unusable,
}

pub(crate) async fn read<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, PersistenceError> {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    Ok(Some(serde_json::from_str(&content)?))
}

/// Read `path`, trying the backup copy when the main file is malformed
pub(crate) async fn load<T: DeserializeOwned>(path: &Path) -> Loaded<T> {
    match read(path).await {
        Ok(Some(value)) => Loaded::Found(value),
        Ok(None) => Loaded::Missing,
        Err(e) => {
            tracing::error!(path = %path.display(), error = %e, "failed to load store file, trying backup");
            match read(&backup_path(path)).await {
                Ok(Some(value)) => {
                    tracing::warn!(path = %path.display(), "store recovered from backup");
                    Loaded::Found(value)
                }
                Ok(None) => Loaded::Unusable,
                Err(e) => {
                    tracing::error!(path = %path.display(), error = %e, "store backup unusable");
                    Loaded::Unusable
                }
            }
        }
    }
}

/// Rewrite `path` with `value`, keeping the previous contents as the backup
pub(crate) async fn save<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), PersistenceError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        tokio::fs::create_dir_all(parent).await?;
    }

    let content = serde_json::to_string_pretty(value)?;

    if tokio::fs::try_exists(path).await? {
        tokio::fs::copy(path, backup_path(path)).await?;
    }

    let tmp = sibling_path(path, "tmp");
    tokio::fs::write(&tmp, content).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

pub(crate) fn backup_path(path: &Path) -> PathBuf {
    sibling_path(path, "bak")
}

/// `query_history.json` -> `query_history.json.<suffix>`
fn sibling_path(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".");
    name.push(suffix);
    PathBuf::from(name)
}
