//! Durable storage boundary
//!
//! The consolidated document and the override set are single JSON files. Writes go to a sibling
//! temp file that is synced and then renamed over the target, so a failed write never leaves a
//! half-written file behind. A lock file next to the document keeps two runs from racing.

pub mod document_store;
pub mod override_store;

pub use document_store::DocumentStore;
pub use override_store::OverrideStore;

use crate::error::{EngineError, EngineResult};
use chrono::{DateTime, Utc};
use std::ffi::OsString;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

/// `path` with `suffix` appended to its file name
pub(crate) fn sibling_path(path: &Path, suffix: &str) -> PathBuf {
    let mut name: OsString = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| OsString::from("state"));
    name.push(suffix);
    path.with_file_name(name)
}

/// Replace `path` with `contents` atomically (temp file + fsync + rename)
pub(crate) async fn write_atomic(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }

    let temp_path = sibling_path(path, ".tmp");
    let result = async {
        let mut file = tokio::fs::File::create(&temp_path).await?;
        file.write_all(contents).await?;
        file.sync_all().await?;
        drop(file);
        tokio::fs::rename(&temp_path, path).await
    }
    .await;

    if result.is_err() {
        let _ = tokio::fs::remove_file(&temp_path).await;
    }
    result
}

/// Move an unreadable state file aside so the next save cannot overwrite it
pub(crate) async fn quarantine(path: &Path, now: DateTime<Utc>) -> Option<PathBuf> {
    let suffix = format!(".corrupt-{}", now.format("%Y%m%dT%H%M%SZ"));
    let target = sibling_path(path, &suffix);
    match tokio::fs::rename(path, &target).await {
        Ok(()) => Some(target),
        Err(e) => {
            warn!(path = %path.display(), "Could not quarantine corrupt file: {}", e);
            None
        }
    }
}

/// Exclusive run lock held for the lifetime of the value
#[derive(Debug)]
pub struct RunLock {
    path: PathBuf,
}

impl RunLock {
    /// Acquire the lock guarding `document_path`
    pub fn acquire(document_path: &Path) -> EngineResult<Self> {
        let path = sibling_path(document_path, ".lock");
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(EngineError::Locked(path));
            }
            Err(e) => return Err(EngineError::Io(e)),
        };
        // Holder pid helps an operator clear a stale lock
        let _ = writeln!(file, "{}", std::process::id());

        debug!(path = %path.display(), "Acquired run lock");
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            warn!(path = %self.path.display(), "Failed to release run lock: {}", e);
        }
    }
}
