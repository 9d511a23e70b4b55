//! Override persistence
//!
//! Stored as `{ "updated_at": ..., "overrides": { global_id: fields } }`. Missing or malformed
//! storage degrades to an empty mapping. Readers leave a malformed file alone; `set` and
//! `clear` move it aside first so the edit does not silently replace it.

use super::{quarantine, write_atomic};
use crate::error::{EngineError, EngineResult};
use incidex_common::models::{OverrideFields, OverrideSet};
use incidex_common::time;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub struct OverrideStore {
    path: PathBuf,
}

impl OverrideStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current overrides; an unusable file reads as empty and stays where it is
    pub async fn load(&self) -> OverrideSet {
        match self.read().await {
            Ok(set) => set,
            Err(message) => {
                warn!(path = %self.path.display(), "Overrides {}; using none", message);
                OverrideSet::empty(time::now())
            }
        }
    }

    /// Overrides about to be rewritten; an unusable file is moved aside first
    async fn load_for_update(&self) -> OverrideSet {
        match self.read().await {
            Ok(set) => set,
            Err(message) => {
                let now = time::now();
                let moved_to = quarantine(&self.path, now).await;
                warn!(
                    path = %self.path.display(),
                    quarantined = ?moved_to,
                    "Overrides {}; starting from none",
                    message
                );
                OverrideSet::empty(now)
            }
        }
    }

    async fn read(&self) -> std::result::Result<OverrideSet, String> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No overrides file");
                return Ok(OverrideSet::empty(time::now()));
            }
            Err(e) => return Err(format!("unreadable ({})", e)),
        };

        let set = serde_json::from_str::<OverrideSet>(&content)
            .map_err(|e| format!("malformed ({})", e))?;
        debug!(path = %self.path.display(), entries = set.overrides.len(), "Loaded overrides");
        Ok(set)
    }

    pub async fn save(&self, set: &OverrideSet) -> EngineResult<()> {
        let bytes = serde_json::to_vec_pretty(set).map_err(incidex_common::Error::from)?;
        write_atomic(&self.path, &bytes).await.map_err(|e| {
            EngineError::Io(std::io::Error::new(
                e.kind(),
                format!("Failed to write overrides {}: {}", self.path.display(), e),
            ))
        })
    }

    /// Fold `fields` into the entry for `global_id` and persist
    pub async fn set(&self, global_id: &str, fields: OverrideFields) -> EngineResult<OverrideSet> {
        if fields.is_empty() {
            return Err(EngineError::InvalidInput(
                "an override must set at least one field".to_string(),
            ));
        }

        let mut set = self.load_for_update().await;
        set.overrides
            .entry(global_id.to_string())
            .or_default()
            .merge_from(fields);
        set.updated_at = time::now();
        self.save(&set).await?;

        info!(global_id, "Override set");
        Ok(set)
    }

    /// Remove the entry for `global_id`; returns whether one existed
    pub async fn clear(&self, global_id: &str) -> EngineResult<bool> {
        let mut set = self.load_for_update().await;
        if set.overrides.remove(global_id).is_none() {
            return Ok(false);
        }
        set.updated_at = time::now();
        self.save(&set).await?;

        info!(global_id, "Override cleared");
        Ok(true)
    }
}
