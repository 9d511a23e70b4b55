//! Consolidated document persistence
//!
//! **Load:** a missing file yields an empty document with a fresh `generated_at`. A file that
//! exists but cannot be read or decoded is moved aside to `<name>.corrupt-<timestamp>` and an
//! empty document is substituted with a warning, unless strict loading is enabled, in which
//! case the run fails instead. Only a consolidation run holding the run lock moves files;
//! readers use [`DocumentStore::load_snapshot`], which leaves the file in place.
//!
//! **Save:** pretty JSON written atomically; failures are fatal and carry the run id.

use super::{quarantine, write_atomic};
use crate::error::{EngineError, EngineResult};
use incidex_common::models::CacheDocument;
use incidex_common::time;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

enum Stored {
    Missing,
    Document(CacheDocument),
    Unusable(String),
}

pub struct DocumentStore {
    path: PathBuf,
    strict_load: bool,
}

impl DocumentStore {
    pub fn new(path: impl Into<PathBuf>, strict_load: bool) -> Self {
        Self {
            path: path.into(),
            strict_load,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load for a consolidation run (caller holds the run lock)
    pub async fn load(&self) -> EngineResult<CacheDocument> {
        match self.read().await {
            Stored::Missing => Ok(self.missing()),
            Stored::Document(document) => Ok(document),
            Stored::Unusable(message) => self.degrade(message).await,
        }
    }

    /// Load for readers; an unusable file is reported but never moved
    pub async fn load_snapshot(&self) -> EngineResult<CacheDocument> {
        match self.read().await {
            Stored::Missing => Ok(self.missing()),
            Stored::Document(document) => Ok(document),
            Stored::Unusable(message) if self.strict_load => Err(EngineError::Corrupt {
                path: self.path.clone(),
                message,
            }),
            Stored::Unusable(message) => {
                warn!(
                    path = %self.path.display(),
                    "Stored document unusable ({}); reading as empty",
                    message
                );
                Ok(CacheDocument::empty(time::now()))
            }
        }
    }

    async fn read(&self) -> Stored {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Stored::Missing,
            Err(e) => return Stored::Unusable(format!("read failed: {}", e)),
        };

        match serde_json::from_str::<CacheDocument>(&content) {
            Ok(document) => {
                info!(
                    path = %self.path.display(),
                    runs = document.runs.len(),
                    incidents = document.incidents.len(),
                    "Loaded document"
                );
                Stored::Document(document)
            }
            Err(e) => Stored::Unusable(format!("decode failed: {}", e)),
        }
    }

    fn missing(&self) -> CacheDocument {
        info!(path = %self.path.display(), "No stored document, starting empty");
        CacheDocument::empty(time::now())
    }

    async fn degrade(&self, message: String) -> EngineResult<CacheDocument> {
        if self.strict_load {
            return Err(EngineError::Corrupt {
                path: self.path.clone(),
                message,
            });
        }

        let now = time::now();
        let moved_to = quarantine(&self.path, now).await;
        warn!(
            path = %self.path.display(),
            quarantined = ?moved_to,
            "Stored document unusable ({}); starting from an empty document",
            message
        );
        Ok(CacheDocument::empty(now))
    }

    pub async fn save(&self, document: &CacheDocument, run_id: &str) -> EngineResult<()> {
        let bytes = serde_json::to_vec_pretty(document).map_err(incidex_common::Error::from)?;

        write_atomic(&self.path, &bytes)
            .await
            .map_err(|source| EngineError::Write {
                run_id: run_id.to_string(),
                path: self.path.clone(),
                source,
            })?;

        info!(
            path = %self.path.display(),
            run_id,
            incidents = document.incidents.len(),
            "Saved document"
        );
        Ok(())
    }
}
