//! Error types for incidex-engine
//!
//! Consolidation failures carry the run id and the stage that failed (read, merge, write) so
//! an operator can tell whether the stored document was touched.

use std::path::PathBuf;
use thiserror::Error;

/// Engine error type
#[derive(Debug, Error)]
pub enum EngineError {
    /// A source adapter could not produce observations
    #[error("Run {run_id}: read failed for source '{source_id}': {message}")]
    Read {
        run_id: String,
        source_id: String,
        message: String,
    },

    /// An observation could not be folded into its record
    #[error("Run {run_id}: merge failed for incident {global_id}: {message}")]
    Merge {
        run_id: String,
        global_id: String,
        message: String,
    },

    /// The consolidated document (or overrides) could not be persisted
    #[error("Run {run_id}: write failed for {}: {source}", path.display())]
    Write {
        run_id: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Stored state exists but cannot be decoded (strict load only)
    #[error("Corrupt state file {}: {message}", path.display())]
    Corrupt { path: PathBuf, message: String },

    /// Another run holds the document lock
    #[error("Document is locked by another run: {}", .0.display())]
    Locked(PathBuf),

    /// Invalid operator input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// incidex-common error
    #[error("Common error: {0}")]
    Common(#[from] incidex_common::Error),
}

impl EngineError {
    /// Run id the failure belongs to, when it happened inside a run
    pub fn run_id(&self) -> Option<&str> {
        match self {
            EngineError::Read { run_id, .. }
            | EngineError::Merge { run_id, .. }
            | EngineError::Write { run_id, .. } => Some(run_id),
            _ => None,
        }
    }

    /// Pipeline stage the failure belongs to
    pub fn stage(&self) -> &'static str {
        match self {
            EngineError::Read { .. } | EngineError::Corrupt { .. } | EngineError::Locked(_) => {
                "read"
            }
            EngineError::Merge { .. } => "merge",
            EngineError::Write { .. } => "write",
            _ => "setup",
        }
    }
}

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;
