//! # Incidex Common Library
//!
//! Shared code for the incidex workspace:
//! - Incident data model (observations, merged records, run audit trail)
//! - Global id fingerprinting
//! - Configuration loading
//! - Timestamp utilities

pub mod config;
pub mod error;
pub mod fingerprint;
pub mod models;
pub mod time;

pub use error::{Error, Result};
pub use models::{CacheDocument, IncidentRecord, ObservedIncident, Severity, Status};
