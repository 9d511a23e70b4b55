//! incidex-engine library interface
//!
//! Exposes the consolidation pipeline for the `incidex` binary and integration tests

pub mod adapters;
pub mod error;
pub mod services;
pub mod storage;
pub mod workflow;

pub use crate::error::{EngineError, EngineResult};
pub use crate::workflow::{ConsolidationPipeline, EngineConfig};
