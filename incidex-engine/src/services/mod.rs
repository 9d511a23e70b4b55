//! Consolidation services
//!
//! Pure, in-memory stages of the incident pipeline. None of them touch storage.

pub mod consolidator;
pub mod kpi_aggregator;
pub mod merge_engine;
pub mod override_layer;

pub use consolidator::{consolidate, consolidate_at, next_run_id, Consolidation, RunSummary};
pub use kpi_aggregator::{aggregate, KpiAggregator, KpiResult, ResolutionStats};
pub use merge_engine::{merge, MergeError};
