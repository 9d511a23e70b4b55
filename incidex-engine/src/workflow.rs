//! Run pipeline
//!
//! One consolidation run end to end:
//! 1. Take the run lock next to the document
//! 2. Load the stored document (missing → empty)
//! 3. Read every source in enumeration order (adapter reads and asset hashing run on the
//!    blocking pool)
//! 4. Consolidate in memory
//! 5. Save atomically
//!
//! Reporting loads the document and overrides, applies overrides, and aggregates KPIs.

use crate::adapters::{build_adapters, SourceAdapter};
use crate::error::{EngineError, EngineResult};
use crate::services::consolidator::{self, RunSummary};
use crate::services::kpi_aggregator::{KpiAggregator, KpiResult};
use crate::services::override_layer;
use crate::storage::{DocumentStore, OverrideStore, RunLock};
use chrono::{DateTime, NaiveDate, Utc};
use incidex_common::config::{KpiConfig, SourceConfig, TomlConfig};
use incidex_common::fingerprint::asset_fingerprint;
use incidex_common::models::{CacheDocument, ObservedIncident, RunSource};
use incidex_common::time;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// Resolved engine configuration, passed explicitly to everything that needs it
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub root_folder: PathBuf,
    pub document_path: PathBuf,
    pub overrides_path: PathBuf,
    pub strict_load: bool,
    pub kpi: KpiConfig,
    pub sources: Vec<SourceConfig>,
}

impl EngineConfig {
    /// Resolve storage paths in `toml` against `root_folder`
    pub fn from_toml(toml: &TomlConfig, root_folder: PathBuf) -> Self {
        Self {
            document_path: TomlConfig::resolve_path(&root_folder, &toml.storage.document),
            overrides_path: TomlConfig::resolve_path(&root_folder, &toml.storage.overrides),
            strict_load: toml.storage.strict_load,
            kpi: toml.kpi,
            sources: toml.sources.clone(),
            root_folder,
        }
    }

    pub fn document_store(&self) -> DocumentStore {
        DocumentStore::new(&self.document_path, self.strict_load)
    }

    pub fn override_store(&self) -> OverrideStore {
        OverrideStore::new(&self.overrides_path)
    }
}

pub struct ConsolidationPipeline {
    config: EngineConfig,
    adapters: Vec<Arc<dyn SourceAdapter>>,
}

impl ConsolidationPipeline {
    /// Pipeline reading the configured sources
    pub fn new(config: EngineConfig) -> Self {
        let adapters = build_adapters(&config.sources, &config.root_folder);
        Self { config, adapters }
    }

    /// Pipeline reading explicit adapters (enumeration order = slice order)
    pub fn with_adapters(config: EngineConfig, adapters: Vec<Arc<dyn SourceAdapter>>) -> Self {
        Self { config, adapters }
    }

    /// Execute one consolidation run now
    pub async fn run(&self) -> EngineResult<RunSummary> {
        self.run_at(time::now()).await
    }

    /// Execute one consolidation run stamped with `now`
    pub async fn run_at(&self, now: DateTime<Utc>) -> EngineResult<RunSummary> {
        let _lock = RunLock::acquire(&self.config.document_path)?;
        let store = self.config.document_store();

        let existing = store.load().await?;
        let run_id = consolidator::next_run_id(&existing, now);

        let (observations, sources) = self.read_sources(&run_id).await?;
        log_unchanged_sources(&existing, &sources);

        let consolidation = consolidator::consolidate_at(existing, observations, sources, now)?;
        store
            .save(&consolidation.document, &consolidation.summary.run_id)
            .await?;

        Ok(consolidation.summary)
    }

    async fn read_sources(
        &self,
        run_id: &str,
    ) -> EngineResult<(Vec<ObservedIncident>, Vec<RunSource>)> {
        let mut observations = Vec::new();
        let mut sources = Vec::with_capacity(self.adapters.len());

        for adapter in &self.adapters {
            let source_id = adapter.source_id().to_string();
            let read_error = |message: String| EngineError::Read {
                run_id: run_id.to_string(),
                source_id: source_id.clone(),
                message,
            };

            let task_adapter = Arc::clone(adapter);
            let (rows, fingerprint) = tokio::task::spawn_blocking(move || {
                let rows = task_adapter.read()?;
                let fingerprint = asset_fingerprint(task_adapter.asset())?;
                Ok::<_, incidex_common::Error>((rows, fingerprint))
            })
            .await
            .map_err(|e| read_error(format!("reader task failed: {}", e)))?
            .map_err(|e| read_error(e.to_string()))?;

            info!(
                run_id,
                source_id = %source_id,
                rows = rows.len(),
                "Read source"
            );

            sources.push(RunSource {
                source_id: source_id.clone(),
                asset: adapter.asset().display().to_string(),
                fingerprint: Some(fingerprint),
            });
            observations.extend(rows);
        }

        Ok((observations, sources))
    }

    /// KPI report over the stored document with overrides applied
    pub async fn report(&self, today: NaiveDate) -> EngineResult<KpiResult> {
        report_with(&self.config, self.config.kpi, today).await
    }
}

/// KPI report over stored state with explicit thresholds
pub async fn report_with(
    config: &EngineConfig,
    kpi: KpiConfig,
    today: NaiveDate,
) -> EngineResult<KpiResult> {
    let document = config.document_store().load_snapshot().await?;
    let overrides = config.override_store().load().await;

    let effective = override_layer::apply_all(&document, &overrides);
    let result = KpiAggregator::new(kpi).aggregate(&effective, today);

    info!(
        reference_date = %today,
        incidents = result.total_incidents,
        stale = result.stale_count,
        master = result.master_count,
        "Aggregated KPIs"
    );
    Ok(result)
}

/// Note sources whose content is identical to what the previous run consumed
fn log_unchanged_sources(existing: &CacheDocument, sources: &[RunSource]) {
    let Some(previous) = existing.latest_run() else {
        return;
    };
    for source in sources {
        let unchanged = previous.sources.iter().any(|prior| {
            prior.source_id == source.source_id
                && prior.fingerprint.is_some()
                && prior.fingerprint == source.fingerprint
        });
        if unchanged {
            info!(
                source_id = %source.source_id,
                previous_run = %previous.run_id,
                "Source content unchanged since previous run"
            );
        }
    }
}
