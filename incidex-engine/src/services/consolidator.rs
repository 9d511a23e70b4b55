//! Consolidation Orchestrator
//!
//! Drives one ingestion run over an in-memory document:
//! 1. Derive a strictly increasing run id from the consolidation timestamp
//! 2. Append the run to the audit trail (never pruned)
//! 3. Fingerprint, merge and write back every observation, in source enumeration order
//!
//! Loading and persisting the document belong to the caller (see `workflow`).

use super::merge_engine;
use crate::error::{EngineError, EngineResult};
use chrono::{DateTime, Duration, NaiveDateTime, TimeZone, Utc};
use incidex_common::fingerprint::fingerprint;
use incidex_common::models::{CacheDocument, ObservedIncident, RunInfo, RunSource};
use incidex_common::time;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Width of the sequence suffix that disambiguates runs sharing a timestamp
const RUN_SEQUENCE_WIDTH: usize = 4;

/// First sequence number that no longer fits the suffix width
const RUN_SEQUENCE_LIMIT: u32 = 10_000;

/// Per-run consolidation statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: String,
    /// Observations merged
    pub observations: usize,
    /// Records created this run
    pub created: usize,
    /// Observations that changed an existing record
    pub updated: usize,
    /// Observations that only confirmed an existing record
    pub unchanged: usize,
    /// Net history events added across all records
    pub events_appended: usize,
    /// Observations that arrived without a source key
    pub keys_synthesized: usize,
}

impl RunSummary {
    pub fn display_string(&self) -> String {
        format!(
            "Run {}: {} observations, {} created, {} updated, {} unchanged, {} history events",
            self.run_id,
            self.observations,
            self.created,
            self.updated,
            self.unchanged,
            self.events_appended
        )
    }
}

/// Result of one consolidation run
#[derive(Debug, Clone)]
pub struct Consolidation {
    pub document: CacheDocument,
    pub summary: RunSummary,
}

/// Consolidate `observations` into `existing` at the current time
pub fn consolidate(
    existing: CacheDocument,
    observations: Vec<ObservedIncident>,
    sources: Vec<RunSource>,
) -> EngineResult<CacheDocument> {
    consolidate_at(existing, observations, sources, time::now()).map(|c| c.document)
}

/// Consolidate with an explicit consolidation timestamp
pub fn consolidate_at(
    mut document: CacheDocument,
    observations: Vec<ObservedIncident>,
    sources: Vec<RunSource>,
    now: DateTime<Utc>,
) -> EngineResult<Consolidation> {
    let run_id = next_run_id(&document, now);
    info!(
        run_id = %run_id,
        observations = observations.len(),
        sources = sources.len(),
        "Starting consolidation run"
    );

    document.runs.push(RunInfo {
        run_id: run_id.clone(),
        started_at: now,
        sources,
    });

    let mut summary = RunSummary {
        run_id: run_id.clone(),
        ..Default::default()
    };

    for (position, mut observation) in observations.into_iter().enumerate() {
        let source_key = match observation.source_key.as_deref().map(str::trim) {
            Some(key) if !key.is_empty() => key.to_string(),
            _ => {
                let key = format!("row-{}", position + 1);
                warn!(
                    run_id = %run_id,
                    source_id = %observation.source_id,
                    key = %key,
                    "Observation without source key; using positional key"
                );
                summary.keys_synthesized += 1;
                key
            }
        };
        observation.source_key = Some(source_key.clone());

        let global_id = fingerprint(&observation.source_id, &source_key);
        let previous = document.incidents.remove(&global_id);
        let before = previous.clone();

        let merged = merge_engine::merge(previous, &observation, &global_id, &run_id, now)
            .map_err(|e| EngineError::Merge {
                run_id: run_id.clone(),
                global_id: global_id.clone(),
                message: e.to_string(),
            })?;

        match &before {
            None => {
                summary.created += 1;
                summary.events_appended += merged.history.len();
            }
            Some(prior) => {
                let prior_len = prior.history.len();
                summary.events_appended += merged.history.len().saturating_sub(prior_len);
                if merged.history != prior.history {
                    summary.updated += 1;
                } else {
                    summary.unchanged += 1;
                }
            }
        }
        summary.observations += 1;

        debug!(
            run_id = %run_id,
            global_id = %global_id,
            source_id = %observation.source_id,
            history_len = merged.history.len(),
            "Merged observation"
        );
        document.incidents.insert(global_id, merged);
    }

    document.generated_at = now;

    info!("{}", summary.display_string());
    Ok(Consolidation { document, summary })
}

/// Next run id for `document` at `now`: `<timestamp>-<sequence>`
///
/// When the newest recorded run carries the same or a later timestamp (several runs within one
/// millisecond, or a clock that stepped back), its timestamp is reused with the next sequence
/// number. A full sequence carries into the timestamp (+1 ms, sequence 0), so run ids always
/// sort after every earlier run.
pub fn next_run_id(document: &CacheDocument, now: DateTime<Utc>) -> String {
    let stamp = time::run_id_timestamp(now);

    let (base, sequence) = match document.latest_run().and_then(|run| split_run_id(&run.run_id)) {
        Some((last_base, last_seq)) if last_base >= stamp.as_str() => {
            let next_seq = last_seq.saturating_add(1);
            match advance_base(last_base) {
                Some(carried) if next_seq >= RUN_SEQUENCE_LIMIT => (carried, 0),
                _ => (last_base.to_string(), next_seq),
            }
        }
        _ => (stamp, 0),
    };

    format!("{}-{:0width$}", base, sequence, width = RUN_SEQUENCE_WIDTH)
}

/// Run id timestamp one millisecond after `base`
fn advance_base(base: &str) -> Option<String> {
    let parsed = NaiveDateTime::parse_from_str(base, time::RUN_ID_TIMESTAMP_FORMAT).ok()?;
    let next = parsed.checked_add_signed(Duration::milliseconds(1))?;
    Some(time::run_id_timestamp(Utc.from_utc_datetime(&next)))
}

fn split_run_id(run_id: &str) -> Option<(&str, u32)> {
    let (base, sequence) = run_id.rsplit_once('-')?;
    Some((base, sequence.parse().ok()?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use incidex_common::models::{Severity, Status};

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 7, 1, hour, 0, 0).unwrap()
    }

    fn obs(source: &str, key: &str, severity: Severity) -> ObservedIncident {
        ObservedIncident {
            severity: Some(severity),
            status: Some(Status::Open),
            ..ObservedIncident::new(source, key)
        }
    }

    #[test]
    fn test_run_id_from_timestamp() {
        let doc = CacheDocument::empty(at(0));
        assert_eq!(next_run_id(&doc, at(10)), "20260701T100000.000Z-0000");
    }

    #[test]
    fn test_run_id_same_instant_increments_sequence() {
        let doc = CacheDocument::empty(at(0));
        let doc = consolidate_at(doc, vec![], vec![], at(10)).unwrap().document;
        let doc = consolidate_at(doc, vec![], vec![], at(10)).unwrap().document;

        let ids: Vec<_> = doc.runs.iter().map(|r| r.run_id.as_str()).collect();
        assert_eq!(
            ids,
            vec!["20260701T100000.000Z-0000", "20260701T100000.000Z-0001"]
        );
    }

    #[test]
    fn test_run_id_full_sequence_carries_into_timestamp() {
        let mut doc = CacheDocument::empty(at(0));
        doc.runs.push(RunInfo {
            run_id: "20260701T100000.000Z-9999".to_string(),
            started_at: at(10),
            sources: vec![],
        });

        let next = next_run_id(&doc, at(9));
        assert_eq!(next, "20260701T100000.001Z-0000");
        assert!(next.as_str() > doc.runs[0].run_id.as_str());
    }

    #[test]
    fn test_run_id_carry_rolls_over_second_boundary() {
        let mut doc = CacheDocument::empty(at(0));
        doc.runs.push(RunInfo {
            run_id: "20260701T235959.999Z-9999".to_string(),
            started_at: at(10),
            sources: vec![],
        });
        assert_eq!(next_run_id(&doc, at(9)), "20260702T000000.000Z-0000");
    }

    #[test]
    fn test_run_id_monotonic_when_clock_steps_back() {
        let doc = CacheDocument::empty(at(0));
        let doc = consolidate_at(doc, vec![], vec![], at(10)).unwrap().document;
        let doc = consolidate_at(doc, vec![], vec![], at(9)).unwrap().document;

        assert!(doc.runs[1].run_id > doc.runs[0].run_id);
    }

    #[test]
    fn test_run_appended_with_sources() {
        let source = RunSource {
            source_id: "jira".to_string(),
            asset: "/exports/jira.json".to_string(),
            fingerprint: Some("abc".to_string()),
        };
        let out = consolidate_at(
            CacheDocument::empty(at(0)),
            vec![obs("jira", "INC-1", Severity::High)],
            vec![source.clone()],
            at(10),
        )
        .unwrap();

        assert_eq!(out.document.runs.len(), 1);
        assert_eq!(out.document.runs[0].sources, vec![source]);
        assert_eq!(out.document.runs[0].started_at, at(10));
        assert_eq!(out.document.generated_at, at(10));
        assert_eq!(out.summary.created, 1);
        assert_eq!(out.summary.observations, 1);
    }

    #[test]
    fn test_summary_counts_updates_and_unchanged() {
        let first = consolidate_at(
            CacheDocument::empty(at(0)),
            vec![
                obs("jira", "INC-1", Severity::High),
                obs("jira", "INC-2", Severity::Low),
            ],
            vec![],
            at(10),
        )
        .unwrap();

        let second = consolidate_at(
            first.document,
            vec![
                obs("jira", "INC-1", Severity::Critical),
                obs("jira", "INC-2", Severity::Low),
            ],
            vec![],
            at(11),
        )
        .unwrap();

        assert_eq!(second.summary.created, 0);
        assert_eq!(second.summary.updated, 1);
        assert_eq!(second.summary.unchanged, 1);
        assert_eq!(second.summary.events_appended, 1);
    }

    #[test]
    fn test_missing_key_gets_positional_key() {
        let keyless = ObservedIncident {
            source_id: "sheet".to_string(),
            ..Default::default()
        };
        let out =
            consolidate_at(CacheDocument::empty(at(0)), vec![keyless], vec![], at(10)).unwrap();

        let gid = fingerprint("sheet", "row-1");
        assert!(out.document.incidents.contains_key(&gid));
        assert_eq!(out.summary.keys_synthesized, 1);
    }

    #[test]
    fn test_consolidate_uses_current_time() {
        let doc = consolidate(
            CacheDocument::empty(at(0)),
            vec![obs("jira", "INC-1", Severity::High)],
            vec![],
        )
        .unwrap();
        assert_eq!(doc.runs.len(), 1);
        assert!(doc.generated_at > at(0));
    }
}
