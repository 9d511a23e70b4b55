//! Test Helper Utilities
//!
//! Shared fixtures for incidex-engine integration tests

#![allow(dead_code)]

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use incidex_common::config::{KpiConfig, SourceConfig, SourceKind};
use incidex_common::fingerprint::fingerprint;
use incidex_common::models::{
    ChangeEvent, ChangeKind, IncidentField, IncidentRecord, ObservedIncident, Severity, Status,
};
use incidex_engine::EngineConfig;
use serde_json::Value;
use std::path::{Path, PathBuf};

/// Fixed instant on 2026-07-`day`
pub fn at(day: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 7, day, hour, 0, 0).unwrap()
}

pub fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap()
}

/// Engine config rooted at `root` with default storage names and thresholds
pub fn engine_config(root: &Path, sources: Vec<SourceConfig>) -> EngineConfig {
    EngineConfig {
        root_folder: root.to_path_buf(),
        document_path: root.join("incidents.json"),
        overrides_path: root.join("overrides.json"),
        strict_load: false,
        kpi: KpiConfig::default(),
        sources,
    }
}

pub fn source(id: &str, kind: SourceKind, path: &str) -> SourceConfig {
    SourceConfig {
        id: id.to_string(),
        kind,
        path: PathBuf::from(path),
    }
}

/// Write `content` to `root/name`, returning the full path
pub fn write_file(root: &Path, name: &str, content: &str) -> PathBuf {
    let path = root.join(name);
    std::fs::write(&path, content).unwrap();
    path
}

/// Fully populated observation
pub fn observation(source_id: &str, key: &str, severity: Severity, status: Status) -> ObservedIncident {
    ObservedIncident {
        severity: Some(severity),
        status: Some(status),
        description: Some(format!("{} {}", source_id, key)),
        product: Some("portal".to_string()),
        clients_affected: Some(1),
        ..ObservedIncident::new(source_id, key)
    }
}

/// Stored record created at `created`, with no updates since
pub fn record(source_id: &str, key: &str, status: Status, created: DateTime<Utc>) -> IncidentRecord {
    let run_id = format!("{}-0000", created.format("%Y%m%dT%H%M%S%.3fZ"));
    IncidentRecord {
        global_id: fingerprint(source_id, key),
        source_id: source_id.to_string(),
        source_key: key.to_string(),
        severity: Severity::Medium,
        status,
        description: None,
        product: None,
        feature: None,
        incident_date: Some(created.date_naive()),
        clients_affected: None,
        first_seen_run: run_id.clone(),
        first_seen_at: created,
        last_seen_run: run_id.clone(),
        last_seen_at: created,
        history: vec![ChangeEvent {
            run_id,
            timestamp: created,
            kind: ChangeKind::Created,
            field: None,
            old_value: Value::Null,
            new_value: Value::Null,
        }],
    }
}

/// Append a field update event to `record` and apply the new status
pub fn push_status_change(record: &mut IncidentRecord, status: Status, when: DateTime<Utc>) {
    record.history.push(ChangeEvent {
        run_id: format!("{}-0000", when.format("%Y%m%dT%H%M%S%.3fZ")),
        timestamp: when,
        kind: ChangeKind::Updated,
        field: Some(IncidentField::Status),
        old_value: Value::String(record.status.as_str().to_string()),
        new_value: Value::String(status.as_str().to_string()),
    });
    record.status = status;
}
