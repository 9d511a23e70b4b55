//! Source adapters
//!
//! Each adapter turns one configured asset into a list of [`ObservedIncident`]s. Malformed rows
//! are skipped here with a warning, so the consolidation core only ever sees well-typed
//! observations.
//!
//! # Provided vs absent
//! A missing column/key, JSON `null`, or a blank (empty or whitespace-only) value is treated as
//! "not provided" for every field. CSV cannot distinguish an empty cell from a missing one, so
//! the same rule applies to JSON to keep the two formats merging identically. Unrecognized
//! severity/status vocabulary is also treated as not provided (with a warning) rather than
//! overwriting a known value with UNKNOWN.

pub mod csv;
pub mod json;

use chrono::{DateTime, NaiveDate};
use incidex_common::config::{SourceConfig, SourceKind, TomlConfig};
use incidex_common::fingerprint::KeySynthesizer;
use incidex_common::models::{ObservedIncident, Severity, Status};
use incidex_common::Result;
use std::path::Path;
use std::sync::Arc;
use tracing::warn;

pub use self::csv::CsvAdapter;
pub use self::json::JsonAdapter;

/// Capability every incident source provides
pub trait SourceAdapter: Send + Sync {
    /// Stable identifier of the source (part of every global id it produces)
    fn source_id(&self) -> &str;

    /// Location of the asset this adapter reads
    fn asset(&self) -> &Path;

    /// Read all well-formed rows; every returned observation carries a source key
    fn read(&self) -> Result<Vec<ObservedIncident>>;
}

/// Build the adapter for a configured source, resolving relative paths against `root_folder`
pub fn build_adapter(config: &SourceConfig, root_folder: &Path) -> Arc<dyn SourceAdapter> {
    let path = TomlConfig::resolve_path(root_folder, &config.path);
    match config.kind {
        SourceKind::Json => Arc::new(JsonAdapter::new(config.id.clone(), path)),
        SourceKind::Csv => Arc::new(CsvAdapter::new(config.id.clone(), path)),
    }
}

/// Build adapters for every configured source, preserving enumeration order
pub fn build_adapters(sources: &[SourceConfig], root_folder: &Path) -> Vec<Arc<dyn SourceAdapter>> {
    sources
        .iter()
        .map(|source| build_adapter(source, root_folder))
        .collect()
}

const KEY_ALIASES: &[&str] = &["key", "id", "ticket", "source_key"];
const SEVERITY_ALIASES: &[&str] = &["severity", "priority"];
const STATUS_ALIASES: &[&str] = &["status", "state"];
const DESCRIPTION_ALIASES: &[&str] = &["description", "summary", "title"];
const PRODUCT_ALIASES: &[&str] = &["product"];
const FEATURE_ALIASES: &[&str] = &["feature", "component"];
const DATE_ALIASES: &[&str] = &["incident_date", "date", "created"];
const CLIENTS_ALIASES: &[&str] = &["clients_affected", "clients", "affected_clients"];

/// Turn one row into an observation
///
/// `lookup` returns the trimmed, non-blank value of the first matching alias (column names are
/// compared case-insensitively by the caller). Errors describe why the row is malformed.
pub(crate) fn observation_from_row<F>(
    source_id: &str,
    row_number: usize,
    lookup: F,
) -> std::result::Result<ObservedIncident, String>
where
    F: Fn(&[&str]) -> Option<String>,
{
    let severity = lookup(SEVERITY_ALIASES).and_then(|raw| match raw.parse::<Severity>() {
        Ok(severity) => Some(severity),
        Err(e) => {
            warn!(source_id, row = row_number, "{}; treating severity as absent", e);
            None
        }
    });

    let status = lookup(STATUS_ALIASES).and_then(|raw| match raw.parse::<Status>() {
        Ok(status) => Some(status),
        Err(e) => {
            warn!(source_id, row = row_number, "{}; treating status as absent", e);
            None
        }
    });

    let incident_date = lookup(DATE_ALIASES)
        .map(|raw| parse_date(&raw).ok_or_else(|| format!("unparseable date '{}'", raw)))
        .transpose()?;

    let clients_affected = lookup(CLIENTS_ALIASES)
        .map(|raw| parse_count(&raw).ok_or_else(|| format!("invalid client count '{}'", raw)))
        .transpose()?;

    Ok(ObservedIncident {
        source_id: source_id.to_string(),
        source_key: lookup(KEY_ALIASES),
        severity,
        status,
        description: lookup(DESCRIPTION_ALIASES),
        product: lookup(PRODUCT_ALIASES),
        feature: lookup(FEATURE_ALIASES),
        incident_date,
        clients_affected,
    })
}

/// Assign synthesized keys to keyless rows
pub(crate) fn assign_missing_keys(observations: &mut [ObservedIncident]) {
    let mut synthesizer = KeySynthesizer::new();
    for observation in observations.iter_mut() {
        synthesizer.ensure_key(observation);
    }
}

/// Trim a raw cell; blank means not provided
pub(crate) fn non_blank(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Accepts ISO dates, `YYYY/MM/DD`, `DD.MM.YYYY`, and RFC 3339 timestamps
pub(crate) fn parse_date(raw: &str) -> Option<NaiveDate> {
    for format in ["%Y-%m-%d", "%Y/%m/%d", "%d.%m.%Y"] {
        if let Ok(date) = NaiveDate::parse_from_str(raw, format) {
            return Some(date);
        }
    }
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|ts| ts.date_naive())
}

/// Non-negative integer count; spreadsheet exports sometimes render integers as `12.0`
pub(crate) fn parse_count(raw: &str) -> Option<u32> {
    if let Ok(count) = raw.parse::<u32>() {
        return Some(count);
    }
    let value = raw.parse::<f64>().ok()?;
    if value >= 0.0 && value.fract() == 0.0 && value <= u32::MAX as f64 {
        Some(value as u32)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_in<'a>(row: &'a HashMap<&'a str, &'a str>) -> impl Fn(&[&str]) -> Option<String> + 'a {
        move |aliases: &[&str]| {
            aliases
                .iter()
                .find_map(|alias| row.get(alias).and_then(|v| non_blank(v)))
        }
    }

    #[test]
    fn test_row_maps_aliases() {
        let row = HashMap::from([
            ("ticket", "INC-9"),
            ("priority", "P1"),
            ("state", "in progress"),
            ("summary", "Portal down"),
            ("component", "login"),
            ("date", "2026-04-02"),
            ("clients", "12"),
        ]);
        let obs = observation_from_row("jira", 1, lookup_in(&row)).unwrap();

        assert_eq!(obs.source_key.as_deref(), Some("INC-9"));
        assert_eq!(obs.severity, Some(Severity::Critical));
        assert_eq!(obs.status, Some(Status::InProgress));
        assert_eq!(obs.description.as_deref(), Some("Portal down"));
        assert_eq!(obs.feature.as_deref(), Some("login"));
        assert_eq!(obs.product, None);
        assert_eq!(obs.incident_date, NaiveDate::from_ymd_opt(2026, 4, 2));
        assert_eq!(obs.clients_affected, Some(12));
    }

    #[test]
    fn test_blank_values_are_absent() {
        let row = HashMap::from([("key", "INC-1"), ("severity", "  "), ("description", "")]);
        let obs = observation_from_row("jira", 1, lookup_in(&row)).unwrap();
        assert_eq!(obs.severity, None);
        assert_eq!(obs.description, None);
    }

    #[test]
    fn test_unknown_vocabulary_is_absent_not_error() {
        let row = HashMap::from([("key", "INC-1"), ("severity", "spicy"), ("status", "limbo")]);
        let obs = observation_from_row("jira", 1, lookup_in(&row)).unwrap();
        assert_eq!(obs.severity, None);
        assert_eq!(obs.status, None);
    }

    #[test]
    fn test_bad_date_or_count_rejects_row() {
        let row = HashMap::from([("key", "INC-1"), ("date", "yesterday")]);
        assert!(observation_from_row("jira", 1, lookup_in(&row)).is_err());

        let row = HashMap::from([("key", "INC-1"), ("clients", "-3")]);
        assert!(observation_from_row("jira", 1, lookup_in(&row)).is_err());
    }

    #[test]
    fn test_parse_date_formats() {
        let expected = NaiveDate::from_ymd_opt(2026, 2, 28);
        assert_eq!(parse_date("2026-02-28"), expected);
        assert_eq!(parse_date("2026/02/28"), expected);
        assert_eq!(parse_date("28.02.2026"), expected);
        assert_eq!(parse_date("2026-02-28T17:45:00+00:00"), expected);
        assert_eq!(parse_date("02/28/2026"), None);
    }

    #[test]
    fn test_parse_count_accepts_integral_floats() {
        assert_eq!(parse_count("7"), Some(7));
        assert_eq!(parse_count("7.0"), Some(7));
        assert_eq!(parse_count("7.5"), None);
        assert_eq!(parse_count("many"), None);
    }
}
