//! Incident data model
//!
//! Observations are immutable snapshots produced by source adapters. Records are the merged,
//! per-global-id state carried across runs inside a [`CacheDocument`].

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Incident severity
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
    #[default]
    Unknown,
}

impl Severity {
    pub const ALL: [Severity; 5] = [
        Severity::Critical,
        Severity::High,
        Severity::Medium,
        Severity::Low,
        Severity::Unknown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Critical => "CRITICAL",
            Severity::High => "HIGH",
            Severity::Medium => "MEDIUM",
            Severity::Low => "LOW",
            Severity::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = String;

    /// Lenient parse covering the vocabularies seen in ticket exports
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "critical" | "crit" | "blocker" | "p1" | "sev1" => Ok(Severity::Critical),
            "high" | "major" | "p2" | "sev2" => Ok(Severity::High),
            "medium" | "normal" | "moderate" | "p3" | "sev3" => Ok(Severity::Medium),
            "low" | "minor" | "trivial" | "p4" | "sev4" => Ok(Severity::Low),
            "unknown" => Ok(Severity::Unknown),
            other => Err(format!("unrecognized severity '{}'", other)),
        }
    }
}

/// Incident workflow status
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    Open,
    InProgress,
    Blocked,
    Closed,
    #[default]
    Unknown,
}

impl Status {
    pub const ALL: [Status; 5] = [
        Status::Open,
        Status::InProgress,
        Status::Blocked,
        Status::Closed,
        Status::Unknown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Open => "OPEN",
            Status::InProgress => "IN_PROGRESS",
            Status::Blocked => "BLOCKED",
            Status::Closed => "CLOSED",
            Status::Unknown => "UNKNOWN",
        }
    }

    /// Open, in progress or blocked
    pub fn is_active(&self) -> bool {
        matches!(self, Status::Open | Status::InProgress | Status::Blocked)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        match normalized.as_str() {
            "open" | "new" | "todo" | "to_do" | "reopened" => Ok(Status::Open),
            "in_progress" | "inprogress" | "wip" | "ongoing" | "investigating" => {
                Ok(Status::InProgress)
            }
            "blocked" | "on_hold" | "waiting" => Ok(Status::Blocked),
            "closed" | "done" | "resolved" | "fixed" => Ok(Status::Closed),
            "unknown" => Ok(Status::Unknown),
            other => Err(format!("unrecognized status '{}'", other)),
        }
    }
}

/// Mutable incident fields tracked by change history
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncidentField {
    Status,
    Severity,
    Description,
    Product,
    Feature,
    IncidentDate,
    ClientsAffected,
}

impl fmt::Display for IncidentField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            IncidentField::Status => "status",
            IncidentField::Severity => "severity",
            IncidentField::Description => "description",
            IncidentField::Product => "product",
            IncidentField::Feature => "feature",
            IncidentField::IncidentDate => "incident_date",
            IncidentField::ClientsAffected => "clients_affected",
        };
        f.write_str(name)
    }
}

/// One adapter's snapshot of one incident at ingest time
///
/// `None` means the source did not provide the field; merging keeps the prior value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ObservedIncident {
    pub source_id: String,
    /// Source-local identifier; adapters synthesize one when the row has none
    #[serde(default)]
    pub source_key: Option<String>,
    #[serde(default)]
    pub severity: Option<Severity>,
    #[serde(default)]
    pub status: Option<Status>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub product: Option<String>,
    #[serde(default)]
    pub feature: Option<String>,
    #[serde(default)]
    pub incident_date: Option<NaiveDate>,
    #[serde(default)]
    pub clients_affected: Option<u32>,
}

impl ObservedIncident {
    /// Create an observation with no fields provided
    pub fn new(source_id: impl Into<String>, source_key: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            source_key: Some(source_key.into()),
            ..Default::default()
        }
    }
}

/// Kind of history event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    /// Record first observed
    Created,
    /// Observed field value changed
    Updated,
}

/// One entry in an incident's change history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub run_id: String,
    pub timestamp: DateTime<Utc>,
    pub kind: ChangeKind,
    /// Changed field (absent for `created` events)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<IncidentField>,
    #[serde(default)]
    pub old_value: Value,
    #[serde(default)]
    pub new_value: Value,
}

/// Merged incident state, mutable across runs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncidentRecord {
    pub global_id: String,
    pub source_id: String,
    pub source_key: String,
    pub severity: Severity,
    pub status: Status,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub product: Option<String>,
    #[serde(default)]
    pub feature: Option<String>,
    #[serde(default)]
    pub incident_date: Option<NaiveDate>,
    #[serde(default)]
    pub clients_affected: Option<u32>,
    pub first_seen_run: String,
    pub first_seen_at: DateTime<Utc>,
    pub last_seen_run: String,
    pub last_seen_at: DateTime<Utc>,
    #[serde(default)]
    pub history: Vec<ChangeEvent>,
}

impl IncidentRecord {
    /// Timestamp of the newest history event (the last meaningful update)
    pub fn last_updated_at(&self) -> DateTime<Utc> {
        self.history
            .last()
            .map(|event| event.timestamp)
            .unwrap_or(self.first_seen_at)
    }

    /// When the incident was closed, if it currently is
    ///
    /// Newest status transition to CLOSED; records closed at creation (or closed only
    /// through an override) fall back to their creation time.
    pub fn closed_at(&self) -> Option<DateTime<Utc>> {
        if self.status != Status::Closed {
            return None;
        }
        let closed = Value::String(Status::Closed.as_str().to_string());
        let transition = self
            .history
            .iter()
            .rev()
            .find(|event| event.field == Some(IncidentField::Status) && event.new_value == closed)
            .map(|event| event.timestamp);

        Some(transition.unwrap_or(self.first_seen_at))
    }
}

/// One source consumed by a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSource {
    pub source_id: String,
    /// Location of the asset (file path or URI)
    pub asset: String,
    /// SHA-256 of the asset content
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,
}

/// Audit entry for one consolidation run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunInfo {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub sources: Vec<RunSource>,
}

/// The whole persisted consolidation state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheDocument {
    pub generated_at: DateTime<Utc>,
    /// Append-only run audit trail, oldest first
    #[serde(default)]
    pub runs: Vec<RunInfo>,
    #[serde(default)]
    pub incidents: BTreeMap<String, IncidentRecord>,
}

impl CacheDocument {
    /// Empty document stamped with `generated_at`
    pub fn empty(generated_at: DateTime<Utc>) -> Self {
        Self {
            generated_at,
            runs: Vec::new(),
            incidents: BTreeMap::new(),
        }
    }

    pub fn latest_run(&self) -> Option<&RunInfo> {
        self.runs.last()
    }
}

/// Operator-supplied field corrections for one incident
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OverrideFields {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<Severity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<Status>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feature: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub incident_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clients_affected: Option<u32>,
}

impl OverrideFields {
    pub fn is_empty(&self) -> bool {
        *self == OverrideFields::default()
    }

    /// Fold `update` into this entry; fields `update` leaves unset are kept
    pub fn merge_from(&mut self, update: OverrideFields) {
        self.severity = update.severity.or(self.severity);
        self.status = update.status.or(self.status);
        self.description = update.description.or(self.description.take());
        self.product = update.product.or(self.product.take());
        self.feature = update.feature.or(self.feature.take());
        self.incident_date = update.incident_date.or(self.incident_date);
        self.clients_affected = update.clients_affected.or(self.clients_affected);
    }
}

/// Persisted override mapping with its last modification time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverrideSet {
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub overrides: BTreeMap<String, OverrideFields>,
}

impl OverrideSet {
    pub fn empty(updated_at: DateTime<Utc>) -> Self {
        Self {
            updated_at,
            overrides: BTreeMap::new(),
        }
    }

    pub fn get(&self, global_id: &str) -> Option<&OverrideFields> {
        self.overrides.get(global_id)
    }
}
