//! Merge Engine
//!
//! Folds one observation into the per-global-id record.
//!
//! Merge strategy:
//! - Provided values overwrite current values, recording one history event per changed field
//! - Absent values (`None`) keep the current value, never nulling it out
//! - Provided values equal to the current value record nothing, so unchanged re-ingestion does
//!   not grow history
//!
//! Observations for the same id within one run are merged sequentially in source enumeration
//! order, so the last enumerated source wins each conflicting field. When a later observation
//! in the same run changes a field an earlier one already changed, that run's event for the
//! field is rewritten to the net transition (and dropped when the net transition is a no-op).
//! Conflicting sources therefore produce the same history on every re-run.

use chrono::{DateTime, Utc};
use incidex_common::models::{
    ChangeEvent, ChangeKind, IncidentField, IncidentRecord, ObservedIncident,
};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MergeError {
    /// The stored record belongs to a different global id
    #[error("record id {found} does not match global id {expected}")]
    IdMismatch { expected: String, found: String },
}

/// Merge `observation` into `previous` (or create a new record)
pub fn merge(
    previous: Option<IncidentRecord>,
    observation: &ObservedIncident,
    global_id: &str,
    run_id: &str,
    timestamp: DateTime<Utc>,
) -> Result<IncidentRecord, MergeError> {
    let Some(mut record) = previous else {
        return Ok(create_record(observation, global_id, run_id, timestamp));
    };

    if record.global_id != global_id {
        return Err(MergeError::IdMismatch {
            expected: global_id.to_string(),
            found: record.global_id,
        });
    }

    let mut changes = FieldChanges {
        history: &mut record.history,
        run_id,
        timestamp,
    };
    changes.apply(IncidentField::Status, &mut record.status, observation.status);
    changes.apply(IncidentField::Severity, &mut record.severity, observation.severity);
    changes.apply(
        IncidentField::Description,
        &mut record.description,
        observation.description.clone().map(Some),
    );
    changes.apply(
        IncidentField::Product,
        &mut record.product,
        observation.product.clone().map(Some),
    );
    changes.apply(
        IncidentField::Feature,
        &mut record.feature,
        observation.feature.clone().map(Some),
    );
    changes.apply(
        IncidentField::IncidentDate,
        &mut record.incident_date,
        observation.incident_date.map(Some),
    );
    changes.apply(
        IncidentField::ClientsAffected,
        &mut record.clients_affected,
        observation.clients_affected.map(Some),
    );

    // Being observed confirms the incident is still present in a source
    record.last_seen_run = run_id.to_string();
    record.last_seen_at = timestamp;

    Ok(record)
}

fn create_record(
    observation: &ObservedIncident,
    global_id: &str,
    run_id: &str,
    timestamp: DateTime<Utc>,
) -> IncidentRecord {
    tracing::debug!(global_id, run_id, "Creating incident record");

    IncidentRecord {
        global_id: global_id.to_string(),
        source_id: observation.source_id.clone(),
        source_key: observation.source_key.clone().unwrap_or_default(),
        severity: observation.severity.unwrap_or_default(),
        status: observation.status.unwrap_or_default(),
        description: observation.description.clone(),
        product: observation.product.clone(),
        feature: observation.feature.clone(),
        incident_date: observation.incident_date,
        clients_affected: observation.clients_affected,
        first_seen_run: run_id.to_string(),
        first_seen_at: timestamp,
        last_seen_run: run_id.to_string(),
        last_seen_at: timestamp,
        history: vec![ChangeEvent {
            run_id: run_id.to_string(),
            timestamp,
            kind: ChangeKind::Created,
            field: None,
            old_value: Value::Null,
            new_value: to_value(observation),
        }],
    }
}

struct FieldChanges<'a> {
    history: &'a mut Vec<ChangeEvent>,
    run_id: &'a str,
    timestamp: DateTime<Utc>,
}

impl FieldChanges<'_> {
    fn apply<T>(&mut self, field: IncidentField, current: &mut T, provided: Option<T>)
    where
        T: PartialEq + Serialize,
    {
        let Some(new) = provided else {
            return;
        };
        if *current == new {
            return;
        }

        let new_value = to_value(&new);
        let same_run = self.history.iter().rposition(|event| {
            event.kind == ChangeKind::Updated
                && event.field == Some(field)
                && event.run_id == self.run_id
        });

        match same_run {
            Some(index) => {
                let event = &mut self.history[index];
                event.new_value = new_value;
                event.timestamp = self.timestamp;
                if event.old_value == event.new_value {
                    self.history.remove(index);
                }
            }
            None => self.history.push(ChangeEvent {
                run_id: self.run_id.to_string(),
                timestamp: self.timestamp,
                kind: ChangeKind::Updated,
                field: Some(field),
                old_value: to_value(&*current),
                new_value,
            }),
        }

        *current = new;
    }
}

fn to_value<T: Serialize + ?Sized>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}
