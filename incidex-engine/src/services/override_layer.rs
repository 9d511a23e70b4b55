//! Override Layer
//!
//! Operator corrections applied on top of merged records at read time. Stored records keep
//! their observed values, so overrides never show up as history events and never make a
//! re-ingested observation look like a change.

use incidex_common::models::{CacheDocument, IncidentRecord, OverrideFields, OverrideSet};

/// Apply the override entry for `record.global_id`, if any
pub fn apply(record: IncidentRecord, overrides: &OverrideSet) -> IncidentRecord {
    match overrides.get(&record.global_id) {
        Some(fields) => apply_fields(record, fields),
        None => record,
    }
}

/// Override values win field by field; unset override fields leave merged values intact
pub fn apply_fields(mut record: IncidentRecord, fields: &OverrideFields) -> IncidentRecord {
    if let Some(severity) = fields.severity {
        record.severity = severity;
    }
    if let Some(status) = fields.status {
        record.status = status;
    }
    if let Some(description) = &fields.description {
        record.description = Some(description.clone());
    }
    if let Some(product) = &fields.product {
        record.product = Some(product.clone());
    }
    if let Some(feature) = &fields.feature {
        record.feature = Some(feature.clone());
    }
    if let Some(date) = fields.incident_date {
        record.incident_date = Some(date);
    }
    if let Some(clients) = fields.clients_affected {
        record.clients_affected = Some(clients);
    }
    record
}

/// Effective view of every incident in the document, in global id order
pub fn apply_all(document: &CacheDocument, overrides: &OverrideSet) -> Vec<IncidentRecord> {
    document
        .incidents
        .values()
        .map(|record| apply(record.clone(), overrides))
        .collect()
}

/// Override entries whose global id is not (yet) in the document
pub fn orphaned<'a>(document: &CacheDocument, overrides: &'a OverrideSet) -> Vec<&'a str> {
    overrides
        .overrides
        .keys()
        .filter(|id| !document.incidents.contains_key(id.as_str()))
        .map(String::as_str)
        .collect()
}
