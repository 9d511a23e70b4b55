//! JSON export adapter
//!
//! Accepts either a top-level array of incident objects or an object wrapping that array under
//! `"incidents"`. Keys are matched case-insensitively; numbers and booleans are read as text.

use super::{assign_missing_keys, non_blank, observation_from_row, SourceAdapter};
use incidex_common::models::ObservedIncident;
use incidex_common::{Error, Result};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub struct JsonAdapter {
    source_id: String,
    path: PathBuf,
}

impl JsonAdapter {
    pub fn new(source_id: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            source_id: source_id.into(),
            path: path.into(),
        }
    }

    /// Parse already-loaded JSON text
    pub fn parse(&self, content: &str) -> Result<Vec<ObservedIncident>> {
        let root: Value = serde_json::from_str(content)?;
        let rows = match root {
            Value::Array(rows) => rows,
            Value::Object(mut object) => match object.remove("incidents") {
                Some(Value::Array(rows)) => rows,
                _ => {
                    return Err(Error::InvalidInput(format!(
                        "{}: expected an array or an object with an \"incidents\" array",
                        self.path.display()
                    )))
                }
            },
            _ => {
                return Err(Error::InvalidInput(format!(
                    "{}: expected an array of incidents",
                    self.path.display()
                )))
            }
        };

        let mut observations = Vec::with_capacity(rows.len());
        for (index, row) in rows.into_iter().enumerate() {
            let row_number = index + 1;
            let Value::Object(object) = row else {
                warn!(source_id = %self.source_id, row = row_number, "Skipping non-object row");
                continue;
            };

            let fields = lowercase_fields(object);
            let lookup = |aliases: &[&str]| {
                aliases
                    .iter()
                    .find_map(|alias| fields.get(*alias).and_then(value_text))
            };

            match observation_from_row(&self.source_id, row_number, lookup) {
                Ok(observation) => observations.push(observation),
                Err(reason) => {
                    warn!(source_id = %self.source_id, row = row_number, "Skipping malformed row: {}", reason);
                }
            }
        }

        assign_missing_keys(&mut observations);
        Ok(observations)
    }
}

impl SourceAdapter for JsonAdapter {
    fn source_id(&self) -> &str {
        &self.source_id
    }

    fn asset(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> Result<Vec<ObservedIncident>> {
        let content = std::fs::read_to_string(&self.path)?;
        let observations = self.parse(&content)?;
        debug!(
            source_id = %self.source_id,
            path = %self.path.display(),
            rows = observations.len(),
            "Read JSON source"
        );
        Ok(observations)
    }
}

fn lowercase_fields(object: Map<String, Value>) -> HashMap<String, Value> {
    object
        .into_iter()
        .map(|(key, value)| (key.trim().to_ascii_lowercase(), value))
        .collect()
}

/// Text of a scalar JSON value; null, blank strings and containers are not provided
fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => non_blank(s),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}
