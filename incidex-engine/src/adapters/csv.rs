//! CSV export adapter
//!
//! The first row is the header; column names are matched case-insensitively. Rows with the
//! wrong number of cells or malformed values are skipped.

use super::{assign_missing_keys, non_blank, observation_from_row, SourceAdapter};
use incidex_common::models::ObservedIncident;
use incidex_common::{Error, Result};
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub struct CsvAdapter {
    source_id: String,
    path: PathBuf,
}

impl CsvAdapter {
    pub fn new(source_id: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            source_id: source_id.into(),
            path: path.into(),
        }
    }

    /// Parse CSV from any reader
    pub fn parse<R: Read>(&self, input: R) -> Result<Vec<ObservedIncident>> {
        let mut reader = ::csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(::csv::Trim::All)
            .from_reader(input);

        let headers: Vec<String> = reader
            .headers()
            .map_err(|e| {
                Error::InvalidInput(format!("{}: unreadable header: {}", self.path.display(), e))
            })?
            .iter()
            .map(|h| h.trim().to_ascii_lowercase())
            .collect();

        let mut observations = Vec::new();
        for (index, record) in reader.records().enumerate() {
            // Header is line 1
            let row_number = index + 2;
            let record = match record {
                Ok(record) => record,
                Err(e) => {
                    warn!(source_id = %self.source_id, row = row_number, "Skipping unreadable row: {}", e);
                    continue;
                }
            };

            let lookup = |aliases: &[&str]| {
                aliases.iter().find_map(|alias| {
                    headers
                        .iter()
                        .position(|h| h.as_str() == *alias)
                        .and_then(|column| record.get(column))
                        .and_then(non_blank)
                })
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

impl SourceAdapter for CsvAdapter {
    fn source_id(&self) -> &str {
        &self.source_id
    }

    fn asset(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> Result<Vec<ObservedIncident>> {
        let file = std::fs::File::open(&self.path)?;
        let observations = self.parse(file)?;
        debug!(
            source_id = %self.source_id,
            path = %self.path.display(),
            rows = observations.len(),
            "Read CSV source"
        );
        Ok(observations)
    }
}
