//! Global id fingerprinting
//!
//! A global id is the SHA-256 of a length-prefixed encoding of `(source_id, source_key)`, so
//! `("ab", "c")` and `("a", "bc")` never collide and the value is identical in every process.

use crate::models::ObservedIncident;
use crate::{Error, Result};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Domain separator mixed into every global id
const GLOBAL_ID_DOMAIN: &[u8] = b"incidex.global-id.v1";

/// Prefix of keys synthesized for rows without a source key
pub const SYNTHETIC_KEY_PREFIX: &str = "auto-";

/// Deterministic global id for an incident
pub fn fingerprint(source_id: &str, source_key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(GLOBAL_ID_DOMAIN);
    for part in [source_id, source_key] {
        hasher.update((part.len() as u64).to_be_bytes());
        hasher.update(part.as_bytes());
    }
    format!("{:x}", hasher.finalize())
}

/// SHA-256 of a source asset's content, read in 1MB chunks
pub fn asset_fingerprint(path: &Path) -> Result<String> {
    let mut file = File::open(path).map_err(|e| {
        Error::Io(std::io::Error::new(
            e.kind(),
            format!("Failed to open {} for hashing: {}", path.display(), e),
        ))
    })?;

    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; 1024 * 1024];

    loop {
        let bytes_read = file.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

/// Synthesizes stable keys for rows that carry no source key
///
/// Keys derive from the row's content plus the number of identical rows seen before it in the
/// same read, so unrelated keyless rows never share a key and reordering distinct rows does
/// not change their ids.
#[derive(Debug, Default)]
pub struct KeySynthesizer {
    seen: HashMap<String, usize>,
}

impl KeySynthesizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Key for `observation`, which must not already carry one
    pub fn synthesize(&mut self, observation: &ObservedIncident) -> String {
        let mut hasher = Sha256::new();
        let parts = [
            observation.description.clone().unwrap_or_default(),
            observation.product.clone().unwrap_or_default(),
            observation.feature.clone().unwrap_or_default(),
            observation
                .incident_date
                .map(|d| d.to_string())
                .unwrap_or_default(),
        ];
        for part in &parts {
            hasher.update((part.len() as u64).to_be_bytes());
            hasher.update(part.as_bytes());
        }
        let content = format!("{:x}", hasher.finalize());

        let occurrence = self.seen.entry(content.clone()).or_insert(0);
        let key = format!("{}{}-{}", SYNTHETIC_KEY_PREFIX, &content[..16], occurrence);
        *occurrence += 1;
        key
    }

    /// Fill in `source_key` if the observation has none
    pub fn ensure_key(&mut self, observation: &mut ObservedIncident) {
        let missing = observation
            .source_key
            .as_deref()
            .map_or(true, |key| key.trim().is_empty());
        if missing {
            observation.source_key = Some(self.synthesize(observation));
        }
    }
}
