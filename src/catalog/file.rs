//! Catalog source reading an exported report listing from disk

use std::fs;
use std::path::PathBuf;

use log::debug;

use super::record::parse_records;
use super::{CatalogError, CatalogSource, DocumentDescriptor};

/// Reads a JSON listing in the backend's wire format and keeps the records of
/// the requested patient. An empty key keeps every record.
pub struct JsonFileCatalogSource {
    path: PathBuf,
}

impl JsonFileCatalogSource {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl CatalogSource for JsonFileCatalogSource {
    fn fetch(&self, patient_key: &str) -> Result<Vec<DocumentDescriptor>, CatalogError> {
        let content = fs::read_to_string(&self.path)?;
        let records = parse_records(&content)?;
        let key = patient_key.trim();
        debug!("Read {} record(s) from {:?}", records.len(), self.path);

        Ok(records
            .into_iter()
            .filter(|r| key.is_empty() || r.patient_id() == key)
            .filter_map(|r| r.into_descriptor())
            .collect())
    }
}
