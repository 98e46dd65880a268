//! Backend wire format for report listings

use log::warn;
use serde::Deserialize;

use super::descriptor::DocumentDescriptor;

/// Biopsy numbers come back as text or as bare integers depending on the
/// column type of the reporting database.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum BiopsyNumber {
    Text(String),
    Number(i64),
}

impl BiopsyNumber {
    fn into_string(self) -> String {
        match self {
            Self::Text(s) => s.trim().to_string(),
            Self::Number(n) => n.to_string(),
        }
    }
}

/// One entry of `GET informes-list/{rut}/`
#[derive(Clone, Debug, Deserialize)]
pub struct CatalogRecord {
    #[serde(default)]
    pub id: Option<u64>,
    pub numero_biopsia: BiopsyNumber,
    #[serde(default)]
    pub nombre: Option<String>,
    #[serde(default)]
    pub rut: Option<String>,
    #[serde(default)]
    pub servicio: Option<String>,
    #[serde(default)]
    pub medico: Option<String>,
    #[serde(default)]
    pub fecha: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

impl CatalogRecord {
    /// Patient identifier with surrounding whitespace removed
    #[must_use]
    pub fn patient_id(&self) -> &str {
        self.rut.as_deref().map_or("", str::trim)
    }

    /// Convert into a descriptor. Records without a document URL cannot be
    /// viewed and yield `None`.
    #[must_use]
    pub fn into_descriptor(self) -> Option<DocumentDescriptor> {
        let patient_id = self.patient_id().to_string();
        let id = self.numero_biopsia.into_string();
        let Some(url) = self.url.filter(|u| !u.trim().is_empty()) else {
            warn!("Skipping report {id}: no document reference");
            return None;
        };

        Some(DocumentDescriptor {
            id,
            patient_name: self.nombre.unwrap_or_default(),
            patient_id,
            date: self.fecha.unwrap_or_default(),
            service: self.servicio.filter(|s| !s.is_empty()),
            physician: self.medico.filter(|s| !s.is_empty()),
            source_reference: url,
        })
    }
}

/// Parse a JSON array of records into descriptors, preserving order.
pub fn parse_records(json: &str) -> Result<Vec<CatalogRecord>, serde_json::Error> {
    serde_json::from_str(json)
}

/// Convert records into descriptors, dropping the ones that cannot be viewed.
#[must_use]
pub fn into_descriptors(records: Vec<CatalogRecord>) -> Vec<DocumentDescriptor> {
    records
        .into_iter()
        .filter_map(CatalogRecord::into_descriptor)
        .collect()
}
