//! Report catalog: descriptors and the sources that produce them

mod descriptor;
mod file;
mod http;
mod record;

pub use descriptor::DocumentDescriptor;
pub use file::JsonFileCatalogSource;
pub use http::HttpCatalogSource;
pub use record::{BiopsyNumber, CatalogRecord, into_descriptors, parse_records};

use log::{error, info};
use serde::{Deserialize, Serialize};

/// How the patient key handed to a catalog source is interpreted
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum CatalogMode {
    /// The key is an access token exchanged for the patient identifier
    #[default]
    AuthToken,
    /// The key is the patient identifier (RUT) itself
    DirectRut,
}

impl CatalogMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            CatalogMode::AuthToken => "auth_token",
            CatalogMode::DirectRut => "direct_rut",
        }
    }
}

/// Errors from catalog sources
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("catalog request failed: {0}")]
    Network(#[from] reqwest::Error),

    #[error("catalog backend answered {status} for {url}")]
    Status { status: u16, url: String },

    #[error("access rejected: {reason}")]
    AccessRejected { reason: String },

    #[error("malformed catalog payload: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("cannot read catalog file: {0}")]
    Io(#[from] std::io::Error),
}

/// One-shot read of the ordered report list for a patient.
pub trait CatalogSource {
    fn fetch(&self, patient_key: &str) -> Result<Vec<DocumentDescriptor>, CatalogError>;
}

/// Fetch a catalog, mapping every failure to the empty-catalog state.
pub fn load_catalog_or_empty(source: &dyn CatalogSource, patient_key: &str) -> Vec<DocumentDescriptor> {
    match source.fetch(patient_key) {
        Ok(items) => {
            info!("Catalog loaded with {} report(s)", items.len());
            items
        }
        Err(e) => {
            error!("Failed to load catalog: {e}");
            Vec::new()
        }
    }
}
