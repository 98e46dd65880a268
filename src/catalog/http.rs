//! Catalog source backed by the reports HTTP backend

use std::time::Duration;

use log::{debug, info};
use reqwest::Url;
use reqwest::blocking::Client;
use serde::Deserialize;

use super::record::{into_descriptors, parse_records};
use super::{CatalogError, CatalogMode, CatalogSource, DocumentDescriptor};

/// Answer of `GET validate-access/?token=...`
#[derive(Debug, Deserialize)]
struct AccessValidation {
    valid: bool,
    #[serde(default)]
    rut: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Fetches the report list from the backend.
///
/// In [`CatalogMode::AuthToken`] the patient key is first exchanged for the
/// patient identifier through the backend's validation endpoint; in
/// [`CatalogMode::DirectRut`] it is used as the identifier directly.
pub struct HttpCatalogSource {
    client: Client,
    api_base: String,
    mode: CatalogMode,
}

impl HttpCatalogSource {
    pub fn new(api_base: &str, mode: CatalogMode, timeout: Duration) -> Result<Self, CatalogError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            mode,
        })
    }

    #[must_use]
    pub fn mode(&self) -> CatalogMode {
        self.mode
    }

    fn listing_url(&self, rut: &str) -> String {
        format!("{}/informes-list/{}/", self.api_base, rut.trim())
    }

    fn validation_url(&self, token: &str) -> Result<Url, CatalogError> {
        let base = format!("{}/validate-access/", self.api_base);
        Url::parse_with_params(&base, &[("token", token)]).map_err(|e| CatalogError::AccessRejected {
            reason: format!("invalid validation url {base}: {e}"),
        })
    }

    fn get_text(&self, url: Url) -> Result<String, CatalogError> {
        debug!("GET {url}");
        let response = self.client.get(url.clone()).send()?;
        let status = response.status();
        if !status.is_success() {
            return Err(CatalogError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        Ok(response.text()?)
    }

    fn exchange_token(&self, token: &str) -> Result<String, CatalogError> {
        let url = self.validation_url(token)?;
        let body = match self.get_text(url) {
            Ok(body) => body,
            Err(CatalogError::Status { status, .. }) => {
                return Err(CatalogError::AccessRejected {
                    reason: format!("token rejected with status {status}"),
                });
            }
            Err(e) => return Err(e),
        };

        let validation: AccessValidation = serde_json::from_str(&body)?;
        match validation {
            AccessValidation {
                valid: true,
                rut: Some(rut),
                ..
            } if !rut.trim().is_empty() => Ok(rut.trim().to_string()),
            AccessValidation { error, .. } => Err(CatalogError::AccessRejected {
                reason: error.unwrap_or_else(|| "token not valid".to_string()),
            }),
        }
    }
}

impl CatalogSource for HttpCatalogSource {
    fn fetch(&self, patient_key: &str) -> Result<Vec<DocumentDescriptor>, CatalogError> {
        let rut = match self.mode {
            CatalogMode::AuthToken => self.exchange_token(patient_key)?,
            CatalogMode::DirectRut => patient_key.trim().to_string(),
        };

        let listing = self.listing_url(&rut);
        let url = Url::parse(&listing).map_err(|e| CatalogError::AccessRejected {
            reason: format!("invalid listing url {listing}: {e}"),
        })?;
        let body = self.get_text(url)?;
        let descriptors = into_descriptors(parse_records(&body)?);
        info!(
            "Fetched {} report(s) for patient via {}",
            descriptors.len(),
            self.mode.as_str()
        );
        Ok(descriptors)
    }
}
