//! Document byte sources

use std::path::{Path, PathBuf};
use std::time::Duration;

use log::debug;
use reqwest::blocking::Client;

use super::request::ViewerFault;

/// Resolves an opaque document reference into document bytes.
///
/// Called from render worker threads, hence `Send + Sync`.
pub trait DocumentSource: Send + Sync {
    fn fetch(&self, reference: &str) -> Result<Vec<u8>, ViewerFault>;
}

/// Reads documents from the filesystem, optionally relative to a root
#[derive(Clone, Debug, Default)]
pub struct FileDocumentSource {
    root: Option<PathBuf>,
}

impl FileDocumentSource {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
        }
    }

    fn resolve(&self, reference: &str) -> PathBuf {
        let raw = reference.strip_prefix("file://").unwrap_or(reference);
        let path = Path::new(raw);
        match &self.root {
            Some(root) if path.is_relative() => root.join(path),
            _ => path.to_path_buf(),
        }
    }
}

impl DocumentSource for FileDocumentSource {
    fn fetch(&self, reference: &str) -> Result<Vec<u8>, ViewerFault> {
        let path = self.resolve(reference);
        debug!("Reading document from {path:?}");
        std::fs::read(&path).map_err(|e| ViewerFault::unreachable(reference, e.to_string()))
    }
}

/// Downloads documents over HTTP(S)
pub struct HttpDocumentSource {
    client: Client,
}

impl HttpDocumentSource {
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

impl DocumentSource for HttpDocumentSource {
    fn fetch(&self, reference: &str) -> Result<Vec<u8>, ViewerFault> {
        debug!("GET {reference}");
        let response = self
            .client
            .get(reference)
            .send()
            .map_err(|e| ViewerFault::unreachable(reference, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ViewerFault::unreachable(
                reference,
                format!("server answered {status}"),
            ));
        }

        response
            .bytes()
            .map(|b| b.to_vec())
            .map_err(|e| ViewerFault::unreachable(reference, e.to_string()))
    }
}

/// Sends `http://` and `https://` locators to the HTTP source and everything
/// else to the filesystem.
pub struct LocatorSource {
    http: HttpDocumentSource,
    files: FileDocumentSource,
}

impl LocatorSource {
    #[must_use]
    pub fn new(http: HttpDocumentSource, files: FileDocumentSource) -> Self {
        Self { http, files }
    }
}

impl DocumentSource for LocatorSource {
    fn fetch(&self, reference: &str) -> Result<Vec<u8>, ViewerFault> {
        if reference.starts_with("http://") || reference.starts_with("https://") {
            self.http.fetch(reference)
        } else {
            self.files.fetch(reference)
        }
    }
}
