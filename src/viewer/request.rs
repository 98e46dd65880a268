//! Render request and response types

use std::sync::Arc;

use crate::catalog::DocumentDescriptor;

use super::types::Surface;

/// Monotonic counter identifying the authoritative render request
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Generation(pub u64);

impl Generation {
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }

    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for Generation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Request sent to render workers
#[derive(Debug)]
pub enum RenderRequest {
    /// Load a document and rasterize all of its pages
    Document {
        generation: Generation,
        descriptor: Arc<DocumentDescriptor>,
        scale: f32,
    },

    /// Shutdown the worker
    Shutdown,
}

/// Errors a render task reports to the session
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ViewerFault {
    /// The byte source could not produce the document
    #[error("document {reference} unreachable: {detail}")]
    ReferenceUnreachable { reference: String, detail: String },

    /// Bytes were retrieved but are not a usable document
    #[error("document could not be decoded: {detail}")]
    DecodeFailed { detail: String },
}

impl ViewerFault {
    pub fn unreachable(reference: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::ReferenceUnreachable {
            reference: reference.into(),
            detail: detail.into(),
        }
    }

    pub fn decode(detail: impl Into<String>) -> Self {
        Self::DecodeFailed {
            detail: detail.into(),
        }
    }
}

/// Response from render workers
#[derive(Debug)]
pub enum RenderResponse {
    /// A worker picked the task up and is resolving the reference
    Loading(Generation),

    /// Document handle resolved; pages follow in order
    Opened { generation: Generation, page_count: usize },

    /// One rasterized page
    Page {
        generation: Generation,
        surface: Arc<Surface>,
    },

    /// Every page was delivered
    Completed { generation: Generation, page_count: usize },

    /// Resolution or decoding failed
    Failed {
        generation: Generation,
        error: ViewerFault,
    },

    /// The task noticed it was superseded and tore down
    Cancelled(Generation),
}

impl RenderResponse {
    /// Generation the response belongs to
    #[must_use]
    pub fn generation(&self) -> Generation {
        match self {
            Self::Loading(generation)
            | Self::Opened { generation, .. }
            | Self::Page { generation, .. }
            | Self::Completed { generation, .. }
            | Self::Failed { generation, .. }
            | Self::Cancelled(generation) => *generation,
        }
    }
}
