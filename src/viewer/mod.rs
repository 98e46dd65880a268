//! Document viewer session and its render pipeline

mod cache;
mod decoder;
mod request;
mod scale;
mod session;
mod sink;
mod source;
mod state;
mod task;
mod types;
mod worker;

pub use cache::{CacheKey, RenderCache, RenderedPages};
#[cfg(feature = "pdf")]
pub use decoder::MupdfDecoder;
pub use decoder::{DecodedDocument, DocumentDecoder, Raster};
pub use request::{Generation, RenderRequest, RenderResponse, ViewerFault};
pub use scale::ScalePolicy;
pub use session::{SessionConfig, ViewerSession};
pub use sink::PresentationSink;
pub use source::{DocumentSource, FileDocumentSource, HttpDocumentSource, LocatorSource};
pub use state::{Command, Effect, SessionState};
pub use task::{CancelToken, RenderTask, TaskContext};
pub use types::*;

pub use crate::catalog::DocumentDescriptor;

/// Largest surface side in pixels; bigger pages are rendered at reduced magnification
pub const MAX_SURFACE_DIMENSION: f32 = 8192.0;

/// One worker keeps a session at one open document handle
pub const DEFAULT_WORKERS: usize = 1;

pub const DEFAULT_CACHE_DOCUMENTS: usize = 4;

pub const DEFAULT_SCALE: f32 = 1.0;
