//! Fake collaborators for driving sessions without a document engine or network

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use flume::{Receiver, Sender};

use crate::catalog::DocumentDescriptor;
use crate::viewer::{
    DecodedDocument, DocumentDecoder, DocumentSource, PageViewport, PresentationSink, Raster,
    Surface, ViewerFault,
};

/// Page size, in document units, of every fake page
pub const FAKE_PAGE_SIZE: (f32, f32) = (100.0, 50.0);

/// Bytes [`FakeDecoder`] understands as a document with `pages` pages
#[must_use]
pub fn fake_document(pages: usize) -> Vec<u8> {
    format!("pages={pages}").into_bytes()
}

/// Counts decoder handles opened and still alive
#[derive(Clone, Debug, Default)]
pub struct HandleCounter {
    open: Arc<AtomicUsize>,
    total: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

impl HandleCounter {
    /// Handles currently open
    #[must_use]
    pub fn open(&self) -> usize {
        self.open.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn opened_total(&self) -> usize {
        self.total.load(Ordering::SeqCst)
    }

    /// Most handles open at the same time
    #[must_use]
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    fn acquire(&self) {
        let now = self.open.fetch_add(1, Ordering::SeqCst) + 1;
        self.total.fetch_add(1, Ordering::SeqCst);
        self.peak.fetch_max(now, Ordering::SeqCst);
    }

    fn release(&self) {
        self.open.fetch_sub(1, Ordering::SeqCst);
    }
}

type RasterHook = Arc<dyn Fn(usize) + Send + Sync>;

/// Decoder for [`fake_document`] bytes; anything else fails to decode
#[derive(Clone, Default)]
pub struct FakeDecoder {
    handles: HandleCounter,
    on_rasterize: Option<RasterHook>,
}

impl FakeDecoder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn handles(&self) -> HandleCounter {
        self.handles.clone()
    }

    /// Run `hook` with the 0-based page index before each rasterization
    #[must_use]
    pub fn on_rasterize(mut self, hook: impl Fn(usize) + Send + Sync + 'static) -> Self {
        self.on_rasterize = Some(Arc::new(hook));
        self
    }
}

impl DocumentDecoder for FakeDecoder {
    fn open(&self, bytes: Vec<u8>) -> Result<Box<dyn DecodedDocument>, ViewerFault> {
        let pages = std::str::from_utf8(&bytes)
            .ok()
            .and_then(|s| s.strip_prefix("pages="))
            .and_then(|n| n.trim().parse::<usize>().ok())
            .ok_or_else(|| ViewerFault::decode("not a fake document"))?;

        self.handles.acquire();
        Ok(Box::new(FakeDocument {
            pages,
            handles: self.handles.clone(),
            on_rasterize: self.on_rasterize.clone(),
        }))
    }
}

struct FakeDocument {
    pages: usize,
    handles: HandleCounter,
    on_rasterize: Option<RasterHook>,
}

impl DecodedDocument for FakeDocument {
    fn page_count(&self) -> usize {
        self.pages
    }

    fn page_size(&mut self, index: usize) -> Result<(f32, f32), ViewerFault> {
        if index >= self.pages {
            return Err(ViewerFault::decode(format!("no page {index}")));
        }
        Ok(FAKE_PAGE_SIZE)
    }

    fn rasterize(&mut self, index: usize, viewport: &PageViewport) -> Result<Raster, ViewerFault> {
        if let Some(hook) = &self.on_rasterize {
            hook(index);
        }
        let len = viewport.width_px as usize * viewport.height_px as usize * 3;
        Ok(Raster {
            width_px: viewport.width_px,
            height_px: viewport.height_px,
            pixels: vec![index as u8; len],
        })
    }
}

impl Drop for FakeDocument {
    fn drop(&mut self) {
        self.handles.release();
    }
}

/// In-memory byte source with optional gates that hold a fetch until released
#[derive(Default)]
pub struct MemorySource {
    entries: HashMap<String, Result<Vec<u8>, String>>,
    gates: HashMap<String, Receiver<()>>,
    log: Arc<Mutex<Vec<String>>>,
}

impl MemorySource {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_document(mut self, reference: &str, bytes: Vec<u8>) -> Self {
        self.entries.insert(reference.to_string(), Ok(bytes));
        self
    }

    #[must_use]
    pub fn with_unreachable(mut self, reference: &str, detail: &str) -> Self {
        self.entries
            .insert(reference.to_string(), Err(detail.to_string()));
        self
    }

    /// Make fetches of `reference` block until the returned sender sends
    /// (one fetch per message) or is dropped.
    #[must_use]
    pub fn gated(mut self, reference: &str) -> (Self, Sender<()>) {
        let (tx, rx) = flume::unbounded();
        self.gates.insert(reference.to_string(), rx);
        (self, tx)
    }

    /// References fetched so far, in order
    #[must_use]
    pub fn fetch_log(&self) -> Arc<Mutex<Vec<String>>> {
        Arc::clone(&self.log)
    }
}

impl DocumentSource for MemorySource {
    fn fetch(&self, reference: &str) -> Result<Vec<u8>, ViewerFault> {
        self.log
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(reference.to_string());

        if let Some(gate) = self.gates.get(reference) {
            let _ = gate.recv();
        }

        match self.entries.get(reference) {
            Some(Ok(bytes)) => Ok(bytes.clone()),
            Some(Err(detail)) => Err(ViewerFault::unreachable(reference, detail.clone())),
            None => Err(ViewerFault::unreachable(reference, "unknown reference")),
        }
    }
}

/// What a [`RecordingSink`] saw
#[derive(Clone, Debug, PartialEq)]
pub enum SinkEvent {
    CatalogLoaded(Vec<String>),
    SelectionChanged { index: usize, id: String },
    LoadStarted(String),
    PageRendered { page: usize, width_px: u32, height_px: u32 },
    LoadFailed(ViewerFault),
    RenderCompleted(usize),
}

/// Sink that records every call; clones share the same log
#[derive(Clone, Default)]
pub struct RecordingSink {
    events: Arc<Mutex<Vec<SinkEvent>>>,
    surfaces: Arc<Mutex<Vec<Arc<Surface>>>>,
}

impl RecordingSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn events(&self) -> Vec<SinkEvent> {
        self.events
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    #[must_use]
    pub fn surfaces(&self) -> Vec<Arc<Surface>> {
        self.surfaces
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    /// Page numbers delivered, in delivery order
    #[must_use]
    pub fn pages(&self) -> Vec<usize> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                SinkEvent::PageRendered { page, .. } => Some(page),
                _ => None,
            })
            .collect()
    }

    #[must_use]
    pub fn failures(&self) -> Vec<ViewerFault> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                SinkEvent::LoadFailed(fault) => Some(fault),
                _ => None,
            })
            .collect()
    }

    pub fn clear(&self) {
        self.events
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clear();
        self.surfaces
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clear();
    }

    fn push(&self, event: SinkEvent) {
        self.events
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(event);
    }
}

impl PresentationSink for RecordingSink {
    fn catalog_loaded(&mut self, catalog: &[Arc<DocumentDescriptor>]) {
        self.push(SinkEvent::CatalogLoaded(
            catalog.iter().map(|d| d.id.clone()).collect(),
        ));
    }

    fn selection_changed(&mut self, index: usize, descriptor: &DocumentDescriptor) {
        self.push(SinkEvent::SelectionChanged {
            index,
            id: descriptor.id.clone(),
        });
    }

    fn load_started(&mut self, descriptor: &DocumentDescriptor) {
        self.push(SinkEvent::LoadStarted(descriptor.id.clone()));
    }

    fn page_rendered(&mut self, surface: &Arc<Surface>) {
        self.surfaces
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(Arc::clone(surface));
        self.push(SinkEvent::PageRendered {
            page: surface.page,
            width_px: surface.width_px,
            height_px: surface.height_px,
        });
    }

    fn load_failed(&mut self, error: &ViewerFault) {
        self.push(SinkEvent::LoadFailed(error.clone()));
    }

    fn render_completed(&mut self, page_count: usize) {
        self.push(SinkEvent::RenderCompleted(page_count));
    }
}
