//! Viewer session - owns selection, scale and the active render

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use flume::{Receiver, RecvTimeoutError, Sender};
use log::{debug, info};

use crate::catalog::DocumentDescriptor;

use super::cache::RenderCache;
use super::decoder::DocumentDecoder;
use super::request::{Generation, RenderRequest, RenderResponse};
use super::sink::PresentationSink;
use super::source::DocumentSource;
use super::state::{Command, Effect, SessionState};
use super::task::TaskContext;
use super::types::TaskState;
use super::worker::render_worker;
use super::{DEFAULT_CACHE_DOCUMENTS, DEFAULT_SCALE, DEFAULT_WORKERS};

/// Tunables for a session
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SessionConfig {
    /// Worker threads; each holds at most one open document
    pub workers: usize,
    /// Completed document renders kept in memory
    pub cache_documents: usize,
    /// Scale used until the first `set_scale`
    pub initial_scale: f32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            cache_documents: DEFAULT_CACHE_DOCUMENTS,
            initial_scale: DEFAULT_SCALE,
        }
    }
}

/// Browses a catalog of documents and renders the selected one.
///
/// Loading and rasterization run on worker threads. Their results are applied
/// by [`ViewerSession::poll_responses`] (or [`ViewerSession::run_until_settled`])
/// on the thread that owns the session, and only results of the current
/// generation reach the sink.
pub struct ViewerSession {
    state: SessionState,
    request_tx: Sender<RenderRequest>,
    response_rx: Receiver<RenderResponse>,
    active: Arc<AtomicU64>,
    cache: Arc<Mutex<RenderCache>>,
    sink: Box<dyn PresentationSink>,
    num_workers: usize,
    page_count: Option<usize>,
}

impl ViewerSession {
    /// Create a new session with default configuration
    #[must_use]
    pub fn new(
        source: Arc<dyn DocumentSource>,
        decoder: Arc<dyn DocumentDecoder>,
        sink: Box<dyn PresentationSink>,
    ) -> Self {
        Self::with_config(SessionConfig::default(), source, decoder, sink)
    }

    /// Create a new session with custom configuration
    #[must_use]
    pub fn with_config(
        config: SessionConfig,
        source: Arc<dyn DocumentSource>,
        decoder: Arc<dyn DocumentDecoder>,
        sink: Box<dyn PresentationSink>,
    ) -> Self {
        let cache = Arc::new(Mutex::new(RenderCache::new(config.cache_documents)));
        let state = SessionState::new(config.initial_scale);
        let active = Arc::new(AtomicU64::new(state.generation.value()));

        // flume gives us an MPMC request queue so several workers can pull
        // from the same channel.
        let (request_tx, request_rx) = flume::unbounded();
        let (response_tx, response_rx) = flume::unbounded();

        let ctx = TaskContext {
            source,
            decoder,
            cache: Arc::clone(&cache),
        };
        let num_workers = config.workers.max(1);
        for _ in 0..num_workers {
            let rx = request_rx.clone();
            let tx = response_tx.clone();
            let ctx = ctx.clone();
            let active = Arc::clone(&active);

            std::thread::spawn(move || {
                render_worker(rx, tx, ctx, active);
            });
        }

        Self {
            state,
            request_tx,
            response_rx,
            active,
            cache,
            sink,
            num_workers,
            page_count: None,
        }
    }

    /// Replace the catalog and start rendering its first entry.
    ///
    /// An empty catalog is a valid state: nothing is selected and nothing renders.
    pub fn load_catalog(&mut self, items: Vec<DocumentDescriptor>) {
        self.apply_command(Command::LoadCatalog(items));
    }

    /// Select a catalog entry. Out-of-range indices are ignored.
    pub fn select(&mut self, index: usize) {
        self.apply_command(Command::Select(index));
    }

    /// Change the render scale. Non-positive and unchanged values are ignored.
    pub fn set_scale(&mut self, scale: f32) {
        self.apply_command(Command::SetScale(scale));
    }

    /// Cancel the active render and stop the workers.
    ///
    /// Idempotent. No sink call happens after this returns, even if a worker is
    /// still finishing a load in the background.
    pub fn dispose(&mut self) {
        self.apply_command(Command::Dispose);
        self.response_rx.drain().for_each(drop);
    }

    fn apply_command(&mut self, cmd: Command) {
        let effects = self.state.apply(cmd);
        self.execute_effects(effects);
    }

    fn execute_effects(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::CancelActive => {
                    self.page_count = None;
                    self.active
                        .store(self.state.generation.value(), Ordering::Release);
                }

                Effect::NotifyCatalogLoaded => {
                    info!("Catalog replaced with {} document(s)", self.state.catalog.len());
                    self.sink.catalog_loaded(&self.state.catalog);
                }

                Effect::NotifySelectionChanged(index) => {
                    if let Some(descriptor) = self.state.catalog.get(index) {
                        self.sink.selection_changed(index, descriptor);
                    }
                }

                Effect::StartRender => {
                    self.start_render();
                }

                Effect::StopWorkers => {
                    self.shutdown_workers();
                }
            }
        }
    }

    fn start_render(&mut self) {
        let Some(descriptor) = self.state.selected_descriptor().cloned() else {
            return;
        };
        let generation = self.state.generation;
        debug!(
            "Submitting render {generation} for {} at scale {:.2}",
            descriptor.id, self.state.scale
        );

        self.sink.load_started(&descriptor);
        let _ = self.request_tx.send(RenderRequest::Document {
            generation,
            descriptor,
            scale: self.state.scale,
        });
    }

    /// Apply every response that is ready, returning how many reached the sink
    pub fn poll_responses(&mut self) -> usize {
        let mut forwarded = 0;
        while let Ok(response) = self.response_rx.try_recv() {
            if self.handle_response(response) {
                forwarded += 1;
            }
        }
        forwarded
    }

    /// Pump responses until the current render is finished, there is nothing
    /// to render, or `timeout` elapses. Returns whether the session settled.
    pub fn run_until_settled(&mut self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            self.poll_responses();
            if self.state.is_settled() {
                return true;
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return false;
            }
            match self.response_rx.recv_timeout(remaining) {
                Ok(response) => {
                    self.handle_response(response);
                }
                Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => {
                    return self.state.is_settled();
                }
            }
        }
    }

    fn handle_response(&mut self, response: RenderResponse) -> bool {
        let generation = response.generation();
        if self.state.disposed || generation != self.state.generation {
            debug!(
                "Dropping response of stale render {generation} (current {})",
                self.state.generation
            );
            return false;
        }

        match response {
            RenderResponse::Loading(_) => {
                self.state.record_progress(generation, TaskState::Loading);
                false
            }
            RenderResponse::Opened { page_count, .. } => {
                self.state.record_progress(generation, TaskState::Rendering);
                self.page_count = Some(page_count);
                false
            }
            RenderResponse::Page { surface, .. } => {
                self.sink.page_rendered(&surface);
                true
            }
            RenderResponse::Completed { page_count, .. } => {
                self.state.record_progress(generation, TaskState::Completed);
                info!("Render {generation} completed with {page_count} page(s)");
                self.sink.render_completed(page_count);
                true
            }
            RenderResponse::Failed { error, .. } => {
                self.state.record_progress(generation, TaskState::Failed);
                self.sink.load_failed(&error);
                true
            }
            RenderResponse::Cancelled(_) => {
                self.state.record_progress(generation, TaskState::Cancelled);
                false
            }
        }
    }

    fn shutdown_workers(&self) {
        for _ in 0..self.num_workers {
            let _ = self.request_tx.send(RenderRequest::Shutdown);
        }
    }

    #[must_use]
    pub fn catalog(&self) -> &[Arc<DocumentDescriptor>] {
        &self.state.catalog
    }

    #[must_use]
    pub fn selected_index(&self) -> Option<usize> {
        self.state.selected
    }

    #[must_use]
    pub fn selected(&self) -> Option<&Arc<DocumentDescriptor>> {
        self.state.selected_descriptor()
    }

    #[must_use]
    pub fn scale(&self) -> f32 {
        self.state.scale
    }

    #[must_use]
    pub fn generation(&self) -> Generation {
        self.state.generation
    }

    /// Progress of the current render, if one was started
    #[must_use]
    pub fn active_state(&self) -> Option<TaskState> {
        self.state.active
    }

    /// Page count of the current document, once its handle is resolved
    #[must_use]
    pub fn page_count(&self) -> Option<usize> {
        self.page_count
    }

    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.state.disposed
    }

    /// Number of completed document renders held in memory
    #[must_use]
    pub fn cached_documents(&self) -> usize {
        self.cache
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }
}

impl Drop for ViewerSession {
    fn drop(&mut self) {
        self.dispose();
    }
}
