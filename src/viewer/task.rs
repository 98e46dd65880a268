//! Render task - one cancellable load-and-rasterize pass over a document

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use flume::Sender;
use log::{debug, info, warn};

use crate::catalog::DocumentDescriptor;

use super::cache::{CacheKey, RenderCache, RenderedPages};
use super::decoder::DocumentDecoder;
use super::request::{Generation, RenderResponse, ViewerFault};
use super::source::DocumentSource;
use super::types::{PageViewport, Surface, TaskState};

/// Compares a task's generation against the session's published one.
///
/// The session stores every new generation into the shared cell before it
/// submits the next task, so a mismatch means the task has been superseded
/// or the session disposed.
#[derive(Clone, Debug)]
pub struct CancelToken {
    generation: Generation,
    active: Arc<AtomicU64>,
}

impl CancelToken {
    #[must_use]
    pub fn new(generation: Generation, active: Arc<AtomicU64>) -> Self {
        Self { generation, active }
    }

    #[must_use]
    pub fn generation(&self) -> Generation {
        self.generation
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.active.load(Ordering::Acquire) != self.generation.value()
    }
}

/// Collaborators a task needs, shared by every worker of a session
#[derive(Clone)]
pub struct TaskContext {
    pub source: Arc<dyn DocumentSource>,
    pub decoder: Arc<dyn DocumentDecoder>,
    pub cache: Arc<Mutex<RenderCache>>,
}

enum Interrupt {
    Cancelled,
    Failed(ViewerFault),
}

impl From<ViewerFault> for Interrupt {
    fn from(e: ViewerFault) -> Self {
        Self::Failed(e)
    }
}

/// One cancellable unit of work: resolve a document, rasterize every page at
/// a fixed scale, and report each surface in page order.
pub struct RenderTask {
    descriptor: Arc<DocumentDescriptor>,
    scale: f32,
    token: CancelToken,
    state: TaskState,
}

impl RenderTask {
    #[must_use]
    pub fn new(descriptor: Arc<DocumentDescriptor>, scale: f32, token: CancelToken) -> Self {
        Self {
            descriptor,
            scale,
            token,
            state: TaskState::Pending,
        }
    }

    #[must_use]
    pub fn state(&self) -> TaskState {
        self.state
    }

    #[must_use]
    pub fn generation(&self) -> Generation {
        self.token.generation()
    }

    /// Run to a terminal state.
    ///
    /// Cancellation is reported as `Cancelled`, never as `Failed`; a failure
    /// noticed after the task was superseded is reported as cancellation too.
    pub fn run(&mut self, ctx: &TaskContext, out: &Sender<RenderResponse>) -> TaskState {
        let generation = self.generation();
        info!(
            "Render {generation} of {} at scale {:.2} started",
            self.descriptor.id, self.scale
        );

        self.state = match self.execute(ctx, out) {
            Ok(()) => TaskState::Completed,
            Err(Interrupt::Failed(error)) if !self.token.is_cancelled() => {
                warn!("Render {generation} of {} failed: {error}", self.descriptor.id);
                let _ = out.send(RenderResponse::Failed { generation, error });
                TaskState::Failed
            }
            Err(_) => {
                debug!("Render {generation} of {} cancelled", self.descriptor.id);
                let _ = out.send(RenderResponse::Cancelled(generation));
                TaskState::Cancelled
            }
        };
        self.state
    }

    fn checkpoint(&self) -> Result<(), Interrupt> {
        if self.token.is_cancelled() {
            Err(Interrupt::Cancelled)
        } else {
            Ok(())
        }
    }

    fn send(&self, out: &Sender<RenderResponse>, response: RenderResponse) -> Result<(), Interrupt> {
        // A closed channel means the session is gone
        out.send(response).map_err(|_| Interrupt::Cancelled)
    }

    fn execute(&mut self, ctx: &TaskContext, out: &Sender<RenderResponse>) -> Result<(), Interrupt> {
        let generation = self.generation();
        self.checkpoint()?;
        self.state = TaskState::Loading;
        self.send(out, RenderResponse::Loading(generation))?;

        let key = CacheKey::new(&self.descriptor.source_reference, self.scale);
        let cached = ctx
            .cache
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(&key);
        if let Some(pages) = cached {
            debug!("Render {generation} served from cache");
            return self.deliver_cached(&pages, out);
        }

        let bytes = ctx.source.fetch(&self.descriptor.source_reference)?;
        self.checkpoint()?;

        // The handle lives only inside this scope; every early return drops it
        // before `run` reports the outcome.
        let mut doc = ctx.decoder.open(bytes)?;
        let page_count = doc.page_count();
        if page_count == 0 {
            return Err(ViewerFault::decode("document has no pages").into());
        }

        self.state = TaskState::Rendering;
        self.send(
            out,
            RenderResponse::Opened {
                generation,
                page_count,
            },
        )?;

        let mut rendered = Vec::with_capacity(page_count);
        for index in 0..page_count {
            self.checkpoint()?;
            let viewport = PageViewport::compute(doc.page_size(index)?, self.scale);
            let raster = doc.rasterize(index, &viewport)?;
            let surface = Arc::new(Surface {
                page: index + 1,
                width_px: raster.width_px,
                height_px: raster.height_px,
                scale: self.scale,
                pixels: raster.pixels,
            });

            self.checkpoint()?;
            self.send(
                out,
                RenderResponse::Page {
                    generation,
                    surface: Arc::clone(&surface),
                },
            )?;
            rendered.push(surface);
        }
        drop(doc);

        ctx.cache
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(key, rendered);

        self.send(
            out,
            RenderResponse::Completed {
                generation,
                page_count,
            },
        )
    }

    fn deliver_cached(
        &mut self,
        pages: &RenderedPages,
        out: &Sender<RenderResponse>,
    ) -> Result<(), Interrupt> {
        let generation = self.generation();
        self.state = TaskState::Rendering;
        self.send(
            out,
            RenderResponse::Opened {
                generation,
                page_count: pages.len(),
            },
        )?;

        for surface in pages.iter() {
            self.checkpoint()?;
            self.send(
                out,
                RenderResponse::Page {
                    generation,
                    surface: Arc::clone(surface),
                },
            )?;
        }

        self.send(
            out,
            RenderResponse::Completed {
                generation,
                page_count: pages.len(),
            },
        )
    }
}
