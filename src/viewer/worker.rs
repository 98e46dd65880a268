//! Render worker - runs in separate thread(s)

use std::sync::Arc;
use std::sync::atomic::AtomicU64;

use flume::{Receiver, Sender};
use log::debug;

use super::request::{RenderRequest, RenderResponse};
use super::task::{CancelToken, RenderTask, TaskContext};

/// Main worker function - runs in a dedicated thread.
///
/// Tasks are processed one at a time, so a worker never holds more than one
/// open document handle.
#[expect(
    clippy::needless_pass_by_value,
    reason = "Values moved into thread, need ownership"
)]
pub fn render_worker(
    requests: Receiver<RenderRequest>,
    responses: Sender<RenderResponse>,
    ctx: TaskContext,
    active: Arc<AtomicU64>,
) {
    for request in requests {
        match request {
            RenderRequest::Document {
                generation,
                descriptor,
                scale,
            } => {
                let token = CancelToken::new(generation, Arc::clone(&active));
                let mut task = RenderTask::new(descriptor, scale, token);
                let state = task.run(&ctx, &responses);
                debug!("Worker finished render {generation} as {state:?}");
            }
            RenderRequest::Shutdown => break,
        }
    }
    debug!("Render worker stopped");
}
