//! Presentation sink - the receiving end of session notifications

use std::sync::Arc;

use crate::catalog::DocumentDescriptor;

use super::request::ViewerFault;
use super::types::Surface;

/// Receives session notifications and page surfaces.
///
/// All calls happen on the thread that owns the session. Surfaces and
/// failures from superseded renders are filtered out before they get here.
pub trait PresentationSink {
    /// The catalog was replaced; an empty slice is the "no reports" state
    fn catalog_loaded(&mut self, catalog: &[Arc<DocumentDescriptor>]);

    fn selection_changed(&mut self, index: usize, descriptor: &DocumentDescriptor);

    /// A render of `descriptor` was submitted
    fn load_started(&mut self, descriptor: &DocumentDescriptor);

    /// One page of the current render, in ascending page order
    fn page_rendered(&mut self, surface: &Arc<Surface>);

    /// The current render failed; delivered at most once per render
    fn load_failed(&mut self, error: &ViewerFault);

    fn render_completed(&mut self, page_count: usize);
}
