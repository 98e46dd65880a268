//! Headless presenter writing rendered pages as PNG files

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use image::RgbImage;
use log::{error, info, warn};

use crate::catalog::DocumentDescriptor;
use crate::viewer::{PresentationSink, Surface, ViewerFault};

/// Result of one render as seen by the presenter
#[derive(Clone, Debug, PartialEq)]
pub struct RenderOutcome {
    pub document_id: String,
    pub pages_written: Vec<PathBuf>,
    /// Set once the render finished successfully
    pub page_count: Option<usize>,
    pub failure: Option<String>,
    /// Another render started before this one finished or failed
    pub superseded: bool,
}

#[derive(Default)]
struct PresenterState {
    catalog_size: Option<usize>,
    outcomes: Vec<RenderOutcome>,
}

/// Writes `<out_dir>/<document id>/page-NNN.png` for every delivered page.
///
/// Clones share their state so the caller can keep a handle after moving one
/// into a session.
#[derive(Clone)]
pub struct PngPresenter {
    out_dir: PathBuf,
    state: Arc<Mutex<PresenterState>>,
}

impl PngPresenter {
    #[must_use]
    pub fn new(out_dir: impl Into<PathBuf>) -> Self {
        Self {
            out_dir: out_dir.into(),
            state: Arc::new(Mutex::new(PresenterState::default())),
        }
    }

    /// Renders seen so far, oldest first
    #[must_use]
    pub fn outcomes(&self) -> Vec<RenderOutcome> {
        self.lock().outcomes.clone()
    }

    /// Size of the last catalog, `None` before any catalog arrived
    #[must_use]
    pub fn catalog_size(&self) -> Option<usize> {
        self.lock().catalog_size
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, PresenterState> {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn document_dir(&self, document_id: &str) -> PathBuf {
        self.out_dir.join(sanitize(document_id))
    }
}

/// Keep ids usable as directory names
fn sanitize(id: &str) -> String {
    let cleaned: String = id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "_".to_string()
    } else {
        cleaned
    }
}

fn write_png(surface: &Surface, path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let image = RgbImage::from_raw(surface.width_px, surface.height_px, surface.pixels.clone())
        .ok_or_else(|| {
            anyhow::anyhow!(
                "surface buffer of {} bytes does not match {}x{}",
                surface.pixels.len(),
                surface.width_px,
                surface.height_px
            )
        })?;
    image.save(path)?;
    Ok(())
}

impl PresentationSink for PngPresenter {
    fn catalog_loaded(&mut self, catalog: &[Arc<DocumentDescriptor>]) {
        if catalog.is_empty() {
            warn!("No reports available for this patient");
        }
        self.lock().catalog_size = Some(catalog.len());
    }

    fn selection_changed(&mut self, index: usize, descriptor: &DocumentDescriptor) {
        info!("Selected report {} ({descriptor})", index + 1);
    }

    fn load_started(&mut self, descriptor: &DocumentDescriptor) {
        let mut state = self.lock();
        if let Some(previous) = state.outcomes.last_mut() {
            previous.superseded = previous.page_count.is_none() && previous.failure.is_none();
        }
        state.outcomes.push(RenderOutcome {
            document_id: descriptor.id.clone(),
            pages_written: Vec::new(),
            page_count: None,
            failure: None,
            superseded: false,
        });
    }

    fn page_rendered(&mut self, surface: &Arc<Surface>) {
        let Some(document_id) = self.lock().outcomes.last().map(|o| o.document_id.clone()) else {
            return;
        };
        let path = self
            .document_dir(&document_id)
            .join(format!("page-{:03}.png", surface.page));

        match write_png(surface, &path) {
            Ok(()) => {
                if let Some(outcome) = self.lock().outcomes.last_mut() {
                    outcome.pages_written.push(path);
                }
            }
            Err(e) => error!("Failed to write {path:?}: {e}"),
        }
    }

    fn load_failed(&mut self, error: &ViewerFault) {
        if let Some(outcome) = self.lock().outcomes.last_mut() {
            outcome.failure = Some(error.to_string());
        }
    }

    fn render_completed(&mut self, page_count: usize) {
        if let Some(outcome) = self.lock().outcomes.last_mut() {
            outcome.page_count = Some(page_count);
        }
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    fn surface(page: usize) -> Arc<Surface> {
        Arc::new(Surface {
            page,
            width_px: 4,
            height_px: 2,
            scale: 1.0,
            pixels: vec![200; 4 * 2 * 3],
        })
    }

    #[test]
    fn writes_pages_under_document_directory() {
        let dir = TempDir::new().unwrap();
        let mut presenter = PngPresenter::new(dir.path());
        let handle = presenter.clone();

        let descriptor = DocumentDescriptor::new("B/101", "doc101");
        presenter.load_started(&descriptor);
        presenter.page_rendered(&surface(1));
        presenter.page_rendered(&surface(2));
        presenter.render_completed(2);

        let outcome = &handle.outcomes()[0];
        assert_eq!(outcome.page_count, Some(2));
        assert_eq!(outcome.pages_written.len(), 2);
        let first = dir.path().join("B_101").join("page-001.png");
        assert_eq!(outcome.pages_written[0], first);

        let decoded = image::open(&first).unwrap().to_rgb8();
        assert_eq!(decoded.dimensions(), (4, 2));
    }

    #[test]
    fn mismatched_buffer_is_not_written() {
        let dir = TempDir::new().unwrap();
        let mut presenter = PngPresenter::new(dir.path());
        presenter.load_started(&DocumentDescriptor::new("B-101", "doc101"));

        let broken = Arc::new(Surface {
            pixels: vec![0; 5],
            ..(*surface(1)).clone()
        });
        presenter.page_rendered(&broken);
        assert!(presenter.outcomes()[0].pages_written.is_empty());
    }

    #[test]
    fn failure_is_recorded_on_current_outcome() {
        let dir = TempDir::new().unwrap();
        let mut presenter = PngPresenter::new(dir.path());
        presenter.catalog_loaded(&[]);
        presenter.load_started(&DocumentDescriptor::new("B-101", "doc101"));
        presenter.load_failed(&ViewerFault::unreachable("doc101", "404"));

        assert_eq!(presenter.catalog_size(), Some(0));
        let outcome = &presenter.outcomes()[0];
        assert!(outcome.failure.as_deref().unwrap().contains("doc101"));
        assert_eq!(outcome.page_count, None);
    }

    #[test]
    fn unfinished_render_is_marked_superseded() {
        let dir = TempDir::new().unwrap();
        let mut presenter = PngPresenter::new(dir.path());
        presenter.load_started(&DocumentDescriptor::new("B-101", "doc101"));
        presenter.load_started(&DocumentDescriptor::new("B-102", "doc102"));
        presenter.load_failed(&ViewerFault::decode("bad xref"));
        presenter.load_started(&DocumentDescriptor::new("B-103", "doc103"));
        presenter.render_completed(0);

        let superseded: Vec<bool> = presenter.outcomes().iter().map(|o| o.superseded).collect();
        assert_eq!(superseded, [true, false, false]);
    }

    #[test]
    fn sanitize_keeps_safe_characters() {
        assert_eq!(sanitize("B-2024_17"), "B-2024_17");
        assert_eq!(sanitize("../x"), "___x");
        assert_eq!(sanitize(""), "_");
    }
}
