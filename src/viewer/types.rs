//! Core types for document rendering

use super::MAX_SURFACE_DIMENSION;

/// Raw rendered page before it reaches the presenter.
///
/// Packed RGB pixel data (3 bytes per pixel, row-major, no padding) together
/// with the page it belongs to and the scale it was produced at.
#[derive(Clone)]
pub struct Surface {
    /// Page number (1-based)
    pub page: usize,
    /// Width in pixels
    pub width_px: u32,
    /// Height in pixels
    pub height_px: u32,
    /// Scale the page was rasterized at
    pub scale: f32,
    /// Raw RGB pixel data
    pub pixels: Vec<u8>,
}

impl Surface {
    /// Expected length of `pixels` for the surface dimensions
    #[must_use]
    pub fn expected_len(&self) -> usize {
        self.width_px as usize * self.height_px as usize * 3
    }
}

impl std::fmt::Debug for Surface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Surface")
            .field("page", &self.page)
            .field("width_px", &self.width_px)
            .field("height_px", &self.height_px)
            .field("scale", &self.scale)
            .field("pixels_len", &self.pixels.len())
            .finish_non_exhaustive()
    }
}

/// Pre-computed rasterization parameters for a page
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PageViewport {
    /// Output width in pixels
    pub width_px: u32,
    /// Output height in pixels
    pub height_px: u32,
    /// Magnification applied to page units
    pub mag: f32,
}

impl PageViewport {
    /// Size a page of `page_size` units at `scale`, clamping the larger side
    /// to [`MAX_SURFACE_DIMENSION`].
    #[must_use]
    pub fn compute(page_size: (f32, f32), scale: f32) -> Self {
        let (page_width, page_height) = page_size;
        let mut mag = scale;
        let mut out_width = page_width * mag;
        let mut out_height = page_height * mag;

        let max_dim = out_width.max(out_height);
        if max_dim > MAX_SURFACE_DIMENSION {
            let reduction = MAX_SURFACE_DIMENSION / max_dim;
            mag *= reduction;
            if out_width >= out_height {
                out_width = MAX_SURFACE_DIMENSION;
                out_height *= reduction;
            } else {
                out_width *= reduction;
                out_height = MAX_SURFACE_DIMENSION;
            }
        }

        Self {
            width_px: out_width.floor().max(1.0) as u32,
            height_px: out_height.floor().max(1.0) as u32,
            mag,
        }
    }
}

/// Lifecycle of a render task.
///
/// `Pending --start--> Loading --handle resolved--> Rendering --all pages--> Completed`;
/// any state may go to `Cancelled`, `Loading | Rendering` may go to `Failed`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TaskState {
    Pending,
    Loading,
    Rendering,
    Completed,
    Failed,
    Cancelled,
}

impl TaskState {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn viewport_scales_page_units() {
        let vp = PageViewport::compute((612.0, 792.0), 1.1);
        assert_eq!(vp.width_px, 673);
        assert_eq!(vp.height_px, 871);
        assert!((vp.mag - 1.1).abs() < f32::EPSILON);
    }

    #[test]
    fn viewport_clamps_oversized_pages() {
        let vp = PageViewport::compute((10_000.0, 5_000.0), 2.0);
        assert_eq!(vp.width_px, MAX_SURFACE_DIMENSION as u32);
        let half = (MAX_SURFACE_DIMENSION / 2.0) as u32;
        assert!(vp.height_px.abs_diff(half) <= 1);
        assert!(vp.mag < 1.0);
    }

    #[test]
    fn viewport_never_collapses_to_zero() {
        let vp = PageViewport::compute((0.5, 0.5), 0.8);
        assert_eq!((vp.width_px, vp.height_px), (1, 1));
    }

    #[test]
    fn terminal_states() {
        assert!(!TaskState::Pending.is_terminal());
        assert!(!TaskState::Rendering.is_terminal());
        assert!(TaskState::Completed.is_terminal());
        assert!(TaskState::Failed.is_terminal());
        assert!(TaskState::Cancelled.is_terminal());
    }
}
