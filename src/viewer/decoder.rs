//! Decoder seam between render tasks and the document engine

use super::request::ViewerFault;
use super::types::PageViewport;

/// Pixels produced for one page
#[derive(Clone, Debug)]
pub struct Raster {
    pub width_px: u32,
    pub height_px: u32,
    /// Packed RGB, 3 bytes per pixel
    pub pixels: Vec<u8>,
}

/// Opens document bytes into a decodable handle.
///
/// Shared by all workers of a session. Handles are created, used and dropped
/// on a single worker thread, so they need not be `Send`.
pub trait DocumentDecoder: Send + Sync {
    fn open(&self, bytes: Vec<u8>) -> Result<Box<dyn DecodedDocument>, ViewerFault>;
}

/// An open document. Dropping it releases the native handle.
pub trait DecodedDocument {
    fn page_count(&self) -> usize;

    /// Page size in document units (0-indexed page)
    fn page_size(&mut self, index: usize) -> Result<(f32, f32), ViewerFault>;

    fn rasterize(&mut self, index: usize, viewport: &PageViewport) -> Result<Raster, ViewerFault>;
}

#[cfg(feature = "pdf")]
pub use mupdf_engine::MupdfDecoder;

#[cfg(feature = "pdf")]
mod mupdf_engine {
    use log::debug;
    use mupdf::{Colorspace, Document, Matrix, Page, Pixmap};

    use super::{DecodedDocument, DocumentDecoder, Raster};
    use crate::viewer::request::ViewerFault;
    use crate::viewer::types::PageViewport;

    const PDF_MAGIC: &str = "application/pdf";

    /// MuPDF-backed decoder for PDF bytes
    #[derive(Clone, Copy, Debug, Default)]
    pub struct MupdfDecoder;

    impl DocumentDecoder for MupdfDecoder {
        fn open(&self, bytes: Vec<u8>) -> Result<Box<dyn DecodedDocument>, ViewerFault> {
            let doc = Document::from_bytes(&bytes, PDF_MAGIC).map_err(decode_fault)?;
            let count = doc.page_count().map_err(decode_fault)?;
            if count <= 0 {
                return Err(ViewerFault::decode("document has no pages"));
            }
            debug!("Opened {} byte document with {count} page(s)", bytes.len());
            Ok(Box::new(MupdfDocument {
                doc,
                page_count: count as usize,
                loaded: None,
            }))
        }
    }

    struct MupdfDocument {
        doc: Document,
        page_count: usize,
        loaded: Option<(usize, Page)>,
    }

    impl MupdfDocument {
        fn page(&mut self, index: usize) -> Result<&Page, ViewerFault> {
            let cached = matches!(self.loaded, Some((i, _)) if i == index);
            if !cached {
                let page = self.doc.load_page(index as i32).map_err(decode_fault)?;
                self.loaded = Some((index, page));
            }
            match &self.loaded {
                Some((_, page)) => Ok(page),
                None => Err(ViewerFault::decode(format!("page {index} not loaded"))),
            }
        }
    }

    impl DecodedDocument for MupdfDocument {
        fn page_count(&self) -> usize {
            self.page_count
        }

        fn page_size(&mut self, index: usize) -> Result<(f32, f32), ViewerFault> {
            let bounds = self.page(index)?.bounds().map_err(decode_fault)?;
            Ok((bounds.x1 - bounds.x0, bounds.y1 - bounds.y0))
        }

        fn rasterize(
            &mut self,
            index: usize,
            viewport: &PageViewport,
        ) -> Result<Raster, ViewerFault> {
            let transform = Matrix::new_scale(viewport.mag, viewport.mag);
            let rgb = Colorspace::device_rgb();
            let pixmap = self
                .page(index)?
                .to_pixmap(&transform, &rgb, false, false)
                .map_err(decode_fault)?;
            let pixels = pixmap_to_rgb(&pixmap)?;
            Ok(Raster {
                width_px: pixmap.width(),
                height_px: pixmap.height(),
                pixels,
            })
        }
    }

    fn decode_fault(e: mupdf::error::Error) -> ViewerFault {
        ViewerFault::decode(e.to_string())
    }

    fn pixmap_to_rgb(pixmap: &Pixmap) -> Result<Vec<u8>, ViewerFault> {
        let n = pixmap.n() as usize;
        if n < 3 {
            return Err(ViewerFault::decode(format!(
                "Unsupported pixmap format: {n} channels"
            )));
        }

        let width = pixmap.width() as usize;
        let height = pixmap.height() as usize;
        let stride = pixmap.stride() as usize;
        let samples = pixmap.samples();
        let row_bytes = width * n;
        let expected_min = stride.saturating_mul(height);
        if samples.len() < expected_min || row_bytes > stride {
            return Err(ViewerFault::decode("Pixmap buffer size mismatch"));
        }

        let mut out = Vec::with_capacity(width * height * 3);
        for y in 0..height {
            let row_start = y * stride;
            let row = &samples[row_start..row_start + row_bytes];
            if n == 3 {
                out.extend_from_slice(row);
            } else {
                for px in row.chunks_exact(n) {
                    out.extend_from_slice(&px[..3]);
                }
            }
        }
        Ok(out)
    }

}
