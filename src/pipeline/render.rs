//! PDF rasterisation behind a small trait seam.
//!
//! ## Why a visitor instead of returning all pages?
//!
//! A 40-sheet drawing set at 300 DPI is several gigabytes of bitmaps. The
//! [`PdfRasterizer`] hands the caller a [`PageRenderer`] for the open
//! document; the caller renders one page, processes it, drops it, and only
//! then asks for the next. pdfium's bitmap for a page is released before
//! [`PageRenderer::render_page`] returns.
//!
//! ## Why bind pdfium per document?
//!
//! `Pdfium` is not `Send`, while uploads are processed on tokio's blocking
//! pool. Binding inside the blocking thread keeps every pdfium object on the
//! thread that created it; the rasterizer itself only stores where to find
//! the library, so it can be shared between uploads as an
//! `Arc<dyn PdfRasterizer>`.

use crate::error::{IngestError, PageError};
use crate::pipeline::decode::RasterImage;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Resolution request for one page.
#[derive(Debug, Clone, Copy)]
pub struct RenderTarget {
    pub dpi: u32,
    /// Cap on either rendered side, in pixels.
    pub max_pixels: u32,
}

/// Access to the pages of one open PDF.
pub trait PageRenderer {
    /// Page count, read from the document structure without rendering.
    fn page_count(&self) -> usize;

    /// Rasterise a 1-indexed page. The returned image carries the effective
    /// render DPI as its hint.
    fn render_page(&self, page_number: usize, target: RenderTarget) -> Result<RasterImage, PageError>;
}

/// Opens PDFs for page-by-page rasterisation.
pub trait PdfRasterizer: Send + Sync {
    /// Open `pdf_path` and run `visit` against it. The document is closed
    /// when `visit` returns.
    fn with_document(
        &self,
        pdf_path: &Path,
        password: Option<&str>,
        visit: &mut dyn FnMut(&dyn PageRenderer) -> Result<(), IngestError>,
    ) -> Result<(), IngestError>;
}

/// [`PdfRasterizer`] backed by the native pdfium library.
#[derive(Debug, Clone, Default)]
pub struct PdfiumRasterizer {
    library_path: Option<PathBuf>,
}

impl PdfiumRasterizer {
    /// Bind to `libpdfium` in the working directory, else the system library.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind to a specific `libpdfium` file.
    pub fn with_library_path(path: impl Into<PathBuf>) -> Self {
        Self {
            library_path: Some(path.into()),
        }
    }

    /// Use `PDFIUM_LIB_PATH` when set, [`PdfiumRasterizer::new`] otherwise.
    pub fn from_env() -> Self {
        match std::env::var_os("PDFIUM_LIB_PATH") {
            Some(p) if !p.is_empty() => Self::with_library_path(p),
            _ => Self::new(),
        }
    }

    fn bind(&self) -> Result<Pdfium, IngestError> {
        let bindings = match &self.library_path {
            Some(path) => Pdfium::bind_to_library(path),
            None => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
                .or_else(|_| Pdfium::bind_to_system_library()),
        }
        .map_err(|e| IngestError::PdfiumBindingFailed(e.to_string()))?;
        Ok(Pdfium::new(bindings))
    }
}

impl PdfRasterizer for PdfiumRasterizer {
    fn with_document(
        &self,
        pdf_path: &Path,
        password: Option<&str>,
        visit: &mut dyn FnMut(&dyn PageRenderer) -> Result<(), IngestError>,
    ) -> Result<(), IngestError> {
        let pdfium = self.bind()?;
        let document = pdfium
            .load_pdf_from_file(pdf_path, password)
            .map_err(|e| classify_load_error(format!("{:?}", e), password.is_some()))?;

        let pages = PdfiumPages { document };
        info!("PDF loaded: {} pages", pages.page_count());
        visit(&pages)
    }
}

struct PdfiumPages<'a> {
    document: PdfDocument<'a>,
}

impl PageRenderer for PdfiumPages<'_> {
    fn page_count(&self) -> usize {
        self.document.pages().len() as usize
    }

    fn render_page(&self, page_number: usize, target: RenderTarget) -> Result<RasterImage, PageError> {
        let render_failed = |detail: String| PageError::RenderFailed {
            page: page_number,
            detail,
        };

        let index = page_number
            .checked_sub(1)
            .and_then(|i| u16::try_from(i).ok())
            .ok_or_else(|| render_failed("page index out of bounds".to_string()))?;
        let page = self
            .document
            .pages()
            .get(index)
            .map_err(|e| render_failed(format!("{:?}", e)))?;

        let max = i32::try_from(target.max_pixels).unwrap_or(i32::MAX);
        let config = PdfRenderConfig::new()
            .scale_page_by_factor(target.dpi as f32 / 72.0)
            .set_maximum_width(max)
            .set_maximum_height(max);

        let pixels = {
            let bitmap = page
                .render_with_config(&config)
                .map_err(|e| render_failed(format!("{:?}", e)))?;
            bitmap.as_image().to_rgb8()
        };

        let width_in = page.width().to_inches();
        let effective_dpi = if width_in > 0.0 {
            Some((pixels.width() as f32 / width_in).round() as u32)
        } else {
            None
        };
        debug!(
            "Rendered page {} → {}x{} px (effective {:?} DPI)",
            page_number,
            pixels.width(),
            pixels.height(),
            effective_dpi
        );

        Ok(RasterImage::new(pixels).with_dpi_hint(effective_dpi))
    }
}

/// Map a pdfium load failure onto the fatal error taxonomy.
fn classify_load_error(detail: String, password_given: bool) -> IngestError {
    if detail.contains("Password") || detail.contains("password") {
        if password_given {
            IngestError::WrongPassword
        } else {
            IngestError::PasswordRequired
        }
    } else {
        IngestError::CorruptPdf { detail }
    }
}
