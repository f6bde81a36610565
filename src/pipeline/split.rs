//! Document splitting: one upload in, an ordered sequence of page rasters out.
//!
//! For a PDF the page count is probed first (render-free), the selection is
//! resolved against it, and pages are then rendered one at a time in
//! ascending order, each handed to the visitor before the next is rendered.
//! A raster upload is a single page numbered 1 and the selection is ignored.
//!
//! Page-scoped failures (a page that does not render, an image that does not
//! decode, a selected page the document does not have) are delivered to the
//! visitor as `Err(PageError)` in their ordinal position; only failures that
//! prevent opening the document at all end the split.

use crate::config::{PageSelection, ProcessingConfig};
use crate::error::{IngestError, PageError};
use crate::pipeline::decode::{decode_raster, RasterImage};
use crate::pipeline::input::StagedDocument;
use crate::pipeline::render::{PdfRasterizer, RenderTarget};
use std::ops::ControlFlow;
use tracing::{debug, warn};

/// One page delivered by the splitter.
#[derive(Debug)]
pub struct SplitPage {
    /// 1-indexed page number in the source document.
    pub page_number: usize,
    /// Pages this split will deliver in total.
    pub total: usize,
    pub image: Result<RasterImage, PageError>,
}

/// What the splitter saw.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SplitSummary {
    /// Pages in the document (1 for raster uploads).
    pub document_pages: usize,
    /// Pages delivered to the visitor.
    pub delivered: usize,
    /// The visitor asked to stop before all pages were delivered.
    pub stopped_early: bool,
}

/// Splits staged uploads into page rasters.
pub struct DocumentSplitter<'a> {
    rasterizer: &'a dyn PdfRasterizer,
    target: RenderTarget,
    password: Option<&'a str>,
}

impl<'a> DocumentSplitter<'a> {
    pub fn new(rasterizer: &'a dyn PdfRasterizer, config: &'a ProcessingConfig) -> Self {
        Self {
            rasterizer,
            target: RenderTarget {
                dpi: config.target_dpi,
                max_pixels: config.max_rendered_pixels,
            },
            password: config.password.as_deref(),
        }
    }

    /// Number of pages in the upload, without rendering any of them.
    pub fn page_count(&self, source: &StagedDocument) -> Result<usize, IngestError> {
        match source {
            StagedDocument::Image { .. } => Ok(1),
            StagedDocument::Pdf { path, .. } => {
                let mut count = 0;
                self.rasterizer
                    .with_document(path, self.password, &mut |doc| {
                        count = doc.page_count();
                        Ok(())
                    })?;
                Ok(count)
            }
        }
    }

    /// Deliver the selected pages of `source` to `visit` in ascending page
    /// order. Each page's raster is dropped by the visitor before the next
    /// one is produced. Returning `ControlFlow::Break` stops the split.
    pub fn for_each_page(
        &self,
        source: &StagedDocument,
        selection: &PageSelection,
        mut visit: impl FnMut(SplitPage) -> ControlFlow<()>,
    ) -> Result<SplitSummary, IngestError> {
        match source {
            StagedDocument::Image { kind, bytes } => {
                if *selection != PageSelection::All {
                    debug!("Ignoring page selection for single-image upload");
                }
                let image = decode_raster(bytes, *kind)
                    .map_err(|detail| PageError::DecodeFailed { page: 1, detail });
                // A single page: there is nothing left to stop early.
                let _ = visit(SplitPage {
                    page_number: 1,
                    total: 1,
                    image,
                });
                Ok(SplitSummary {
                    document_pages: 1,
                    delivered: 1,
                    stopped_early: false,
                })
            }
            StagedDocument::Pdf { path, .. } => {
                let mut summary = SplitSummary::default();
                self.rasterizer
                    .with_document(path, self.password, &mut |doc| {
                        let total_pages = doc.page_count();
                        let requested = selection.requested_pages(total_pages);
                        debug!(
                            "Selected {} of {} pages for processing",
                            requested.len(),
                            total_pages
                        );
                        summary.document_pages = total_pages;

                        for (position, &page_number) in requested.iter().enumerate() {
                            let image = if (1..=total_pages).contains(&page_number) {
                                doc.render_page(page_number, self.target)
                            } else {
                                warn!(
                                    "Skipping page {} (out of range, total={})",
                                    page_number, total_pages
                                );
                                Err(PageError::OutOfRange {
                                    page: page_number,
                                    total: total_pages,
                                })
                            };
                            summary.delivered += 1;
                            let flow = visit(SplitPage {
                                page_number,
                                total: requested.len(),
                                image,
                            });
                            if flow.is_break() {
                                summary.stopped_early = position + 1 < requested.len();
                                break;
                            }
                        }
                        Ok(())
                    })?;
                Ok(summary)
            }
        }
    }

    /// Eagerly collect every selected page.
    ///
    /// Holds all rasters at once; prefer [`DocumentSplitter::for_each_page`]
    /// for large documents.
    pub fn split(
        &self,
        source: &StagedDocument,
        selection: &PageSelection,
    ) -> Result<Vec<SplitPage>, IngestError> {
        let mut pages = Vec::new();
        self.for_each_page(source, selection, |page| {
            pages.push(page);
            ControlFlow::Continue(())
        })?;
        Ok(pages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::input::{stage_bytes, DocumentKind};
    use crate::pipeline::render::PageRenderer;
    use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
    use std::io::Cursor;
    use std::path::Path;
    use std::sync::Mutex;

    /// In-memory stand-in for pdfium that records which pages were rendered.
    struct FakePdf {
        pages: usize,
        broken: Vec<usize>,
        rendered: Mutex<Vec<usize>>,
    }

    impl FakePdf {
        fn new(pages: usize) -> Self {
            Self {
                pages,
                broken: vec![],
                rendered: Mutex::new(vec![]),
            }
        }
    }

    impl PageRenderer for FakePdf {
        fn page_count(&self) -> usize {
            self.pages
        }

        fn render_page(&self, page_number: usize, _target: RenderTarget) -> Result<RasterImage, PageError> {
            self.rendered.lock().unwrap().push(page_number);
            if self.broken.contains(&page_number) {
                return Err(PageError::RenderFailed {
                    page: page_number,
                    detail: "broken content stream".into(),
                });
            }
            Ok(RasterImage::new(RgbImage::from_pixel(
                10 + page_number as u32,
                10,
                Rgb([255, 255, 255]),
            )))
        }
    }

    impl PdfRasterizer for FakePdf {
        fn with_document(
            &self,
            _pdf_path: &Path,
            _password: Option<&str>,
            visit: &mut dyn FnMut(&dyn PageRenderer) -> Result<(), IngestError>,
        ) -> Result<(), IngestError> {
            visit(self)
        }
    }

    fn fake_pdf_upload() -> StagedDocument {
        stage_bytes(b"%PDF-1.7 fake".to_vec(), "application/pdf").unwrap()
    }

    fn numbers(pages: &[SplitPage]) -> Vec<usize> {
        pages.iter().map(|p| p.page_number).collect()
    }

    #[test]
    fn all_pages_in_order() {
        let fake = FakePdf::new(4);
        let config = ProcessingConfig::default();
        let splitter = DocumentSplitter::new(&fake, &config);
        let pages = splitter.split(&fake_pdf_upload(), &PageSelection::All).unwrap();
        assert_eq!(numbers(&pages), vec![1, 2, 3, 4]);
        assert!(pages.iter().all(|p| p.total == 4 && p.image.is_ok()));
    }

    #[test]
    fn selection_subset_ascending_and_only_those_rendered() {
        let fake = FakePdf::new(6);
        let config = ProcessingConfig::default();
        let splitter = DocumentSplitter::new(&fake, &config);
        let pages = splitter
            .split(&fake_pdf_upload(), &PageSelection::Set(vec![5, 2, 5]))
            .unwrap();
        assert_eq!(numbers(&pages), vec![2, 5]);
        assert_eq!(*fake.rendered.lock().unwrap(), vec![2, 5]);
    }

    #[test]
    fn page_count_probe_renders_nothing() {
        let fake = FakePdf::new(9);
        let config = ProcessingConfig::default();
        let splitter = DocumentSplitter::new(&fake, &config);
        assert_eq!(splitter.page_count(&fake_pdf_upload()).unwrap(), 9);
        assert!(fake.rendered.lock().unwrap().is_empty());
    }

    #[test]
    fn failures_are_page_scoped() {
        let mut fake = FakePdf::new(3);
        fake.broken = vec![2];
        let config = ProcessingConfig::default();
        let splitter = DocumentSplitter::new(&fake, &config);
        let pages = splitter
            .split(&fake_pdf_upload(), &PageSelection::Set(vec![1, 2, 3, 7]))
            .unwrap();
        assert_eq!(numbers(&pages), vec![1, 2, 3, 7]);
        assert!(pages[0].image.is_ok());
        assert!(matches!(pages[1].image, Err(PageError::RenderFailed { page: 2, .. })));
        assert!(pages[2].image.is_ok());
        assert!(matches!(
            pages[3].image,
            Err(PageError::OutOfRange { page: 7, total: 3 })
        ));
    }

    #[test]
    fn break_stops_rendering() {
        let fake = FakePdf::new(5);
        let config = ProcessingConfig::default();
        let splitter = DocumentSplitter::new(&fake, &config);
        let summary = splitter
            .for_each_page(&fake_pdf_upload(), &PageSelection::All, |page| {
                if page.page_number == 2 {
                    ControlFlow::Break(())
                } else {
                    ControlFlow::Continue(())
                }
            })
            .unwrap();
        assert_eq!(summary.delivered, 2);
        assert!(summary.stopped_early);
        assert_eq!(*fake.rendered.lock().unwrap(), vec![1, 2]);
    }

    #[test]
    fn image_is_single_page_and_ignores_selection() {
        let fake = FakePdf::new(0);
        let config = ProcessingConfig::default();
        let splitter = DocumentSplitter::new(&fake, &config);
        let mut bytes = Vec::new();
        DynamicImage::ImageRgb8(RgbImage::from_pixel(30, 20, Rgb([9, 9, 9])))
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        let staged = stage_bytes(bytes, "image/png").unwrap();
        assert_eq!(staged.kind(), DocumentKind::Png);
        let pages = splitter.split(&staged, &PageSelection::Single(4)).unwrap();
        assert_eq!(numbers(&pages), vec![1]);
        let raster = pages[0].image.as_ref().unwrap();
        assert_eq!((raster.width(), raster.height()), (30, 20));
    }

    #[test]
    fn undecodable_image_is_page_error() {
        let fake = FakePdf::new(0);
        let config = ProcessingConfig::default();
        let splitter = DocumentSplitter::new(&fake, &config);
        let staged = stage_bytes(b"garbage".to_vec(), "image/jpeg").unwrap();
        let pages = splitter.split(&staged, &PageSelection::All).unwrap();
        assert!(matches!(pages[0].image, Err(PageError::DecodeFailed { page: 1, .. })));
    }
}
