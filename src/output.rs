//! Result types produced by the pipeline and handed to collaborators.
//!
//! A [`PageResult`] is immutable once produced. An [`UploadResult`] always
//! exists for a non-fatal run, even when zero pages succeeded; in that case
//! its warning list is non-empty and [`UploadResult::status`] is `FAILED`.

use crate::error::{IngestError, PageError};
use crate::pipeline::input::DocumentKind;
use crate::status::UploadStatus;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A non-fatal quality finding attached to a page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "code", rename_all = "snake_case")]
pub enum PageWarning {
    /// Shortest side is below the configured threshold.
    LowResolution {
        width: u32,
        height: u32,
        threshold: u32,
    },
    /// Laplacian variance is below the configured threshold.
    #[serde(rename = "blur_detected")]
    Blurry { score: f64, threshold: f64 },
}

impl PageWarning {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            PageWarning::LowResolution { .. } => "low_resolution",
            PageWarning::Blurry { .. } => "blur_detected",
        }
    }
}

impl fmt::Display for PageWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PageWarning::LowResolution {
                width,
                height,
                threshold,
            } => write!(
                f,
                "Low resolution: {width}x{height}px (shortest side < {threshold}px)"
            ),
            PageWarning::Blurry { score, .. } => {
                write!(f, "Image may be blurry (score: {score:.1})")
            }
        }
    }
}

/// Where a page's DPI figure came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DpiSource {
    /// Embedded in the source (PNG pHYs, EXIF, or the PDF render resolution).
    Metadata,
    /// Bucketed from the final longest side.
    Heuristic,
}

/// Quarter-turn applied after deskew.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CardinalRotation {
    #[default]
    #[serde(rename = "0")]
    None,
    #[serde(rename = "90")]
    Cw90,
    #[serde(rename = "180")]
    Cw180,
    #[serde(rename = "270")]
    Cw270,
}

impl CardinalRotation {
    pub fn degrees(self) -> u32 {
        match self {
            CardinalRotation::None => 0,
            CardinalRotation::Cw90 => 90,
            CardinalRotation::Cw180 => 180,
            CardinalRotation::Cw270 => 270,
        }
    }
}

/// The processed artifacts and diagnostics for one page.
#[derive(Debug, Clone, Serialize)]
pub struct PageResult {
    /// 1-indexed page number, unique within the upload.
    pub page_number: usize,
    pub width_px: u32,
    pub height_px: u32,
    pub dpi_estimated: Option<u32>,
    pub dpi_source: DpiSource,
    /// Quality warnings in pipeline order.
    pub warnings: Vec<PageWarning>,
    /// Laplacian variance of the page as received.
    pub blur_score: f64,
    /// Rotation applied by deskew, in degrees clockwise; 0 when skipped.
    pub skew_correction_deg: f64,
    pub cardinal_rotation: CardinalRotation,
    pub thumbnail_width_px: u32,
    pub thumbnail_height_px: u32,
    /// Lossless full-resolution page.
    #[serde(skip)]
    pub png: Vec<u8>,
    /// Lossy thumbnail.
    #[serde(skip)]
    pub thumbnail_jpeg: Vec<u8>,
    pub duration_ms: u64,
}

/// An upload-level annotation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum UploadWarning {
    /// A page was skipped; its siblings were processed.
    PageFailed { error: PageError },
    /// Nothing could be processed.
    NoPagesProcessed,
}

impl fmt::Display for UploadWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UploadWarning::PageFailed { error } => write!(f, "{error}"),
            UploadWarning::NoPagesProcessed => f.write_str("No pages processed"),
        }
    }
}

/// Timing and counting information for one upload.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UploadStats {
    /// Pages in the source document (1 for raster uploads).
    pub document_pages: usize,
    /// Pages attempted after applying the selection.
    pub attempted_pages: usize,
    pub processed_pages: usize,
    pub failed_pages: usize,
    pub total_duration_ms: u64,
}

/// Outcome of processing one upload.
#[derive(Debug, Clone, Serialize)]
pub struct UploadResult {
    pub kind: DocumentKind,
    /// Successful pages in ascending page order.
    pub pages: Vec<PageResult>,
    pub warnings: Vec<UploadWarning>,
    pub stats: UploadStats,
}

impl UploadResult {
    /// `READY` when at least one page succeeded, `FAILED` otherwise.
    pub fn status(&self) -> UploadStatus {
        if self.pages.is_empty() {
            UploadStatus::Failed
        } else {
            UploadStatus::Ready
        }
    }

    pub fn is_failed(&self) -> bool {
        self.status() == UploadStatus::Failed
    }

    /// Page-level warnings prefixed with their page, followed by the
    /// upload-level warnings.
    pub fn all_warnings(&self) -> Vec<String> {
        let mut all: Vec<String> = self
            .pages
            .iter()
            .flat_map(|p| {
                p.warnings
                    .iter()
                    .map(move |w| format!("Page {}: {}", p.page_number, w))
            })
            .collect();
        all.extend(self.warnings.iter().map(|w| w.to_string()));
        all
    }

    /// First page failure, for error messages.
    pub fn first_page_error(&self) -> Option<&PageError> {
        self.warnings.iter().find_map(|w| match w {
            UploadWarning::PageFailed { error } => Some(error),
            UploadWarning::NoPagesProcessed => None,
        })
    }

    /// Convert an upload with no successful pages into
    /// [`IngestError::NoPagesProcessed`].
    pub fn into_result(self) -> Result<Self, IngestError> {
        if self.is_failed() {
            return Err(self.no_pages_error());
        }
        Ok(self)
    }

    pub(crate) fn no_pages_error(&self) -> IngestError {
        IngestError::NoPagesProcessed {
            attempted: self.stats.attempted_pages,
            first_error: self
                .first_page_error()
                .map(|e| e.to_string())
                .unwrap_or_else(|| "no pages selected".to_string()),
        }
    }
}

/// Render-free description of an upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentInfo {
    pub kind: DocumentKind,
    pub page_count: usize,
}
