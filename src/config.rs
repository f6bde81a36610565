//! Configuration types for blueprint page processing.
//!
//! All processing behaviour is controlled through [`ProcessingConfig`], built
//! via its [`ProcessingConfigBuilder`]. Every threshold the pipeline compares
//! against lives here rather than as a constant in the stage that uses it,
//! so two deployments can disagree about what counts as "blurry" without a
//! code change.

use crate::error::IngestError;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Configuration for processing one upload.
///
/// Built via [`ProcessingConfig::builder()`] or using
/// [`ProcessingConfig::default()`].
///
/// # Example
/// ```rust
/// use blueprint_ingest::ProcessingConfig;
///
/// let config = ProcessingConfig::builder()
///     .target_dpi(200)
///     .blur_threshold(120.0)
///     .thumbnail_max_size(512)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct ProcessingConfig {
    /// Rendering DPI used when rasterising each PDF page. Range: 72–600. Default: 300.
    pub target_dpi: u32,

    /// Maximum rendered image dimension (width or height) in pixels. Default: 14400.
    ///
    /// A safety cap independent of DPI: 14 400 px is a 48-inch sheet at 300 DPI.
    /// Larger sheets are rendered at a proportionally lower effective DPI,
    /// which is then reported as the page's DPI hint.
    pub max_rendered_pixels: u32,

    /// Laplacian variance below which a page is flagged as blurry. Default: 100.0.
    pub blur_threshold: f64,

    /// Shortest side (px) below which a page is flagged as low resolution. Default: 1800.
    pub low_res_threshold: u32,

    /// Longest side (px) of the generated thumbnail. Range: 16–4096. Default: 400.
    pub thumbnail_max_size: u32,

    /// JPEG quality of the thumbnail. Range: 1–100. Default: 85.
    pub thumbnail_quality: u8,

    /// Skew estimates with a smaller magnitude (degrees) are treated as noise. Default: 0.5.
    pub deskew_min_angle: f64,

    /// Pages with `height > portrait_ratio × width` are turned to landscape. Default: 1.2.
    pub portrait_ratio: f64,

    /// CLAHE clip limit, relative to a uniform histogram. Default: 2.0.
    pub clahe_clip_limit: f64,

    /// CLAHE tiles per side. Range: 1–64. Default: 8.
    pub clahe_tile_grid: u32,

    /// PDF user password for encrypted documents.
    pub password: Option<String>,

    /// Optional per-page progress callback.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            target_dpi: 300,
            max_rendered_pixels: 14_400,
            blur_threshold: 100.0,
            low_res_threshold: 1800,
            thumbnail_max_size: 400,
            thumbnail_quality: 85,
            deskew_min_angle: 0.5,
            portrait_ratio: 1.2,
            clahe_clip_limit: 2.0,
            clahe_tile_grid: 8,
            password: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ProcessingConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessingConfig")
            .field("target_dpi", &self.target_dpi)
            .field("max_rendered_pixels", &self.max_rendered_pixels)
            .field("blur_threshold", &self.blur_threshold)
            .field("low_res_threshold", &self.low_res_threshold)
            .field("thumbnail_max_size", &self.thumbnail_max_size)
            .field("thumbnail_quality", &self.thumbnail_quality)
            .field("deskew_min_angle", &self.deskew_min_angle)
            .field("portrait_ratio", &self.portrait_ratio)
            .field("clahe_clip_limit", &self.clahe_clip_limit)
            .field("clahe_tile_grid", &self.clahe_tile_grid)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field(
                "progress_callback",
                &self
                    .progress_callback
                    .as_ref()
                    .map(|_| "<dyn ProcessingProgressCallback>"),
            )
            .finish()
    }
}

impl ProcessingConfig {
    /// Create a new builder for `ProcessingConfig`.
    pub fn builder() -> ProcessingConfigBuilder {
        ProcessingConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`ProcessingConfig`].
#[derive(Debug)]
pub struct ProcessingConfigBuilder {
    config: ProcessingConfig,
}

impl ProcessingConfigBuilder {
    pub fn target_dpi(mut self, dpi: u32) -> Self {
        self.config.target_dpi = dpi.clamp(72, 600);
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn blur_threshold(mut self, threshold: f64) -> Self {
        self.config.blur_threshold = threshold;
        self
    }

    pub fn low_res_threshold(mut self, px: u32) -> Self {
        self.config.low_res_threshold = px;
        self
    }

    pub fn thumbnail_max_size(mut self, px: u32) -> Self {
        self.config.thumbnail_max_size = px.clamp(16, 4096);
        self
    }

    pub fn thumbnail_quality(mut self, quality: u8) -> Self {
        self.config.thumbnail_quality = quality.clamp(1, 100);
        self
    }

    pub fn deskew_min_angle(mut self, degrees: f64) -> Self {
        self.config.deskew_min_angle = degrees;
        self
    }

    pub fn portrait_ratio(mut self, ratio: f64) -> Self {
        self.config.portrait_ratio = ratio;
        self
    }

    pub fn clahe_clip_limit(mut self, limit: f64) -> Self {
        self.config.clahe_clip_limit = limit;
        self
    }

    pub fn clahe_tile_grid(mut self, tiles: u32) -> Self {
        self.config.clahe_tile_grid = tiles.clamp(1, 64);
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ProcessingConfig, IngestError> {
        let c = &self.config;
        if !c.blur_threshold.is_finite() || c.blur_threshold < 0.0 {
            return Err(IngestError::InvalidConfig(format!(
                "blur threshold must be a non-negative number, got {}",
                c.blur_threshold
            )));
        }
        if c.low_res_threshold == 0 {
            return Err(IngestError::InvalidConfig(
                "low-resolution threshold must be ≥ 1 px".into(),
            ));
        }
        if !c.deskew_min_angle.is_finite() || !(0.0..45.0).contains(&c.deskew_min_angle) {
            return Err(IngestError::InvalidConfig(format!(
                "deskew minimum angle must be in [0, 45), got {}",
                c.deskew_min_angle
            )));
        }
        if !c.portrait_ratio.is_finite() || c.portrait_ratio < 1.0 {
            return Err(IngestError::InvalidConfig(format!(
                "portrait ratio must be ≥ 1.0, got {}",
                c.portrait_ratio
            )));
        }
        if !c.clahe_clip_limit.is_finite() || c.clahe_clip_limit <= 0.0 {
            return Err(IngestError::InvalidConfig(format!(
                "CLAHE clip limit must be > 0, got {}",
                c.clahe_clip_limit
            )));
        }
        Ok(self.config)
    }
}

// ── Page selection ───────────────────────────────────────────────────────

/// Specifies which pages of a PDF to process. Ignored for raster uploads.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PageSelection {
    /// Process all pages (default).
    #[default]
    All,
    /// Process a single page (1-indexed).
    Single(usize),
    /// Process a contiguous range of pages (1-indexed, inclusive).
    Range(usize, usize),
    /// Process specific pages (1-indexed, deduplicated).
    Set(Vec<usize>),
}

impl PageSelection {
    /// Selection from an upload record's optional page list; empty means all.
    pub fn from_pages(pages: Option<&[usize]>) -> Self {
        match pages {
            Some(p) if !p.is_empty() => PageSelection::Set(p.to_vec()),
            _ => PageSelection::All,
        }
    }

    /// Expand the selection into a sorted, deduplicated list of requested
    /// 1-indexed page numbers.
    ///
    /// Explicitly requested pages outside `1..=total_pages` are kept so the
    /// caller can report them; a range is clipped to the document, unless it
    /// starts past the end, in which case its start page is reported.
    pub fn requested_pages(&self, total_pages: usize) -> Vec<usize> {
        let mut pages: Vec<usize> = match self {
            PageSelection::All => (1..=total_pages).collect(),
            PageSelection::Single(p) => vec![*p],
            PageSelection::Range(start, end) => {
                let s = (*start).max(1);
                if s > total_pages {
                    vec![s]
                } else {
                    (s..=(*end).min(total_pages)).collect()
                }
            }
            PageSelection::Set(pages) => pages.clone(),
        };
        pages.sort_unstable();
        pages.dedup();
        pages
    }
}

/// Upper bound on the pages a comma-separated list may expand to.
const MAX_LISTED_PAGES: usize = 100_000;

impl FromStr for PageSelection {
    type Err = IngestError;

    /// Parse `all`, `5`, `3-15` or `1,3,5-7`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_lowercase();
        if s.is_empty() || s == "all" {
            return Ok(PageSelection::All);
        }

        let parse_page = |p: &str| -> Result<usize, IngestError> {
            let page: usize = p.trim().parse().map_err(|_| {
                IngestError::InvalidConfig(format!("invalid page number: '{}'", p.trim()))
            })?;
            if page < 1 {
                return Err(IngestError::InvalidConfig(format!(
                    "pages are 1-indexed, minimum is 1 (got {page})"
                )));
            }
            Ok(page)
        };
        let parse_range = |part: &str| -> Result<(usize, usize), IngestError> {
            let (start, end) = part.split_once('-').unwrap_or((part, part));
            let (start, end) = (parse_page(start)?, parse_page(end)?);
            if start > end {
                return Err(IngestError::InvalidConfig(format!(
                    "invalid page range '{start}-{end}': start must be <= end"
                )));
            }
            Ok((start, end))
        };

        if !s.contains(',') {
            let (start, end) = parse_range(&s)?;
            return Ok(if start == end {
                PageSelection::Single(start)
            } else {
                PageSelection::Range(start, end)
            });
        }

        let mut pages = Vec::new();
        for part in s.split(',').filter(|p| !p.trim().is_empty()) {
            let (start, end) = parse_range(part)?;
            if pages.len() + (end - start + 1) > MAX_LISTED_PAGES {
                return Err(IngestError::InvalidConfig(format!(
                    "page list '{}' names more than {MAX_LISTED_PAGES} pages",
                    s
                )));
            }
            pages.extend(start..=end);
        }
        Ok(PageSelection::Set(pages))
    }
}
