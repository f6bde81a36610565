//! The per-page processing pipeline.
//!
//! Stages run in a fixed order on one owned raster:
//!
//! ```text
//! resolution ─▶ blur ─▶ deskew ─▶ cardinal ─▶ CLAHE ─▶ encode + thumbnail ─▶ DPI
//! ```
//!
//! Resolution and blur are measured on the page as received, before any
//! resampling can mask the problem. Nothing here touches the filesystem or
//! shared state, so pages of different uploads can run in parallel freely.

use crate::config::ProcessingConfig;
use crate::error::PageError;
use crate::output::PageResult;
use crate::pipeline::decode::RasterImage;
use crate::pipeline::enhance::clahe_luminance;
use crate::pipeline::{encode, geometry, quality};
use std::time::Instant;
use tracing::debug;

/// Runs the fixed page pipeline with one configuration.
#[derive(Debug, Clone, Copy)]
pub struct PageProcessor<'a> {
    config: &'a ProcessingConfig,
}

impl<'a> PageProcessor<'a> {
    pub fn new(config: &'a ProcessingConfig) -> Self {
        Self { config }
    }

    /// Process one page. Only encoding can fail; every quality problem is
    /// reported as a warning on the result.
    pub fn process(&self, raster: RasterImage, page_number: usize) -> Result<PageResult, PageError> {
        let start = Instant::now();
        let c = self.config;
        let RasterImage { pixels, dpi_hint } = raster;
        let mut warnings = Vec::new();

        warnings.extend(quality::check_resolution(
            pixels.width(),
            pixels.height(),
            c.low_res_threshold,
        ));

        let blur_score = quality::blur_score(&pixels);
        warnings.extend(quality::check_blur(blur_score, c.blur_threshold));

        let (pixels, skew_correction_deg) = geometry::deskew(pixels, c.deskew_min_angle);

        let cardinal_rotation = geometry::choose_cardinal(pixels.width(), pixels.height(), c.portrait_ratio);
        let pixels = cardinal_rotation.apply(pixels);

        let pixels = clahe_luminance(&pixels, c.clahe_clip_limit, c.clahe_tile_grid);

        let encode_failed = |e: image::ImageError| PageError::EncodeFailed {
            page: page_number,
            detail: e.to_string(),
        };
        let thumbnail = encode::make_thumbnail(&pixels, c.thumbnail_max_size, c.thumbnail_quality)
            .map_err(encode_failed)?;
        let png = encode::encode_png(&pixels).map_err(encode_failed)?;

        let (width_px, height_px) = pixels.dimensions();
        let (dpi, dpi_source) = quality::estimate_dpi(width_px.max(height_px), dpi_hint);

        let duration_ms = start.elapsed().as_millis() as u64;
        debug!(
            page = page_number,
            width_px,
            height_px,
            blur_score,
            skew_correction_deg,
            rotation = cardinal_rotation.degrees(),
            dpi,
            warnings = warnings.len(),
            duration_ms,
            "Page processed"
        );

        Ok(PageResult {
            page_number,
            width_px,
            height_px,
            dpi_estimated: Some(dpi),
            dpi_source,
            warnings,
            blur_score,
            skew_correction_deg,
            cardinal_rotation,
            thumbnail_width_px: thumbnail.width,
            thumbnail_height_px: thumbnail.height,
            png,
            thumbnail_jpeg: thumbnail.jpeg,
            duration_ms,
        })
    }
}
