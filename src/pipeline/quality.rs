//! Quality checks and DPI estimation.
//!
//! Both checks only annotate; a page is never rejected for being small or
//! soft. Thresholds come from [`crate::ProcessingConfig`].

use crate::output::{DpiSource, PageWarning};
use image::RgbImage;
use imageproc::filter::laplacian_filter;

/// Flag a page whose shortest side is strictly below `threshold` pixels.
pub fn check_resolution(width: u32, height: u32, threshold: u32) -> Option<PageWarning> {
    (width.min(height) < threshold).then_some(PageWarning::LowResolution {
        width,
        height,
        threshold,
    })
}

/// Variance of the 3×3 Laplacian over the luminance channel.
///
/// Higher is sharper. Scanned drawings with crisp line work score in the
/// thousands; a blank sheet scores 0.
pub fn blur_score(img: &RgbImage) -> f64 {
    if img.width() < 3 || img.height() < 3 {
        return 0.0;
    }
    let gray = image::DynamicImage::ImageRgb8(img.clone()).to_luma8();
    let lap = laplacian_filter(&gray);

    let (mut sum, mut sum_sq) = (0.0f64, 0.0f64);
    for p in lap.pixels() {
        let v = f64::from(p.0[0]);
        sum += v;
        sum_sq += v * v;
    }
    let n = f64::from(lap.width()) * f64::from(lap.height());
    let mean = sum / n;
    (sum_sq / n - mean * mean).max(0.0)
}

/// Flag a page whose blur score is strictly below `threshold`.
pub fn check_blur(score: f64, threshold: f64) -> Option<PageWarning> {
    (score < threshold).then_some(PageWarning::Blurry { score, threshold })
}

/// DPI for a page: the embedded hint when there is one, else a bucket on
/// the longest side assuming a large-format sheet.
pub fn estimate_dpi(longest_side: u32, hint: Option<u32>) -> (u32, DpiSource) {
    if let Some(dpi) = hint {
        return (dpi, DpiSource::Metadata);
    }
    let dpi = match longest_side {
        10_000.. => 400,
        7_000.. => 300,
        5_000.. => 200,
        _ => 150,
    };
    (dpi, DpiSource::Heuristic)
}
