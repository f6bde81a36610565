//! Geometric correction: small-angle deskew and cardinal orientation.
//!
//! ## Skew estimation
//!
//! 1. Convert to grayscale and downscale to a proxy (longest side ≤ 2000 px);
//!    angle is scale-invariant, and Hough cost grows with edge count
//! 2. Canny edge detection
//! 3. Hough line accumulation (`imageproc::hough`, 1° resolution)
//! 4. Fold every line angle into (−45°, 45°]; horizontal and vertical
//!    strokes of a drawing then vote for the same skew
//! 5. Take the median; an empty line set means "no evidence", not "0°"
//!
//! `PolarLine::angle_in_degrees` is the angle of the line's normal, so a
//! horizontal line reports 90 and a line tilted clockwise by `a` reports
//! `90 + a`.

use crate::output::CardinalRotation;
use image::imageops::{self, FilterType};
use image::{DynamicImage, GrayImage, Rgb, RgbImage};
use imageproc::edges::canny;
use imageproc::geometric_transformations::{rotate_about_center, Interpolation};
use imageproc::hough::{detect_lines, LineDetectionOptions};
use tracing::debug;

const ANALYSIS_MAX_SIDE: u32 = 2000;
const WHITE: Rgb<u8> = Rgb([255, 255, 255]);

/// Dominant skew in degrees clockwise, normalised into (−45, 45].
///
/// Returns `None` when no lines are found.
pub fn estimate_skew(img: &RgbImage) -> Option<f64> {
    let gray = analysis_proxy(img);
    let (w, h) = gray.dimensions();
    if w < 16 || h < 16 {
        return None;
    }

    let edges = canny(&gray, 50.0, 150.0);
    let vote_threshold = (w.min(h) / 5).clamp(50, 400);
    let lines = detect_lines(
        &edges,
        LineDetectionOptions {
            vote_threshold,
            suppression_radius: 8,
        },
    );
    if lines.is_empty() {
        debug!("No Hough lines above {} votes; skew unknown", vote_threshold);
        return None;
    }

    let mut angles: Vec<f64> = lines
        .iter()
        .map(|l| fold_angle(f64::from(l.angle_in_degrees) - 90.0))
        .collect();
    angles.sort_by(|a, b| a.total_cmp(b));
    let median = angles[angles.len() / 2];
    debug!(
        lines = lines.len(),
        vote_threshold,
        median,
        "Skew estimated"
    );
    Some(median)
}

/// Rotate `img` to cancel its estimated skew.
///
/// Returns the image and the rotation actually applied in degrees clockwise
/// (0.0 when the estimate is missing or below `min_angle`). Exposed corners
/// are filled white.
pub fn deskew(img: RgbImage, min_angle: f64) -> (RgbImage, f64) {
    let Some(angle) = estimate_skew(&img) else {
        return (img, 0.0);
    };
    if angle.abs() < min_angle {
        debug!("Skew {:.2}° below {:.2}°, not rotating", angle, min_angle);
        return (img, 0.0);
    }
    let correction = -angle;
    let rotated = rotate_about_center(
        &img,
        correction.to_radians() as f32,
        Interpolation::Bilinear,
        WHITE,
    );
    (rotated, correction)
}

/// Quarter-turn needed to bring the page to landscape reading orientation.
///
/// Drawings are predominantly landscape; a page taller than
/// `portrait_ratio × width` is turned a quarter clockwise.
pub fn choose_cardinal(width: u32, height: u32, portrait_ratio: f64) -> CardinalRotation {
    if f64::from(height) > portrait_ratio * f64::from(width) {
        CardinalRotation::Cw90
    } else {
        CardinalRotation::None
    }
}

impl CardinalRotation {
    /// Apply this rotation losslessly.
    pub fn apply(self, img: RgbImage) -> RgbImage {
        match self {
            CardinalRotation::None => img,
            CardinalRotation::Cw90 => imageops::rotate90(&img),
            CardinalRotation::Cw180 => imageops::rotate180(&img),
            CardinalRotation::Cw270 => imageops::rotate270(&img),
        }
    }
}

fn analysis_proxy(img: &RgbImage) -> GrayImage {
    let gray = DynamicImage::ImageRgb8(img.clone()).to_luma8();
    let (w, h) = gray.dimensions();
    let longest = w.max(h);
    if longest <= ANALYSIS_MAX_SIDE {
        return gray;
    }
    let scale = f64::from(ANALYSIS_MAX_SIDE) / f64::from(longest);
    let nw = ((f64::from(w) * scale).round() as u32).max(1);
    let nh = ((f64::from(h) * scale).round() as u32).max(1);
    imageops::resize(&gray, nw, nh, FilterType::Triangle)
}

fn fold_angle(mut a: f64) -> f64 {
    while a > 45.0 {
        a -= 90.0;
    }
    while a <= -45.0 {
        a += 90.0;
    }
    a
}

#[cfg(test)]
mod tests {
    use super::*;
    use imageproc::drawing::draw_filled_rect_mut;
    use imageproc::rect::Rect;

    /// A white sheet with a title-block style grid of thick dark rules.
    fn ruled_sheet(w: u32, h: u32) -> RgbImage {
        let mut img = RgbImage::from_pixel(w, h, WHITE);
        let ink = Rgb([20, 20, 20]);
        for y in (60..h - 60).step_by(90) {
            draw_filled_rect_mut(&mut img, Rect::at(40, y as i32).of_size(w - 80, 4), ink);
        }
        for x in [60u32, w / 2, w - 64] {
            draw_filled_rect_mut(&mut img, Rect::at(x as i32, 40).of_size(4, h - 80), ink);
        }
        img
    }

    fn tilt(img: &RgbImage, degrees: f64) -> RgbImage {
        rotate_about_center(img, degrees.to_radians() as f32, Interpolation::Bilinear, WHITE)
    }

    #[test]
    fn fold_into_half_open_range() {
        assert_eq!(fold_angle(0.0), 0.0);
        assert_eq!(fold_angle(-90.0), 0.0);
        assert_eq!(fold_angle(90.0), 0.0);
        assert_eq!(fold_angle(45.0), 45.0);
        assert_eq!(fold_angle(-45.0), 45.0);
        assert_eq!(fold_angle(-87.0), 3.0);
    }

    #[test]
    fn aligned_sheet_has_no_skew() {
        let angle = estimate_skew(&ruled_sheet(800, 600)).unwrap();
        assert!(angle.abs() < 0.5, "angle {angle}");
    }

    #[test]
    fn blank_sheet_has_no_evidence() {
        let img = RgbImage::from_pixel(400, 300, WHITE);
        assert!(estimate_skew(&img).is_none());
        let (out, applied) = deskew(img, 0.5);
        assert_eq!(applied, 0.0);
        assert_eq!(out.dimensions(), (400, 300));
    }

    #[test]
    fn detects_tilt() {
        let tilted = tilt(&ruled_sheet(800, 600), 3.0);
        let angle = estimate_skew(&tilted).unwrap();
        assert!((angle - 3.0).abs() <= 1.0, "angle {angle}");
    }

    #[test]
    fn deskew_is_idempotent() {
        let tilted = tilt(&ruled_sheet(800, 600), 4.0);
        let (once, applied) = deskew(tilted, 0.5);
        assert!(applied < -2.0, "applied {applied}");
        assert_eq!(once.dimensions(), (800, 600));

        let (_, second) = deskew(once, 0.5);
        assert_eq!(second, 0.0);
    }

    #[test]
    fn deskew_fills_corners_white() {
        let tilted = tilt(&ruled_sheet(800, 600), 5.0);
        let (out, _) = deskew(tilted, 0.5);
        assert_eq!(out.get_pixel(0, 0), &WHITE);
        assert_eq!(out.get_pixel(799, 599), &WHITE);
    }

    #[test]
    fn small_angles_are_left_alone() {
        let (_, applied) = deskew(ruled_sheet(800, 600), 0.5);
        assert_eq!(applied, 0.0);
    }

    #[test]
    fn portrait_turned_to_landscape() {
        assert_eq!(choose_cardinal(1000, 1201, 1.2), CardinalRotation::Cw90);
        assert_eq!(choose_cardinal(1000, 1200, 1.2), CardinalRotation::None);
        assert_eq!(choose_cardinal(3000, 2000, 1.2), CardinalRotation::None);
    }

    #[test]
    fn quarter_turn_swaps_dimensions() {
        let img = RgbImage::new(30, 50);
        assert_eq!(CardinalRotation::Cw90.apply(img.clone()).dimensions(), (50, 30));
        assert_eq!(CardinalRotation::Cw180.apply(img.clone()).dimensions(), (30, 50));
        assert_eq!(CardinalRotation::None.apply(img).dimensions(), (30, 50));
    }
}
