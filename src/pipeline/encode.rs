//! Image encoding: processed `RgbImage` → PNG page and JPEG thumbnail bytes.
//!
//! The full-resolution page is stored as PNG because it is lossless; line
//! work and dimension text must survive exactly as rendered. The thumbnail is
//! only for list views, so it is JPEG at a configurable quality.

use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::{DynamicImage, ImageFormat, RgbImage};
use std::io::Cursor;
use tracing::debug;

/// Encode a page losslessly as PNG.
pub fn encode_png(img: &RgbImage) -> Result<Vec<u8>, image::ImageError> {
    let mut buf = Vec::new();
    DynamicImage::ImageRgb8(img.clone()).write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)?;
    debug!("Encoded {}x{} page → {} bytes PNG", img.width(), img.height(), buf.len());
    Ok(buf)
}

/// Encode an image as baseline JPEG at `quality` (1–100).
pub fn encode_jpeg(img: &RgbImage, quality: u8) -> Result<Vec<u8>, image::ImageError> {
    let mut buf = Vec::new();
    JpegEncoder::new_with_quality(&mut buf, quality.clamp(1, 100)).encode_image(img)?;
    Ok(buf)
}

/// Downscale so the longest side is at most `max_side`, keeping aspect ratio.
///
/// Returns `None` when the image already fits; images are never upscaled.
pub fn fit_within(img: &RgbImage, max_side: u32) -> Option<RgbImage> {
    let (w, h) = img.dimensions();
    let longest = w.max(h);
    if longest <= max_side || max_side == 0 {
        return None;
    }
    let scale = f64::from(max_side) / f64::from(longest);
    let nw = ((f64::from(w) * scale).round() as u32).max(1);
    let nh = ((f64::from(h) * scale).round() as u32).max(1);
    Some(imageops::resize(img, nw, nh, FilterType::Triangle))
}

/// A JPEG thumbnail and its dimensions.
#[derive(Debug, Clone)]
pub struct Thumbnail {
    pub width: u32,
    pub height: u32,
    pub jpeg: Vec<u8>,
}

/// Build the page thumbnail: longest side at most `max_side`, JPEG at `quality`.
pub fn make_thumbnail(img: &RgbImage, max_side: u32, quality: u8) -> Result<Thumbnail, image::ImageError> {
    let jpeg;
    let (width, height) = match fit_within(img, max_side) {
        Some(small) => {
            jpeg = encode_jpeg(&small, quality)?;
            small.dimensions()
        }
        None => {
            jpeg = encode_jpeg(img, quality)?;
            img.dimensions()
        }
    };
    debug!("Thumbnail {}x{} → {} bytes JPEG (q={})", width, height, jpeg.len(), quality);
    Ok(Thumbnail { width, height, jpeg })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn png_is_lossless() {
        let mut img = RgbImage::from_pixel(10, 6, Rgb([255, 0, 0]));
        img.put_pixel(3, 4, Rgb([1, 2, 3]));
        let bytes = encode_png(&img).expect("encode should succeed");
        assert!(bytes.starts_with(b"\x89PNG"));
        let back = image::load_from_memory(&bytes).unwrap().to_rgb8();
        assert_eq!(back, img);
    }

    #[test]
    fn jpeg_has_soi_marker() {
        let img = RgbImage::from_pixel(16, 16, Rgb([120, 130, 140]));
        let bytes = encode_jpeg(&img, 85).unwrap();
        assert_eq!(&bytes[..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn fit_within_keeps_aspect() {
        let img = RgbImage::new(4000, 3000);
        let small = fit_within(&img, 400).unwrap();
        assert_eq!(small.dimensions(), (400, 300));

        let tall = RgbImage::new(1000, 3000);
        assert_eq!(fit_within(&tall, 400).unwrap().dimensions(), (133, 400));
    }

    #[test]
    fn fit_within_never_upscales() {
        assert!(fit_within(&RgbImage::new(300, 200), 400).is_none());
        assert!(fit_within(&RgbImage::new(400, 400), 400).is_none());
    }

    #[test]
    fn thumbnail_bounded_by_max_side() {
        let img = RgbImage::from_pixel(1200, 500, Rgb([200, 200, 200]));
        let thumb = make_thumbnail(&img, 400, 85).unwrap();
        assert_eq!((thumb.width, thumb.height), (400, 167));
        let decoded = image::load_from_memory(&thumb.jpeg).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (400, 167));
    }

    #[test]
    fn small_image_thumbnail_keeps_size() {
        let img = RgbImage::from_pixel(50, 20, Rgb([0, 0, 0]));
        let thumb = make_thumbnail(&img, 400, 85).unwrap();
        assert_eq!((thumb.width, thumb.height), (50, 20));
    }
}
