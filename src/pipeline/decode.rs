//! Raster decoding for image uploads.
//!
//! The declared MIME type only decides "image vs. PDF"; the actual codec is
//! sniffed from the bytes, so a PNG uploaded as `image/jpeg` still decodes.
//! EXIF orientation is applied here so every later stage sees the page the
//! way the photographer held it, and any embedded resolution is kept as the
//! page's DPI hint.

use crate::pipeline::input::DocumentKind;
use image::{DynamicImage, RgbImage};
use std::io::Cursor;
use tracing::debug;

/// Decoded 3-channel bitmap owned by the step processing it.
#[derive(Debug, Clone)]
pub struct RasterImage {
    pub pixels: RgbImage,
    /// Resolution recorded in the source, if any.
    pub dpi_hint: Option<u32>,
}

impl RasterImage {
    pub fn new(pixels: RgbImage) -> Self {
        Self {
            pixels,
            dpi_hint: None,
        }
    }

    pub fn with_dpi_hint(mut self, dpi: Option<u32>) -> Self {
        self.dpi_hint = dpi.filter(|d| (MIN_PLAUSIBLE_DPI..=MAX_PLAUSIBLE_DPI).contains(d));
        self
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }
}

const MIN_PLAUSIBLE_DPI: u32 = 50;
const MAX_PLAUSIBLE_DPI: u32 = 2400;

/// Decode an uploaded raster into a [`RasterImage`].
///
/// Returns the codec's message on failure; the caller attaches the page number.
pub fn decode_raster(bytes: &[u8], kind: DocumentKind) -> Result<RasterImage, String> {
    if bytes.is_empty() {
        return Err("empty file".to_string());
    }
    let image = image::load_from_memory(bytes).map_err(|e| match kind {
        DocumentKind::Heic => format!("HEIC images cannot be decoded by this build: {e}"),
        _ => e.to_string(),
    })?;

    let orientation = read_exif_orientation(bytes);
    let image = apply_orientation(image, orientation);
    let dpi = read_dpi_hint(bytes);
    debug!(
        "Decoded {} upload: {}x{} px, orientation {}, dpi hint {:?}",
        kind,
        image.width(),
        image.height(),
        orientation,
        dpi
    );

    Ok(RasterImage::new(image.to_rgb8()).with_dpi_hint(dpi))
}

/// EXIF orientation tag (1–8); 1 when absent or unreadable.
pub fn read_exif_orientation(bytes: &[u8]) -> u32 {
    let mut cursor = Cursor::new(bytes);
    exif::Reader::new()
        .read_from_container(&mut cursor)
        .ok()
        .and_then(|exif| {
            exif.get_field(exif::Tag::Orientation, exif::In::PRIMARY)
                .and_then(|f| f.value.get_uint(0))
        })
        .filter(|o| (1..=8).contains(o))
        .unwrap_or(1)
}

/// Undo the camera transform described by an EXIF orientation value.
pub fn apply_orientation(image: DynamicImage, orientation: u32) -> DynamicImage {
    match orientation {
        2 => image.fliph(),
        3 => image.rotate180(),
        4 => image.flipv(),
        5 => image.rotate90().fliph(),
        6 => image.rotate90(),
        7 => image.rotate270().fliph(),
        8 => image.rotate270(),
        _ => image,
    }
}

/// Horizontal resolution embedded in the file: PNG `pHYs` first, then EXIF.
pub fn read_dpi_hint(bytes: &[u8]) -> Option<u32> {
    read_png_dpi(bytes).or_else(|| read_exif_dpi(bytes))
}

fn read_png_dpi(bytes: &[u8]) -> Option<u32> {
    if !bytes.starts_with(b"\x89PNG") {
        return None;
    }
    let reader = png::Decoder::new(Cursor::new(bytes)).read_info().ok()?;
    let dims = reader.info().pixel_dims?;
    match dims.unit {
        png::Unit::Meter if dims.xppu > 0 => Some((f64::from(dims.xppu) * 0.0254).round() as u32),
        _ => None,
    }
}

fn read_exif_dpi(bytes: &[u8]) -> Option<u32> {
    let mut cursor = Cursor::new(bytes);
    let exif = exif::Reader::new().read_from_container(&mut cursor).ok()?;
    let field = exif.get_field(exif::Tag::XResolution, exif::In::PRIMARY)?;
    let per_unit = match field.value {
        exif::Value::Rational(ref v) if !v.is_empty() && v[0].denom != 0 => v[0].to_f64(),
        _ => return None,
    };
    // ResolutionUnit: 2 = inch (default), 3 = centimetre.
    let unit = exif
        .get_field(exif::Tag::ResolutionUnit, exif::In::PRIMARY)
        .and_then(|f| f.value.get_uint(0))
        .unwrap_or(2);
    let dpi = match unit {
        3 => per_unit * 2.54,
        _ => per_unit,
    };
    (dpi.is_finite() && dpi > 0.0).then(|| dpi.round() as u32)
}
