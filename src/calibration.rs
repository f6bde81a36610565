//! Calibration: turn two pixel points and a known real-world distance into
//! a pixels-per-unit scale for a page.
//!
//! [`compute_scale`] is a pure function. [`PageCalibrations`] models the
//! at-most-one-calibration-per-page rule: recalibrating a page replaces the
//! previous scale instead of adding a second one.

use crate::error::IngestError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::str::FromStr;

/// A pixel position on a page raster. Coordinates are non-negative by type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PixelPoint {
    pub x: u32,
    pub y: u32,
}

impl PixelPoint {
    pub const fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }

    /// Euclidean distance in pixels.
    pub fn distance_to(self, other: PixelPoint) -> f64 {
        let dx = f64::from(other.x) - f64::from(self.x);
        let dy = f64::from(other.y) - f64::from(self.y);
        dx.hypot(dy)
    }
}

/// Real-world length unit of a calibration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LengthUnit {
    #[serde(rename = "FT")]
    Foot,
    #[serde(rename = "IN")]
    Inch,
    #[serde(rename = "MM")]
    Millimeter,
}

impl LengthUnit {
    /// Length of one unit in millimetres.
    pub fn millimeters(self) -> f64 {
        match self {
            LengthUnit::Foot => 304.8,
            LengthUnit::Inch => 25.4,
            LengthUnit::Millimeter => 1.0,
        }
    }

    /// Convert `value` expressed in `self` into `target` units.
    pub fn convert(self, value: f64, target: LengthUnit) -> f64 {
        value * self.millimeters() / target.millimeters()
    }

    pub fn code(self) -> &'static str {
        match self {
            LengthUnit::Foot => "FT",
            LengthUnit::Inch => "IN",
            LengthUnit::Millimeter => "MM",
        }
    }
}

impl fmt::Display for LengthUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for LengthUnit {
    type Err = IngestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ft" | "foot" | "feet" | "'" => Ok(LengthUnit::Foot),
            "in" | "inch" | "inches" | "\"" => Ok(LengthUnit::Inch),
            "mm" | "millimeter" | "millimeters" | "millimetre" | "millimetres" => {
                Ok(LengthUnit::Millimeter)
            }
            other => Err(IngestError::InvalidCalibration {
                reason: format!("unknown unit '{other}' (expected FT, IN or MM)"),
            }),
        }
    }
}

/// Pixels per real-world unit between two points.
///
/// The unit does not enter the arithmetic; the scale is expressed in whatever
/// unit `real_distance` was measured in, and [`CalibrationInput`] carries it
/// alongside the result.
///
/// # Errors
/// [`IngestError::InvalidDistance`] when `real_distance` is not a finite,
/// strictly positive number.
pub fn compute_scale(
    p1: PixelPoint,
    p2: PixelPoint,
    real_distance: f64,
    _unit: LengthUnit,
) -> Result<f64, IngestError> {
    if !real_distance.is_finite() || real_distance <= 0.0 {
        return Err(IngestError::InvalidDistance {
            distance: real_distance,
        });
    }
    Ok(p1.distance_to(p2) / real_distance)
}

/// User-supplied calibration for one page.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalibrationInput {
    pub p1: PixelPoint,
    pub p2: PixelPoint,
    pub real_distance: f64,
    pub unit: LengthUnit,
}

impl CalibrationInput {
    /// Validate and derive the scale.
    pub fn calibrate(self) -> Result<CalibrationResult, IngestError> {
        let pixels_per_unit = compute_scale(self.p1, self.p2, self.real_distance, self.unit)?;
        if self.p1 == self.p2 {
            return Err(IngestError::InvalidCalibration {
                reason: format!(
                    "calibration points coincide at ({}, {})",
                    self.p1.x, self.p1.y
                ),
            });
        }
        Ok(CalibrationResult {
            input: self,
            pixels_per_unit,
        })
    }
}

/// A validated calibration with its derived scale.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalibrationResult {
    #[serde(flatten)]
    pub input: CalibrationInput,
    pub pixels_per_unit: f64,
}

impl CalibrationResult {
    /// Scale expressed in another unit, e.g. pixels per inch for a foot calibration.
    pub fn pixels_per(&self, unit: LengthUnit) -> f64 {
        self.pixels_per_unit / self.input.unit.convert(1.0, unit)
    }

    /// Real-world length, in the calibration unit, of a pixel distance.
    pub fn to_real_distance(&self, pixels: f64) -> f64 {
        pixels / self.pixels_per_unit
    }

    /// Real-world distance, in the calibration unit, between two points on the page.
    pub fn measure(&self, a: PixelPoint, b: PixelPoint) -> f64 {
        self.to_real_distance(a.distance_to(b))
    }
}

/// At most one active calibration per page.
#[derive(Debug, Clone)]
pub struct PageCalibrations<K> {
    by_page: HashMap<K, CalibrationResult>,
}

impl<K> Default for PageCalibrations<K> {
    fn default() -> Self {
        Self {
            by_page: HashMap::new(),
        }
    }
}

impl<K: Eq + Hash> PageCalibrations<K> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate `input` and store it for `page`, replacing any previous
    /// calibration. Returns the replaced calibration, if any. Nothing is
    /// stored when validation fails.
    pub fn calibrate(
        &mut self,
        page: K,
        input: CalibrationInput,
    ) -> Result<(CalibrationResult, Option<CalibrationResult>), IngestError> {
        let result = input.calibrate()?;
        let previous = self.by_page.insert(page, result);
        Ok((result, previous))
    }

    pub fn get(&self, page: &K) -> Option<&CalibrationResult> {
        self.by_page.get(page)
    }

    pub fn remove(&mut self, page: &K) -> Option<CalibrationResult> {
        self.by_page.remove(page)
    }

    pub fn len(&self) -> usize {
        self.by_page.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_page.is_empty()
    }
}
