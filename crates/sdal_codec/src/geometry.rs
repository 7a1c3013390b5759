//! Fixed-point geometry types.
//!
//! Coordinates are stored as signed 32-bit integers in units of
//! 10^-precision degrees. Integer storage keeps geometry byte-stable across
//! platforms; floating point appears only at the quantization boundary.

use crate::error::{CodecError, CodecResult};

/// Default number of decimal digits preserved by quantization.
pub const DEFAULT_PRECISION: u8 = 6;

/// Highest precision whose scaled coordinate range still fits an i32.
pub const MAX_PRECISION: u8 = 7;

/// Quantizes a coordinate in degrees to fixed-point units.
///
/// Rounds half away from zero. Fails if the precision is unsupported or the
/// scaled magnitude does not fit an i32.
pub fn quantize(axis: &'static str, degrees: f64, precision: u8) -> CodecResult<i32> {
    if precision > MAX_PRECISION {
        return Err(CodecError::UnsupportedPrecision {
            precision,
            max: MAX_PRECISION,
        });
    }
    let scaled = (degrees * 10f64.powi(i32::from(precision))).round();
    if !scaled.is_finite() || scaled < f64::from(i32::MIN) || scaled > f64::from(i32::MAX) {
        return Err(CodecError::CoordinateOutOfRange {
            axis,
            degrees,
            precision,
        });
    }
    Ok(scaled as i32)
}

/// Converts fixed-point units back to degrees.
#[must_use]
pub fn dequantize(units: i32, precision: u8) -> f64 {
    f64::from(units) / 10f64.powi(i32::from(precision))
}

/// A quantized latitude/longitude pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GeometryPoint {
    /// Latitude in fixed-point units.
    pub lat: i32,
    /// Longitude in fixed-point units.
    pub lon: i32,
}

impl GeometryPoint {
    /// Creates a new point.
    #[must_use]
    pub const fn new(lat: i32, lon: i32) -> Self {
        Self { lat, lon }
    }
}

/// Axis-aligned bounding box in fixed-point units, inclusive on all sides.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Extent {
    /// Southern bound.
    pub min_lat: i32,
    /// Western bound.
    pub min_lon: i32,
    /// Northern bound.
    pub max_lat: i32,
    /// Eastern bound.
    pub max_lon: i32,
}

impl Extent {
    /// Creates a degenerate extent covering a single point.
    #[must_use]
    pub const fn from_point(point: GeometryPoint) -> Self {
        Self {
            min_lat: point.lat,
            min_lon: point.lon,
            max_lat: point.lat,
            max_lon: point.lon,
        }
    }

    /// Creates an extent from explicit bounds.
    #[must_use]
    pub const fn new(min_lat: i32, min_lon: i32, max_lat: i32, max_lon: i32) -> Self {
        Self {
            min_lat,
            min_lon,
            max_lat,
            max_lon,
        }
    }

    /// Grows the extent to cover `point`.
    pub fn expand(&mut self, point: GeometryPoint) {
        self.min_lat = self.min_lat.min(point.lat);
        self.min_lon = self.min_lon.min(point.lon);
        self.max_lat = self.max_lat.max(point.lat);
        self.max_lon = self.max_lon.max(point.lon);
    }

    /// Grows the extent to cover `other`.
    pub fn merge(&mut self, other: &Extent) {
        self.min_lat = self.min_lat.min(other.min_lat);
        self.min_lon = self.min_lon.min(other.min_lon);
        self.max_lat = self.max_lat.max(other.max_lat);
        self.max_lon = self.max_lon.max(other.max_lon);
    }

    /// Checks whether `point` lies inside the extent.
    #[must_use]
    pub const fn contains(&self, point: GeometryPoint) -> bool {
        point.lat >= self.min_lat
            && point.lat <= self.max_lat
            && point.lon >= self.min_lon
            && point.lon <= self.max_lon
    }

    /// Checks whether two extents overlap.
    #[must_use]
    pub const fn intersects(&self, other: &Extent) -> bool {
        self.min_lat <= other.max_lat
            && self.max_lat >= other.min_lat
            && self.min_lon <= other.max_lon
            && self.max_lon >= other.min_lon
    }

    /// Returns the center point, truncating toward zero on odd spans.
    #[must_use]
    pub fn midpoint(&self) -> GeometryPoint {
        let lat = (i64::from(self.min_lat) + i64::from(self.max_lat)) / 2;
        let lon = (i64::from(self.min_lon) + i64::from(self.max_lon)) / 2;
        GeometryPoint::new(lat as i32, lon as i32)
    }

    /// Computes the extent of a point sequence, or `None` when it is empty.
    #[must_use]
    pub fn of_points(points: &[GeometryPoint]) -> Option<Self> {
        let (first, rest) = points.split_first()?;
        let mut extent = Self::from_point(*first);
        for point in rest {
            extent.expand(*point);
        }
        Some(extent)
    }
}
