//! # General disparity objects
//!
//! This module provides the disparity map, the trait every correspondence engine implements, and
//! the displayable result of a recompute.

// -----------------------------------------------------------------------------------------------
// IMPORTS
// -----------------------------------------------------------------------------------------------

use image::{GrayImage, Luma};
use std::time::Duration;

use crate::error::*;
use crate::frame::{GrayFloatImage, StereoFrame, ValidRegion};
use crate::params::MatcherParameters;

// -----------------------------------------------------------------------------------------------
// CONSTANTS
// -----------------------------------------------------------------------------------------------

/// Value engines write for pixels with no disparity estimate.
pub const UNKNOWN_DISPARITY: f32 = -1.0;

/// Shade given to unknown pixels in the normalised visualisation.
pub const UNKNOWN_SHADE: u8 = 0;

// -----------------------------------------------------------------------------------------------
// DATA STRUCTURES
// -----------------------------------------------------------------------------------------------

/// A generic floating point disparity map, in pixels.
///
/// Negative and non-finite values are unknown.
#[derive(Debug, Clone)]
pub struct DisparityMap {
    data: GrayFloatImage
}

/// The outcome of a successful recompute. Replaced wholesale, never edited.
#[derive(Debug, Clone)]
pub struct DisparityResult {
    pub raw: DisparityMap,
    pub normalised: GrayImage,
    pub elapsed: Duration
}

// -----------------------------------------------------------------------------------------------
// TRAITS
// -----------------------------------------------------------------------------------------------

/// A dense correspondence engine.
pub trait DisparityAlgorithm {
    /// Push a full parameter record into the engine.
    ///
    /// Either every value is taken or none is: on refusal the engine keeps its previous
    /// configuration and reports the offending field as `Error::AdapterConfiguration`.
    fn configure(&mut self, params: &MatcherParameters) -> Result<()>;

    /// Restrict matching to the valid regions of a rectified pair.
    fn set_valid_regions(&mut self, _left: ValidRegion, _right: ValidRegion) {}

    /// Compute the disparity map of the given stereo frame.
    fn compute(&mut self, frame: &StereoFrame) -> Result<DisparityMap>;
}

// -----------------------------------------------------------------------------------------------
// IMPLEMENTATIONS
// -----------------------------------------------------------------------------------------------

impl DisparityMap {
    /// Create a map of the given size with every pixel unknown.
    pub fn new(width: u32, height: u32) -> Self {
        DisparityMap {
            data: GrayFloatImage::from_pixel(width, height, Luma([UNKNOWN_DISPARITY]))
        }
    }

    pub fn from_image(data: GrayFloatImage) -> Self {
        DisparityMap { data }
    }

    pub fn width(&self) -> u32 {
        self.data.width()
    }

    pub fn height(&self) -> u32 {
        self.data.height()
    }

    pub fn put(&mut self, x: u32, y: u32, val: f32) {
        self.data.put_pixel(x, y, Luma([val]))
    }

    pub fn get(&self, x: u32, y: u32) -> f32 {
        self.data.get_pixel(x, y)[0]
    }

    pub fn is_known(val: f32) -> bool {
        val.is_finite() && val >= 0.0
    }

    /// Smallest and largest known disparity, or `None` if nothing is known.
    pub fn known_range(&self) -> Option<(f32, f32)> {
        self.data
            .pixels()
            .map(|p| p[0])
            .filter(|&v| Self::is_known(v))
            .fold(None, |acc, v| match acc {
                None => Some((v, v)),
                Some((lo, hi)) => Some((lo.min(v), hi.max(v)))
            })
    }

    /// Converts the map to a min-max stretched GrayImage.
    ///
    /// The stretch runs over known values only; unknown pixels take `UNKNOWN_SHADE`. A map whose
    /// known values are all equal maps them to 0.
    pub fn to_luma_normalised(&self) -> GrayImage {
        let (min, scale) = match self.known_range() {
            Some((lo, hi)) if hi > lo => (lo, 255.0 / (hi - lo)),
            Some((lo, _)) => (lo, 0.0),
            None => (0.0, 0.0)
        };

        GrayImage::from_fn(self.width(), self.height(), |x, y| {
            let val = self.get(x, y);

            if !Self::is_known(val) {
                return Luma([UNKNOWN_SHADE]);
            }

            let shade = ((val - min) * scale).round().max(0.0).min(255.0);
            Luma([shade as u8])
        })
    }
}

impl DisparityResult {
    pub fn new(raw: DisparityMap, elapsed: Duration) -> Self {
        let normalised = raw.to_luma_normalised();

        Self { raw, normalised, elapsed }
    }

    /// Intensity of the visualisation at a pixel, -1 where the raw disparity is unknown or the
    /// pixel is outside the map.
    pub fn sample(&self, x: u32, y: u32) -> i32 {
        if x >= self.normalised.width() || y >= self.normalised.height() {
            return -1;
        }

        if !DisparityMap::is_known(self.raw.get(x, y)) {
            return -1;
        }

        self.normalised.get_pixel(x, y)[0] as i32
    }

    pub fn elapsed_millis(&self) -> f64 {
        self.elapsed.as_secs_f64() * 1000.0
    }
}
