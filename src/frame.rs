//! # Stereo frames
//!
//! The working image pair held for a tuning session, and the valid pixel regions produced by
//! rectification.

// -----------------------------------------------------------------------------------------------
// IMPORTS
// -----------------------------------------------------------------------------------------------

use image::{DynamicImage, GrayImage, ImageBuffer, Luma, RgbImage};
use serde::{Deserialize, Serialize};

use crate::error::*;

// -----------------------------------------------------------------------------------------------
// TYPES
// -----------------------------------------------------------------------------------------------

/// Single channel floating point image.
pub type GrayFloatImage = ImageBuffer<Luma<f32>, Vec<f32>>;

// -----------------------------------------------------------------------------------------------
// DATA STRUCTURES
// -----------------------------------------------------------------------------------------------

/// Sub-rectangle of a rectified image covered by both cameras.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ValidRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32
}

/// The left/right pair a session works on.
///
/// Fixed for the lifetime of a session. The grayscale pair feeds the matcher, the colour pair is
/// kept for display only.
#[derive(Debug, Clone)]
pub struct StereoFrame {
    pub left: GrayImage,
    pub right: GrayImage,
    pub left_color: RgbImage,
    pub right_color: RgbImage,
    pub valid_regions: Option<(ValidRegion, ValidRegion)>
}

// -----------------------------------------------------------------------------------------------
// IMPLEMENTATIONS
// -----------------------------------------------------------------------------------------------

impl ValidRegion {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn contains(&self, x: u32, y: u32) -> bool {
        x >= self.x && y >= self.y && x - self.x < self.width && y - self.y < self.height
    }
}

impl StereoFrame {
    /// Build a frame from a decoded colour pair, deriving the grayscale images.
    pub fn from_color(left_color: RgbImage, right_color: RgbImage) -> Result<Self> {
        if left_color.dimensions() != right_color.dimensions() {
            return Err(Error::ImageSizeMismatch {
                left: left_color.dimensions(),
                right: right_color.dimensions()
            });
        }

        let left = DynamicImage::ImageRgb8(left_color.clone()).to_luma();
        let right = DynamicImage::ImageRgb8(right_color.clone()).to_luma();

        Ok(Self {
            left,
            right,
            left_color,
            right_color,
            valid_regions: None
        })
    }

    /// Build a frame from a grayscale pair. The colour pair is the grayscale pair expanded.
    pub fn from_gray(left: GrayImage, right: GrayImage) -> Result<Self> {
        if left.dimensions() != right.dimensions() {
            return Err(Error::ImageSizeMismatch {
                left: left.dimensions(),
                right: right.dimensions()
            });
        }

        let left_color = DynamicImage::ImageLuma8(left.clone()).to_rgb();
        let right_color = DynamicImage::ImageLuma8(right.clone()).to_rgb();

        Ok(Self {
            left,
            right,
            left_color,
            right_color,
            valid_regions: None
        })
    }

    /// Load and decode both images from disk.
    pub fn open<P: AsRef<std::path::Path>>(left: P, right: P) -> Result<Self> {
        let left = image::open(left)?.to_rgb();
        let right = image::open(right)?.to_rgb();

        Self::from_color(left, right)
    }

    pub fn width(&self) -> u32 {
        self.left.width()
    }

    pub fn height(&self) -> u32 {
        self.left.height()
    }
}

// -----------------------------------------------------------------------------------------------
// TESTS
// -----------------------------------------------------------------------------------------------
