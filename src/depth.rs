//! # Depth estimation
//!
//! Triangulates depth from a single disparity sample, `depth = f_px * baseline / disparity`.

// -----------------------------------------------------------------------------------------------
// IMPORTS
// -----------------------------------------------------------------------------------------------

use serde::{Deserialize, Serialize};

// -----------------------------------------------------------------------------------------------
// ENUMERATIONS
// -----------------------------------------------------------------------------------------------

/// Unit of the focal length supplied by the operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DepthMode {
    /// Focal length is already in pixels.
    PixelFocal,

    /// Focal length is in the same unit as the sensor width and is converted with the image width.
    MetricFocal
}

// -----------------------------------------------------------------------------------------------
// DATA STRUCTURES
// -----------------------------------------------------------------------------------------------

/// Calibration quantities captured at click time.
///
/// Depth comes out in the unit of `baseline`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalibrationInputs {
    pub focal_length: f64,
    pub sensor_width: f64,
    pub baseline: f64,
    pub image_width: u32
}

/// A depth query at a pixel of the visualisation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DepthProbe {
    pub x: u32,
    pub y: u32,
    /// Sampled disparity, -1 when unknown.
    pub disparity: i32,
    pub depth: Option<f64>
}

// -----------------------------------------------------------------------------------------------
// FUNCTIONS
// -----------------------------------------------------------------------------------------------

/// Depth from a focal length expressed in pixels.
///
/// Returns `None` for non-positive disparities.
pub fn depth_from_pixel_focal(focal_px: f64, baseline: f64, disparity: i32) -> Option<f64> {
    if disparity <= 0 {
        return None;
    }

    let depth = focal_px * baseline / disparity as f64;
    if depth.is_finite() {
        Some(depth)
    }
    else {
        None
    }
}

/// Depth from a metric focal length, converted to pixels with the sensor and image widths.
pub fn depth_from_metric_focal(
    focal_length: f64,
    image_width: u32,
    sensor_width: f64,
    baseline: f64,
    disparity: i32
) -> Option<f64> {
    let focal_px = focal_length * image_width as f64 / sensor_width;

    depth_from_pixel_focal(focal_px, baseline, disparity)
}

pub fn estimate_depth(inputs: &CalibrationInputs, mode: DepthMode, disparity: i32) -> Option<f64> {
    match mode {
        DepthMode::PixelFocal => {
            depth_from_pixel_focal(inputs.focal_length, inputs.baseline, disparity)
        }
        DepthMode::MetricFocal => depth_from_metric_focal(
            inputs.focal_length,
            inputs.image_width,
            inputs.sensor_width,
            inputs.baseline,
            disparity
        )
    }
}
