//! # Depth estimation tests

use approx::assert_relative_eq;

use cv_stereo_tuner::depth::{depth_from_metric_focal, depth_from_pixel_focal, estimate_depth};
use cv_stereo_tuner::prelude::*;

#[test]
fn pixel_focal_depth() {
    assert_relative_eq!(depth_from_pixel_focal(700.0, 60.0, 35).unwrap(), 1200.0);
    assert_relative_eq!(
        depth_from_pixel_focal(700.0, 0.12, 255).unwrap(),
        84.0 / 255.0,
        max_relative = 1e-12
    );
}

#[test]
fn metric_focal_is_converted_to_pixels() {
    // 4 mm focal on a 6.4 mm sensor imaged at 640 px is a 400 px focal length
    let depth = depth_from_metric_focal(4.0, 640, 6.4, 0.1, 20).unwrap();
    assert_relative_eq!(depth, 2.0, epsilon = 1e-12);

    let inputs = CalibrationInputs {
        focal_length: 4.0,
        sensor_width: 6.4,
        baseline: 0.1,
        image_width: 640
    };
    assert_relative_eq!(
        estimate_depth(&inputs, DepthMode::MetricFocal, 20).unwrap(),
        2.0,
        epsilon = 1e-12
    );
}

#[test]
fn unknown_or_zero_disparity_has_no_depth() {
    let inputs = CalibrationInputs {
        focal_length: 700.0,
        sensor_width: 6.4,
        baseline: 60.0,
        image_width: 640
    };

    for &mode in &[DepthMode::PixelFocal, DepthMode::MetricFocal] {
        assert_eq!(estimate_depth(&inputs, mode, -1), None);
        assert_eq!(estimate_depth(&inputs, mode, 0), None);
    }
}

#[test]
fn degenerate_sensor_width_has_no_depth() {
    assert_eq!(depth_from_metric_focal(4.0, 640, 0.0, 0.1, 20), None);
}
