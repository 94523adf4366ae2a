//! # Rectification tests

// -----------------------------------------------------------------------------------------------
// IMPORTS
// -----------------------------------------------------------------------------------------------

use approx::assert_relative_eq;
use image::{GrayImage, Luma};
use nalgebra::{Matrix3, Rotation3, Vector3, Vector4};
use std::fs;

use cv_stereo_tuner::calibration::{CameraIntrinsics, Distortion, StereoCalibration};
use cv_stereo_tuner::prelude::*;
use cv_stereo_tuner::rectify::{rectify_frame, stereo_rectify, Rectifier};
use cv_stereo_tuner::Error;

// -----------------------------------------------------------------------------------------------
// CONSTANTS
// -----------------------------------------------------------------------------------------------

const WIDTH: u32 = 40;
const HEIGHT: u32 = 30;

const INTRINSICS_YML: &str = "%YAML:1.0
---
M1: !!opencv-matrix
   rows: 3
   cols: 3
   dt: d
   data: [ 500.0, 0.0, 319.5, 0.0, 500.0, 239.5, 0.0, 0.0, 1.0 ]
D1: !!opencv-matrix
   rows: 1
   cols: 5
   dt: d
   data: [ -0.1, 0.01, 0.0, 0.0, 0.0 ]
M2: !!opencv-matrix
   rows: 3
   cols: 3
   dt: d
   data: [ 510.0, 0.0, 320.0, 0.0, 505.0, 240.0, 0.0, 0.0, 1.0 ]
D2: !!opencv-matrix
   rows: 1
   cols: 5
   dt: d
   data: [ -0.12, 0.02, 0.0, 0.0, 0.0 ]
";

const EXTRINSICS_XML: &str = r#"<?xml version="1.0"?>
<opencv_storage>
<R type_id="opencv-matrix">
  <rows>3</rows>
  <cols>3</cols>
  <dt>d</dt>
  <data>
    1. 0. 0. 0. 1. 0. 0. 0. 1.</data></R>
<T type_id="opencv-matrix">
  <rows>3</rows>
  <cols>1</cols>
  <dt>d</dt>
  <data>
    -0.12 0. 0.</data></T>
</opencv_storage>
"#;

// -----------------------------------------------------------------------------------------------
// FUNCTIONS
// -----------------------------------------------------------------------------------------------

fn pinhole(f: f64, width: u32, height: u32) -> CameraIntrinsics {
    let cx = (width - 1) as f64 / 2.0;
    let cy = (height - 1) as f64 / 2.0;

    CameraIntrinsics::new(
        Matrix3::new(f, 0.0, cx, 0.0, f, cy, 0.0, 0.0, 1.0),
        Distortion::default()
    )
}

fn aligned_rig() -> StereoCalibration {
    StereoCalibration {
        left: pinhole(100.0, WIDTH, HEIGHT),
        right: pinhole(100.0, WIDTH, HEIGHT),
        rotation: Matrix3::identity(),
        translation: Vector3::new(-0.1, 0.0, 0.0)
    }
}

fn pattern() -> GrayImage {
    GrayImage::from_fn(WIDTH, HEIGHT, |x, y| Luma([(x * 5 + y * 2) as u8]))
}

// -----------------------------------------------------------------------------------------------
// TESTS
// -----------------------------------------------------------------------------------------------

#[test]
fn aligned_rig_is_left_untouched() {
    let frame = StereoFrame::from_gray(pattern(), pattern()).unwrap();
    let rectified = rectify_frame(&aligned_rig(), &frame).unwrap();

    // Bilinear sampling drops the last row and column, so only the interior is compared
    for y in 1..HEIGHT - 1 {
        for x in 1..WIDTH - 1 {
            let before = frame.left.get_pixel(x, y)[0] as i32;
            let after = rectified.frame.left.get_pixel(x, y)[0] as i32;
            assert!((before - after).abs() <= 1, "({}, {}): {} vs {}", x, y, before, after);
        }
    }

    let (roi1, roi2) = rectified.frame.valid_regions.unwrap();
    assert_eq!(roi1, ValidRegion::new(0, 0, WIDTH, HEIGHT));
    assert_eq!(roi2, ValidRegion::new(0, 0, WIDTH, HEIGHT));
}

#[test]
fn rectified_points_share_a_scanline() {
    let mut calib = aligned_rig();
    calib.right = CameraIntrinsics::new(
        Matrix3::new(104.0, 0.0, 20.5, 0.0, 102.0, 14.0, 0.0, 0.0, 1.0),
        Distortion::default()
    );
    calib.rotation = Rotation3::from_euler_angles(0.01, -0.03, 0.005).into_inner();
    calib.translation = Vector3::new(-0.1, 0.004, 0.002);

    let rect = stereo_rectify(&calib, WIDTH, HEIGHT).unwrap();
    let f = rect.p1[(0, 0)];
    let (cx, cy) = (rect.p1[(0, 2)], rect.p1[(1, 2)]);

    let point = Vector3::new(0.05, -0.03, 1.5);
    let left = rect.r1 * point;
    let right = rect.r2 * (calib.rotation * point + calib.translation);

    let (xl, yl) = (f * left.x / left.z + cx, f * left.y / left.z + cy);
    let (xr, yr) = (f * right.x / right.z + cx, f * right.y / right.z + cy);

    assert_relative_eq!(yl, yr, epsilon = 1e-9);
    assert!(xl > xr);

    // Reprojecting the disparity recovers the rectified depth
    let h = rect.q * Vector4::new(xl, yl, xl - xr, 1.0);
    assert_relative_eq!(h.z / h.w, left.z, epsilon = 1e-9);
}

#[test]
fn projections_share_focal_and_principal_point() {
    let rect = stereo_rectify(&aligned_rig(), WIDTH, HEIGHT).unwrap();

    assert_relative_eq!(rect.p1[(0, 0)], 100.0);
    assert_relative_eq!(rect.p1[(0, 2)], rect.p2[(0, 2)]);
    assert_relative_eq!(rect.p1[(1, 2)], rect.p2[(1, 2)]);
    assert_relative_eq!(rect.p2[(0, 3)], -10.0, epsilon = 1e-9);
    assert_relative_eq!(rect.r1, Matrix3::identity(), epsilon = 1e-12);
}

#[test]
fn malformed_calibration_is_refused() {
    let mut calib = aligned_rig();
    calib.rotation = Matrix3::identity() * 2.0;
    assert!(matches!(
        stereo_rectify(&calib, WIDTH, HEIGHT),
        Err(Error::Calibration(_))
    ));

    let mut calib = aligned_rig();
    calib.translation = Vector3::zeros();
    assert!(stereo_rectify(&calib, WIDTH, HEIGHT).is_err());

    let mut calib = aligned_rig();
    calib.translation = Vector3::new(0.0, -0.1, 0.0);
    assert!(stereo_rectify(&calib, WIDTH, HEIGHT).is_err());

    let mut calib = aligned_rig();
    calib.left.matrix[(2, 2)] = 0.0;
    assert!(stereo_rectify(&calib, WIDTH, HEIGHT).is_err());

    assert!(stereo_rectify(&aligned_rig(), 0, HEIGHT).is_err());
}

#[test]
fn frame_size_must_match_rectifier() {
    let rectifier = Rectifier::new(&aligned_rig(), WIDTH, HEIGHT).unwrap();
    let frame =
        StereoFrame::from_gray(GrayImage::new(WIDTH + 2, HEIGHT), GrayImage::new(WIDTH + 2, HEIGHT))
            .unwrap();

    assert!(rectifier.rectify(&frame).is_err());
}

#[test]
fn loads_opencv_calibration_files() {
    let dir = tempfile::tempdir().unwrap();
    let intrinsics = dir.path().join("intrinsics.yml");
    let extrinsics = dir.path().join("extrinsics.xml");
    fs::write(&intrinsics, INTRINSICS_YML).unwrap();
    fs::write(&extrinsics, EXTRINSICS_XML).unwrap();

    let calib = StereoCalibration::load(&intrinsics, &extrinsics).unwrap();

    assert_relative_eq!(calib.left.matrix[(0, 2)], 319.5);
    assert_relative_eq!(calib.right.matrix[(1, 1)], 505.0);
    assert_relative_eq!(calib.left.distortion.coeffs[0], -0.1);
    assert_relative_eq!(calib.rotation, Matrix3::identity());
    assert_relative_eq!(calib.translation, Vector3::new(-0.12, 0.0, 0.0));

    assert!(stereo_rectify(&calib, 640, 480).is_ok());
}

#[test]
fn missing_calibration_key_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let intrinsics = dir.path().join("intrinsics.yml");
    let extrinsics = dir.path().join("extrinsics.xml");
    fs::write(&intrinsics, INTRINSICS_YML.replace("M2:", "M3:")).unwrap();
    fs::write(&extrinsics, EXTRINSICS_XML).unwrap();

    match StereoCalibration::load(&intrinsics, &extrinsics) {
        Err(Error::Calibration(msg)) => assert!(msg.contains("M2"), "{}", msg),
        other => panic!("expected a calibration error, got {:?}", other)
    }
}
