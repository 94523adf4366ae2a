//! # Rectification
//!
//! Turns a calibrated raw stereo pair into an epipolar aligned pair: both views are rotated so
//! that corresponding points share a scanline, with the principal points aligned so that points at
//! infinity have zero disparity.
//!
//! This runs once, before a session starts.

// -----------------------------------------------------------------------------------------------
// IMPORTS
// -----------------------------------------------------------------------------------------------

use image::{GrayImage, Luma, Rgb, RgbImage};
use imageproc::geometric_transformations::{warp_with, Interpolation};
use log::info;
use nalgebra::{Matrix3, Matrix3x4, Matrix4, Rotation3, Vector3};

use crate::calibration::{CameraIntrinsics, StereoCalibration};
use crate::error::*;
use crate::frame::{StereoFrame, ValidRegion};

// -----------------------------------------------------------------------------------------------
// CONSTANTS
// -----------------------------------------------------------------------------------------------

/// Points sampled along each image edge when searching for the valid region.
const EDGE_SAMPLES: usize = 9;

/// Tolerance on the orthonormality of the rotation read from file.
const ROTATION_TOLERANCE: f64 = 1e-3;

// -----------------------------------------------------------------------------------------------
// DATA STRUCTURES
// -----------------------------------------------------------------------------------------------

/// Rectifying rotations and projections for both cameras.
#[derive(Debug, Clone, PartialEq)]
pub struct Rectification {
    pub r1: Matrix3<f64>,
    pub r2: Matrix3<f64>,
    pub p1: Matrix3x4<f64>,
    pub p2: Matrix3x4<f64>,
    /// Disparity-to-depth mapping, `[x y d 1] -> [X Y Z W]`.
    pub q: Matrix4<f64>,
    pub roi1: ValidRegion,
    pub roi2: ValidRegion
}

/// Per-pixel lookup from rectified pixel to source pixel.
#[derive(Debug, Clone)]
pub struct RemapTable {
    width: u32,
    height: u32,
    map: Vec<(f32, f32)>
}

pub struct Rectifier {
    rectification: Rectification,
    left_map: RemapTable,
    right_map: RemapTable
}

/// A rectified frame and the matching disparity-to-depth matrix.
#[derive(Debug, Clone)]
pub struct RectifiedPair {
    pub frame: StereoFrame,
    pub q: Matrix4<f64>
}

// -----------------------------------------------------------------------------------------------
// FUNCTIONS
// -----------------------------------------------------------------------------------------------

/// Compute rectifying rotations, new projections and valid regions for a horizontal stereo rig.
pub fn stereo_rectify(calib: &StereoCalibration, width: u32, height: u32) -> Result<Rectification> {
    if width == 0 || height == 0 {
        return Err(Error::Calibration("image size must be non-zero".into()));
    }

    check_camera(&calib.left, "M1")?;
    check_camera(&calib.right, "M2")?;
    let rotation = check_rotation(&calib.rotation)?;

    // Split the relative rotation evenly between the two cameras
    let om = rotation.scaled_axis();
    let r_r = Rotation3::from_scaled_axis(om * -0.5).into_inner();
    let t = r_r * calib.translation;

    let nt = t.norm();
    if nt <= f64::EPSILON {
        return Err(Error::Calibration("baseline must be non-zero".into()));
    }
    if t.y.abs() >= t.x.abs() {
        return Err(Error::Calibration("only horizontal stereo rigs are supported".into()));
    }

    // Rotate the baseline onto the x axis
    let c = t.x;
    let uu = Vector3::new(if c > 0.0 { 1.0 } else { -1.0 }, 0.0, 0.0);
    let mut ww = t.cross(&uu);
    let nw = ww.norm();
    if nw > 0.0 {
        ww *= (c.abs() / nt).acos() / nw;
    }
    let w_r = Rotation3::from_scaled_axis(ww).into_inner();

    let r1 = w_r * r_r.transpose();
    let r2 = w_r * r_r;
    let t_new = r2 * calib.translation;

    let f = calib.left.matrix[(1, 1)].min(calib.right.matrix[(1, 1)]);

    // Principal points, shared so that disparity is zero at infinity
    let c1 = centring_offset(&calib.left, &r1, f, width, height);
    let c2 = centring_offset(&calib.right, &r2, f, width, height);
    let cx = 0.5 * (c1.0 + c2.0);
    let cy = 0.5 * (c1.1 + c2.1);

    let tx = t_new.x * f;

    #[rustfmt::skip]
    let p1 = Matrix3x4::new(
        f, 0.0, cx, 0.0,
        0.0, f, cy, 0.0,
        0.0, 0.0, 1.0, 0.0
    );
    #[rustfmt::skip]
    let p2 = Matrix3x4::new(
        f, 0.0, cx, tx,
        0.0, f, cy, 0.0,
        0.0, 0.0, 1.0, 0.0
    );
    #[rustfmt::skip]
    let q = Matrix4::new(
        1.0, 0.0, 0.0, -cx,
        0.0, 1.0, 0.0, -cy,
        0.0, 0.0, 0.0, f,
        0.0, 0.0, -1.0 / t_new.x, 0.0
    );

    let roi1 = valid_region(&calib.left, &r1, f, cx, cy, width, height);
    let roi2 = valid_region(&calib.right, &r2, f, cx, cy, width, height);

    Ok(Rectification { r1, r2, p1, p2, q, roi1, roi2 })
}

/// Rectify a frame in one go.
pub fn rectify_frame(calib: &StereoCalibration, frame: &StereoFrame) -> Result<RectifiedPair> {
    Rectifier::new(calib, frame.width(), frame.height())?.rectify(frame)
}

fn check_camera(camera: &CameraIntrinsics, key: &str) -> Result<()> {
    let m = &camera.matrix;
    let well_formed = m[(0, 0)] > 0.0
        && m[(1, 1)] > 0.0
        && m[(1, 0)] == 0.0
        && m[(2, 0)] == 0.0
        && m[(2, 1)] == 0.0
        && m[(2, 2)] == 1.0;

    if !well_formed || m.try_inverse().is_none() {
        return Err(Error::Calibration(format!("{} is not a valid camera matrix", key)));
    }

    Ok(())
}

fn check_rotation(r: &Matrix3<f64>) -> Result<Rotation3<f64>> {
    let orthonormal = (r.transpose() * r - Matrix3::identity()).norm() < ROTATION_TOLERANCE;

    if !orthonormal || (r.determinant() - 1.0).abs() > ROTATION_TOLERANCE {
        return Err(Error::Calibration("R is not a rotation matrix".into()));
    }

    Ok(Rotation3::from_matrix_unchecked(*r))
}

/// Project a raw pixel into the rectified view with focal `f` and principal point `(cx, cy)`.
fn rectified_point(
    camera: &CameraIntrinsics,
    r: &Matrix3<f64>,
    f: f64,
    (cx, cy): (f64, f64),
    (u, v): (f64, f64)
) -> (f64, f64) {
    let (x, y) = camera.undistort_point(u, v);
    let p = r * Vector3::new(x, y, 1.0);

    (f * p.x / p.z + cx, f * p.y / p.z + cy)
}

/// Principal point which centres the rectified image corners.
fn centring_offset(
    camera: &CameraIntrinsics,
    r: &Matrix3<f64>,
    f: f64,
    width: u32,
    height: u32
) -> (f64, f64) {
    let (w, h) = ((width - 1) as f64, (height - 1) as f64);
    let corners = [(0.0, 0.0), (w, 0.0), (0.0, h), (w, h)];

    let (sx, sy) = corners
        .iter()
        .map(|&pt| rectified_point(camera, r, f, (0.0, 0.0), pt))
        .fold((0.0, 0.0), |(ax, ay), (x, y)| (ax + x, ay + y));

    (0.5 * w - sx / 4.0, 0.5 * h - sy / 4.0)
}

/// Largest axis aligned rectangle of the rectified view covered by the raw image.
fn valid_region(
    camera: &CameraIntrinsics,
    r: &Matrix3<f64>,
    f: f64,
    cx: f64,
    cy: f64,
    width: u32,
    height: u32
) -> ValidRegion {
    let (w, h) = ((width - 1) as f64, (height - 1) as f64);
    let project = |pt| rectified_point(camera, r, f, (cx, cy), pt);

    let mut left = 0.0f64;
    let mut right = w;
    let mut top = 0.0f64;
    let mut bottom = h;

    for i in 0..EDGE_SAMPLES {
        let s = i as f64 / (EDGE_SAMPLES - 1) as f64;
        left = left.max(project((0.0, s * h)).0);
        right = right.min(project((w, s * h)).0);
        top = top.max(project((s * w, 0.0)).1);
        bottom = bottom.min(project((s * w, h)).1);
    }

    let x0 = (left - 1e-6).ceil();
    let y0 = (top - 1e-6).ceil();
    let x1 = (right + 1e-6).floor();
    let y1 = (bottom + 1e-6).floor();

    if !(x1 >= x0 && y1 >= y0) {
        return ValidRegion::default();
    }

    ValidRegion::new(x0 as u32, y0 as u32, (x1 - x0) as u32 + 1, (y1 - y0) as u32 + 1)
}

// -----------------------------------------------------------------------------------------------
// IMPLEMENTATIONS
// -----------------------------------------------------------------------------------------------

impl RemapTable {
    /// Build the undistort-rectify lookup for one camera.
    pub fn new(
        camera: &CameraIntrinsics,
        r: &Matrix3<f64>,
        p: &Matrix3x4<f64>,
        width: u32,
        height: u32
    ) -> Self {
        let (fx, fy, cx, cy) = (p[(0, 0)], p[(1, 1)], p[(0, 2)], p[(1, 2)]);
        let r_inv = r.transpose();
        let mut map = Vec::with_capacity(width as usize * height as usize);

        for v in 0..height {
            for u in 0..width {
                let ray = r_inv * Vector3::new((u as f64 - cx) / fx, (v as f64 - cy) / fy, 1.0);
                let (us, vs) = camera.distort_point(ray.x / ray.z, ray.y / ray.z);
                map.push((us as f32, vs as f32));
            }
        }

        Self { width, height, map }
    }

    /// Source pixel sampled for a rectified pixel.
    pub fn source(&self, x: u32, y: u32) -> Option<(f32, f32)> {
        if x >= self.width || y >= self.height {
            return None;
        }

        Some(self.map[(y * self.width + x) as usize])
    }

    fn lookup(&self, x: f32, y: f32) -> (f32, f32) {
        self.source(x as u32, y as u32).unwrap_or((-1.0, -1.0))
    }

    pub fn remap_gray(&self, image: &GrayImage) -> GrayImage {
        warp_with(image, |x, y| self.lookup(x, y), Interpolation::Bilinear, Luma([0]))
    }

    pub fn remap_rgb(&self, image: &RgbImage) -> RgbImage {
        warp_with(image, |x, y| self.lookup(x, y), Interpolation::Bilinear, Rgb([0, 0, 0]))
    }
}

impl Rectifier {
    pub fn new(calib: &StereoCalibration, width: u32, height: u32) -> Result<Self> {
        let rectification = stereo_rectify(calib, width, height)?;
        let left_map =
            RemapTable::new(&calib.left, &rectification.r1, &rectification.p1, width, height);
        let right_map =
            RemapTable::new(&calib.right, &rectification.r2, &rectification.p2, width, height);

        info!(
            "Rectification valid regions: left {:?}, right {:?}",
            rectification.roi1, rectification.roi2
        );

        Ok(Self {
            rectification,
            left_map,
            right_map
        })
    }

    pub fn rectification(&self) -> &Rectification {
        &self.rectification
    }

    /// Remap the grayscale and colour images of a raw frame.
    pub fn rectify(&self, frame: &StereoFrame) -> Result<RectifiedPair> {
        if frame.width() != self.left_map.width || frame.height() != self.left_map.height {
            return Err(Error::Calibration(format!(
                "frame is {}x{} but rectification was computed for {}x{}",
                frame.width(),
                frame.height(),
                self.left_map.width,
                self.left_map.height
            )));
        }

        let frame = StereoFrame {
            left: self.left_map.remap_gray(&frame.left),
            right: self.right_map.remap_gray(&frame.right),
            left_color: self.left_map.remap_rgb(&frame.left_color),
            right_color: self.right_map.remap_rgb(&frame.right_color),
            valid_regions: Some((self.rectification.roi1, self.rectification.roi2))
        };

        Ok(RectifiedPair {
            frame,
            q: self.rectification.q
        })
    }
}
