//! # Stereo calibration
//!
//! Camera intrinsics, lens distortion and the relative pose of the two cameras, loaded from
//! OpenCV FileStorage style files (`M1`, `D1`, `M2`, `D2` in the intrinsics file, `R` and `T` in
//! the extrinsics file).

// -----------------------------------------------------------------------------------------------
// IMPORTS
// -----------------------------------------------------------------------------------------------

use log::info;
use nalgebra::{Matrix3, Vector3};
use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::codec::{strip_yaml_directive, ParamFormat};
use crate::error::*;

// -----------------------------------------------------------------------------------------------
// CONSTANTS
// -----------------------------------------------------------------------------------------------

/// Fixed-point iterations used to invert the distortion model.
const UNDISTORT_ITERATIONS: usize = 5;

// -----------------------------------------------------------------------------------------------
// DATA STRUCTURES
// -----------------------------------------------------------------------------------------------

/// Lens distortion in OpenCV coefficient order: k1, k2, p1, p2, k3, k4, k5, k6.
///
/// k4..k6 are the denominator of the rational model and are zero otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Distortion {
    pub coeffs: [f64; 8]
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraIntrinsics {
    pub matrix: Matrix3<f64>,
    pub distortion: Distortion
}

/// Both cameras plus the pose of the right camera relative to the left, `X_r = R * X_l + T`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StereoCalibration {
    pub left: CameraIntrinsics,
    pub right: CameraIntrinsics,
    pub rotation: Matrix3<f64>,
    pub translation: Vector3<f64>
}

/// An OpenCV matrix node.
#[derive(Debug, Clone, Deserialize)]
struct MatrixNode {
    rows: usize,
    cols: usize,
    data: Vec<f64>
}

/// The XML flavour keeps `data` as whitespace separated text.
#[derive(Debug, Deserialize)]
struct XmlMatrixNode {
    rows: usize,
    cols: usize,
    data: String
}

#[derive(Debug, Deserialize)]
#[allow(non_snake_case)]
struct XmlStorage {
    M1: Option<XmlMatrixNode>,
    D1: Option<XmlMatrixNode>,
    M2: Option<XmlMatrixNode>,
    D2: Option<XmlMatrixNode>,
    R: Option<XmlMatrixNode>,
    T: Option<XmlMatrixNode>
}

/// A parsed calibration file, queried by key.
enum Storage {
    Yaml(serde_yaml::Value),
    Json(serde_json::Value),
    Xml(XmlStorage)
}

// -----------------------------------------------------------------------------------------------
// IMPLEMENTATIONS
// -----------------------------------------------------------------------------------------------

impl Distortion {
    pub fn from_slice(coeffs: &[f64]) -> Result<Self> {
        match coeffs.len() {
            0 | 4 | 5 | 8 => {
                let mut d = Distortion::default();
                d.coeffs[..coeffs.len()].copy_from_slice(coeffs);
                Ok(d)
            }
            n => Err(Error::Calibration(format!(
                "distortion must have 0, 4, 5 or 8 coefficients, got {}",
                n
            )))
        }
    }

    /// Apply the distortion model to a normalised image point.
    pub fn distort(&self, x: f64, y: f64) -> (f64, f64) {
        let [k1, k2, p1, p2, k3, k4, k5, k6] = self.coeffs;
        let r2 = x * x + y * y;
        let r4 = r2 * r2;
        let r6 = r4 * r2;
        let radial = (1.0 + k1 * r2 + k2 * r4 + k3 * r6) / (1.0 + k4 * r2 + k5 * r4 + k6 * r6);

        (
            x * radial + 2.0 * p1 * x * y + p2 * (r2 + 2.0 * x * x),
            y * radial + p1 * (r2 + 2.0 * y * y) + 2.0 * p2 * x * y
        )
    }

    /// Invert `distort` by fixed-point iteration.
    pub fn undistort(&self, xd: f64, yd: f64) -> (f64, f64) {
        let [k1, k2, p1, p2, k3, k4, k5, k6] = self.coeffs;
        let (mut x, mut y) = (xd, yd);

        for _ in 0..UNDISTORT_ITERATIONS {
            let r2 = x * x + y * y;
            let r4 = r2 * r2;
            let r6 = r4 * r2;
            let icdist = (1.0 + k4 * r2 + k5 * r4 + k6 * r6) / (1.0 + k1 * r2 + k2 * r4 + k3 * r6);
            let dx = 2.0 * p1 * x * y + p2 * (r2 + 2.0 * x * x);
            let dy = p1 * (r2 + 2.0 * y * y) + 2.0 * p2 * x * y;
            x = (xd - dx) * icdist;
            y = (yd - dy) * icdist;
        }

        (x, y)
    }
}

impl CameraIntrinsics {
    pub fn new(matrix: Matrix3<f64>, distortion: Distortion) -> Self {
        Self { matrix, distortion }
    }

    /// Pixel to undistorted normalised coordinates.
    pub fn undistort_point(&self, u: f64, v: f64) -> (f64, f64) {
        let (fx, fy, cx, cy, skew) = self.unpack();
        let yd = (v - cy) / fy;
        let xd = (u - cx - skew * yd) / fx;

        self.distortion.undistort(xd, yd)
    }

    /// Undistorted normalised coordinates to pixel.
    pub fn distort_point(&self, x: f64, y: f64) -> (f64, f64) {
        let (fx, fy, cx, cy, skew) = self.unpack();
        let (xd, yd) = self.distortion.distort(x, y);

        (fx * xd + skew * yd + cx, fy * yd + cy)
    }

    fn unpack(&self) -> (f64, f64, f64, f64, f64) {
        let m = &self.matrix;
        (m[(0, 0)], m[(1, 1)], m[(0, 2)], m[(1, 2)], m[(0, 1)])
    }
}

impl StereoCalibration {
    /// Load an intrinsics file and an extrinsics file.
    pub fn load<P: AsRef<Path>>(intrinsics: P, extrinsics: P) -> Result<Self> {
        let intr = Storage::open(intrinsics.as_ref())?;
        let extr = Storage::open(extrinsics.as_ref())?;

        let left = CameraIntrinsics::new(
            intr.matrix3("M1")?,
            Distortion::from_slice(&intr.vector("D1")?)?
        );
        let right = CameraIntrinsics::new(
            intr.matrix3("M2")?,
            Distortion::from_slice(&intr.vector("D2")?)?
        );

        let t = extr.vector("T")?;
        if t.len() != 3 {
            return Err(Error::Calibration(format!("T must have 3 elements, got {}", t.len())));
        }

        info!(
            "Loaded calibration from {} and {}",
            intrinsics.as_ref().display(),
            extrinsics.as_ref().display()
        );

        Ok(Self {
            left,
            right,
            rotation: extr.matrix3("R")?,
            translation: Vector3::new(t[0], t[1], t[2])
        })
    }
}

impl MatrixNode {
    fn check(self, key: &str) -> Result<Self> {
        if self.rows * self.cols != self.data.len() {
            return Err(Error::Calibration(format!(
                "{} declares {}x{} but holds {} values",
                key,
                self.rows,
                self.cols,
                self.data.len()
            )));
        }

        Ok(self)
    }
}

impl XmlMatrixNode {
    fn parse(&self, key: &str) -> Result<MatrixNode> {
        let data = self
            .data
            .split_whitespace()
            .map(|tok| tok.parse::<f64>())
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| Error::Calibration(format!("{}: {}", key, e)))?;

        Ok(MatrixNode {
            rows: self.rows,
            cols: self.cols,
            data
        })
    }
}

impl Storage {
    fn open(path: &Path) -> Result<Self> {
        let format = ParamFormat::from_path(path)
            .map_err(|e| Error::Calibration(format!("{}: {}", path.display(), e)))?;
        let text = fs::read_to_string(path)
            .map_err(|e| Error::Calibration(format!("could not open {}: {}", path.display(), e)))?;
        let bad = |e: &dyn std::fmt::Display| {
            Error::Calibration(format!("could not parse {}: {}", path.display(), e))
        };

        Ok(match format {
            ParamFormat::Yaml => Storage::Yaml(
                serde_yaml::from_str(strip_yaml_directive(&text)).map_err(|e| bad(&e))?
            ),
            ParamFormat::Json => Storage::Json(serde_json::from_str(&text).map_err(|e| bad(&e))?),
            ParamFormat::Xml => Storage::Xml(quick_xml::de::from_str(&text).map_err(|e| bad(&e))?)
        })
    }

    fn node(&self, key: &str) -> Result<MatrixNode> {
        let missing = || Error::Calibration(format!("missing {}", key));
        let bad = |e: &dyn std::fmt::Display| Error::Calibration(format!("{}: {}", key, e));

        let node: MatrixNode = match self {
            Storage::Yaml(doc) => {
                let mut value = doc.get(key).ok_or_else(missing)?;
                if let serde_yaml::Value::Tagged(tagged) = value {
                    value = &tagged.value;
                }
                serde_yaml::from_value(value.clone()).map_err(|e| bad(&e))?
            }
            Storage::Json(doc) => {
                let value = doc.get(key).ok_or_else(missing)?;
                serde_json::from_value(value.clone()).map_err(|e| bad(&e))?
            }
            Storage::Xml(doc) => {
                let node = match key {
                    "M1" => doc.M1.as_ref(),
                    "D1" => doc.D1.as_ref(),
                    "M2" => doc.M2.as_ref(),
                    "D2" => doc.D2.as_ref(),
                    "R" => doc.R.as_ref(),
                    "T" => doc.T.as_ref(),
                    _ => None
                };
                node.ok_or_else(missing)?.parse(key)?
            }
        };

        MatrixNode::check(node, key)
    }

    fn matrix3(&self, key: &str) -> Result<Matrix3<f64>> {
        let node = self.node(key)?;
        if node.rows != 3 || node.cols != 3 {
            return Err(Error::Calibration(format!(
                "{} must be 3x3, got {}x{}",
                key, node.rows, node.cols
            )));
        }

        Ok(Matrix3::from_row_slice(&node.data))
    }

    fn vector(&self, key: &str) -> Result<Vec<f64>> {
        let node = self.node(key)?;
        if node.rows != 1 && node.cols != 1 && !node.data.is_empty() {
            return Err(Error::Calibration(format!(
                "{} must be a row or column vector, got {}x{}",
                key, node.rows, node.cols
            )));
        }

        Ok(node.data)
    }
}

// -----------------------------------------------------------------------------------------------
// TESTS
// -----------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn undistort_inverts_distort() {
        let d = Distortion::from_slice(&[-0.2, 0.05, 0.001, -0.0005, 0.0]).unwrap();
        let (xd, yd) = d.distort(0.1, -0.05);
        let (x, y) = d.undistort(xd, yd);

        assert_relative_eq!(x, 0.1, epsilon = 1e-6);
        assert_relative_eq!(y, -0.05, epsilon = 1e-6);
    }

    #[test]
    fn distortion_rejects_odd_lengths() {
        assert!(Distortion::from_slice(&[0.1, 0.2, 0.3]).is_err());
    }
}
