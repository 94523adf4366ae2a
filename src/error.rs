//! # Error standards
//!
//! This module provides a standardised error enum and result type for this crate.

// -----------------------------------------------------------------------------------------------
// IMPORTS
// -----------------------------------------------------------------------------------------------

use crate::params::FieldId;

// -----------------------------------------------------------------------------------------------
// TYPES
// -----------------------------------------------------------------------------------------------

/// Standard result type used in the stereo tuner crate.
pub type Result<T> = std::result::Result<T, Error>;

// -----------------------------------------------------------------------------------------------
// ENUMERATIONS
// -----------------------------------------------------------------------------------------------

#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The correspondence engine refused a parameter, its previous configuration is still live.
    #[error("Matcher refused {field} = {value}: {reason}")]
    AdapterConfiguration {
        field: FieldId,
        value: i32,
        reason: String
    },

    /// The correspondence engine failed while computing a disparity map.
    #[error("Disparity computation failed: {0}")]
    Compute(String),

    /// Malformed or missing calibration data. Only raised at startup.
    #[error("Invalid calibration: {0}")]
    Calibration(String),

    /// A parameter file could not be understood.
    #[error("Invalid parameter file: {0}")]
    FileFormat(String),

    #[error("Unsupported file extension {0:?}, expected one of .yml, .xml or .json")]
    UnsupportedExtension(String),

    #[error("Left image is {left:?} but right image is {right:?}")]
    ImageSizeMismatch {
        left: (u32, u32),
        right: (u32, u32)
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Image(#[from] image::ImageError)
}
