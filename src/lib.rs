//! # Stereo matcher tuning
//!
//! This crate provides the core of an interactive stereo matcher tuner: independent parameter
//! records for block matching and semi-global block matching, a matcher state machine around a
//! pluggable correspondence engine, one-shot rectification of a calibrated pair, and depth
//! estimation at a clicked pixel of the disparity visualisation.

// -----------------------------------------------------------------------------------------------
// MODULES
// -----------------------------------------------------------------------------------------------

pub mod adapter;
pub mod calibration;
pub mod codec;
pub mod depth;
mod disparity;
mod error;
pub mod frame;
pub mod params;
pub mod pipeline;
pub mod rectify;
pub mod sad;

// -----------------------------------------------------------------------------------------------
// EXPORTS
// -----------------------------------------------------------------------------------------------

pub use crate::disparity::{
    DisparityAlgorithm, DisparityMap, DisparityResult, UNKNOWN_DISPARITY, UNKNOWN_SHADE
};
pub use crate::error::{Error, Result};

pub mod prelude {
    pub use crate::adapter::{EngineFactory, MatcherAdapter};
    pub use crate::depth::{CalibrationInputs, DepthMode};
    pub use crate::disparity::{DisparityAlgorithm, DisparityMap, DisparityResult};
    pub use crate::frame::{StereoFrame, ValidRegion};
    pub use crate::params::{AlgorithmKind, FieldId, MatcherParameters, ParameterStore, SetOutcome};
    pub use crate::pipeline::DisparityPipeline;
}
