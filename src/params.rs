//! # Matcher parameters
//!
//! This module owns every tunable matcher value. Each algorithm kind keeps its own independent
//! record, so switching between kinds never bleeds values from one into the other.

// -----------------------------------------------------------------------------------------------
// IMPORTS
// -----------------------------------------------------------------------------------------------

use serde::{Deserialize, Serialize};
use std::fmt;

// -----------------------------------------------------------------------------------------------
// CONSTANTS
// -----------------------------------------------------------------------------------------------

pub const DEFAULT_BLOCK_SIZE: i32 = 5;
pub const DEFAULT_DISP_12_MAX_DIFF: i32 = -1;
pub const DEFAULT_MIN_DISPARITY: i32 = 0;
pub const DEFAULT_NUM_DISPARITIES: i32 = 64;
pub const DEFAULT_SPECKLE_RANGE: i32 = 0;
pub const DEFAULT_SPECKLE_WINDOW_SIZE: i32 = 0;
pub const DEFAULT_PRE_FILTER_CAP: i32 = 1;
pub const DEFAULT_PRE_FILTER_SIZE: i32 = 5;
pub const DEFAULT_TEXTURE_THRESHOLD: i32 = 0;
pub const DEFAULT_UNIQUENESS_RATIO: i32 = 0;
pub const DEFAULT_P1: i32 = 0;
pub const DEFAULT_P2: i32 = 0;

/// numDisparities must be a positive multiple of this.
pub const DISPARITY_STEP: i32 = 16;

const COMMON_FIELDS: [FieldId; 8] = [
    FieldId::BlockSize,
    FieldId::MinDisparity,
    FieldId::NumDisparities,
    FieldId::Disp12MaxDiff,
    FieldId::SpeckleRange,
    FieldId::SpeckleWindowSize,
    FieldId::PreFilterCap,
    FieldId::UniquenessRatio
];

const BLOCK_MATCH_FIELDS: [FieldId; 11] = [
    FieldId::BlockSize,
    FieldId::MinDisparity,
    FieldId::NumDisparities,
    FieldId::Disp12MaxDiff,
    FieldId::SpeckleRange,
    FieldId::SpeckleWindowSize,
    FieldId::PreFilterCap,
    FieldId::UniquenessRatio,
    FieldId::PreFilterSize,
    FieldId::PreFilterType,
    FieldId::TextureThreshold
];

const SEMI_GLOBAL_FIELDS: [FieldId; 11] = [
    FieldId::BlockSize,
    FieldId::MinDisparity,
    FieldId::NumDisparities,
    FieldId::Disp12MaxDiff,
    FieldId::SpeckleRange,
    FieldId::SpeckleWindowSize,
    FieldId::PreFilterCap,
    FieldId::UniquenessRatio,
    FieldId::P1,
    FieldId::P2,
    FieldId::Mode
];

// -----------------------------------------------------------------------------------------------
// ENUMERATIONS
// -----------------------------------------------------------------------------------------------

/// Which correspondence algorithm is live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AlgorithmKind {
    BlockMatch,
    SemiGlobalBlockMatch
}

/// Identifies a single tunable field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FieldId {
    BlockSize,
    MinDisparity,
    NumDisparities,
    Disp12MaxDiff,
    SpeckleRange,
    SpeckleWindowSize,
    PreFilterCap,
    PreFilterSize,
    PreFilterType,
    TextureThreshold,
    UniquenessRatio,
    P1,
    P2,
    Mode
}

/// Block matching pre-filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PreFilterType {
    Normalized,
    XSobel
}

/// Semi-global matching mode. `FullDp` runs the full-scale two-pass dynamic programming.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SgbmMode {
    Standard,
    FullDp
}

/// Result of a single field edit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SetOutcome {
    /// The value is stored.
    Accepted,

    /// The value was not stored. The caller must re-apply the corrected value.
    Adjusted(i32),

    /// The value was not stored and the previous value is intact.
    Rejected(RejectReason)
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    #[error("value must be smaller than the image size ({limit})")]
    ExceedsImage { limit: i32 },

    #[error("{field} is not used by {kind}")]
    NotApplicable { field: FieldId, kind: AlgorithmKind },

    #[error("{value} does not name a {field} option")]
    UnknownVariant { field: FieldId, value: i32 },

    #[error("{value} cannot be corrected without overflowing")]
    OutOfRange { value: i32 }
}

/// A full record for one algorithm kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatcherParameters {
    BlockMatch(BlockMatchParams),
    SemiGlobalBlockMatch(SemiGlobalParams)
}

// -----------------------------------------------------------------------------------------------
// DATA STRUCTURES
// -----------------------------------------------------------------------------------------------

/// Fields shared by both algorithm kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommonParams {
    pub block_size: i32,
    pub min_disparity: i32,
    pub num_disparities: i32,
    pub disp12_max_diff: i32,
    pub speckle_range: i32,
    pub speckle_window_size: i32,
    pub pre_filter_cap: i32,
    pub uniqueness_ratio: i32
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockMatchParams {
    pub common: CommonParams,
    pub pre_filter_size: i32,
    pub pre_filter_type: PreFilterType,
    pub texture_threshold: i32
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SemiGlobalParams {
    pub common: CommonParams,
    pub p1: i32,
    pub p2: i32,
    pub mode: SgbmMode
}

/// Owns both parameter records plus the active-kind selector, and validates every edit.
#[derive(Debug, Clone)]
pub struct ParameterStore {
    kind: AlgorithmKind,
    block_match: BlockMatchParams,
    semi_global: SemiGlobalParams,
    image_width: u32,
    image_height: u32
}

// -----------------------------------------------------------------------------------------------
// FUNCTIONS
// -----------------------------------------------------------------------------------------------

/// Fields that are meaningful for the given algorithm kind.
pub fn available_fields(kind: AlgorithmKind) -> &'static [FieldId] {
    match kind {
        AlgorithmKind::BlockMatch => &BLOCK_MATCH_FIELDS,
        AlgorithmKind::SemiGlobalBlockMatch => &SEMI_GLOBAL_FIELDS
    }
}

// -----------------------------------------------------------------------------------------------
// IMPLEMENTATIONS
// -----------------------------------------------------------------------------------------------

impl AlgorithmKind {
    /// Schema tag used by parameter files.
    pub fn tag(&self) -> &'static str {
        match self {
            AlgorithmKind::BlockMatch => "StereoMatcher.BM",
            AlgorithmKind::SemiGlobalBlockMatch => "StereoMatcher.SGBM"
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "StereoMatcher.BM" => Some(AlgorithmKind::BlockMatch),
            "StereoMatcher.SGBM" => Some(AlgorithmKind::SemiGlobalBlockMatch),
            _ => None
        }
    }
}

impl fmt::Display for AlgorithmKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlgorithmKind::BlockMatch => write!(f, "block matching"),
            AlgorithmKind::SemiGlobalBlockMatch => write!(f, "semi-global block matching")
        }
    }
}

impl FieldId {
    pub const ALL: [FieldId; 14] = [
        FieldId::BlockSize,
        FieldId::MinDisparity,
        FieldId::NumDisparities,
        FieldId::Disp12MaxDiff,
        FieldId::SpeckleRange,
        FieldId::SpeckleWindowSize,
        FieldId::PreFilterCap,
        FieldId::PreFilterSize,
        FieldId::PreFilterType,
        FieldId::TextureThreshold,
        FieldId::UniquenessRatio,
        FieldId::P1,
        FieldId::P2,
        FieldId::Mode
    ];

    /// The name of the field in parameter files.
    pub fn name(&self) -> &'static str {
        match self {
            FieldId::BlockSize => "blockSize",
            FieldId::MinDisparity => "minDisparity",
            FieldId::NumDisparities => "numDisparities",
            FieldId::Disp12MaxDiff => "disp12MaxDiff",
            FieldId::SpeckleRange => "speckleRange",
            FieldId::SpeckleWindowSize => "speckleWindowSize",
            FieldId::PreFilterCap => "preFilterCap",
            FieldId::PreFilterSize => "preFilterSize",
            FieldId::PreFilterType => "preFilterType",
            FieldId::TextureThreshold => "textureThreshold",
            FieldId::UniquenessRatio => "uniquenessRatio",
            FieldId::P1 => "P1",
            FieldId::P2 => "P2",
            FieldId::Mode => "mode"
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|f| f.name() == name)
    }

    /// True for fields which must hold odd values.
    pub fn is_odd_only(&self) -> bool {
        matches!(self, FieldId::BlockSize | FieldId::PreFilterSize)
    }

    pub fn is_common(&self) -> bool {
        COMMON_FIELDS.contains(self)
    }
}

impl fmt::Display for FieldId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl PreFilterType {
    pub fn to_raw(self) -> i32 {
        match self {
            PreFilterType::Normalized => 0,
            PreFilterType::XSobel => 1
        }
    }

    pub fn from_raw(raw: i32) -> Option<Self> {
        match raw {
            0 => Some(PreFilterType::Normalized),
            1 => Some(PreFilterType::XSobel),
            _ => None
        }
    }
}

impl SgbmMode {
    pub fn to_raw(self) -> i32 {
        match self {
            SgbmMode::Standard => 0,
            SgbmMode::FullDp => 1
        }
    }

    pub fn from_raw(raw: i32) -> Option<Self> {
        match raw {
            0 => Some(SgbmMode::Standard),
            1 => Some(SgbmMode::FullDp),
            _ => None
        }
    }
}

impl Default for CommonParams {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            min_disparity: DEFAULT_MIN_DISPARITY,
            num_disparities: DEFAULT_NUM_DISPARITIES,
            disp12_max_diff: DEFAULT_DISP_12_MAX_DIFF,
            speckle_range: DEFAULT_SPECKLE_RANGE,
            speckle_window_size: DEFAULT_SPECKLE_WINDOW_SIZE,
            pre_filter_cap: DEFAULT_PRE_FILTER_CAP,
            uniqueness_ratio: DEFAULT_UNIQUENESS_RATIO
        }
    }
}

impl Default for BlockMatchParams {
    fn default() -> Self {
        Self {
            common: CommonParams::default(),
            pre_filter_size: DEFAULT_PRE_FILTER_SIZE,
            pre_filter_type: PreFilterType::Normalized,
            texture_threshold: DEFAULT_TEXTURE_THRESHOLD
        }
    }
}

impl Default for SemiGlobalParams {
    fn default() -> Self {
        Self {
            common: CommonParams::default(),
            p1: DEFAULT_P1,
            p2: DEFAULT_P2,
            mode: SgbmMode::Standard
        }
    }
}

impl CommonParams {
    fn slot_mut(&mut self, field: FieldId) -> Option<&mut i32> {
        match field {
            FieldId::BlockSize => Some(&mut self.block_size),
            FieldId::MinDisparity => Some(&mut self.min_disparity),
            FieldId::NumDisparities => Some(&mut self.num_disparities),
            FieldId::Disp12MaxDiff => Some(&mut self.disp12_max_diff),
            FieldId::SpeckleRange => Some(&mut self.speckle_range),
            FieldId::SpeckleWindowSize => Some(&mut self.speckle_window_size),
            FieldId::PreFilterCap => Some(&mut self.pre_filter_cap),
            FieldId::UniquenessRatio => Some(&mut self.uniqueness_ratio),
            _ => None
        }
    }

    fn get(&self, field: FieldId) -> Option<i32> {
        let mut copy = *self;
        copy.slot_mut(field).map(|v| *v)
    }
}

impl MatcherParameters {
    pub fn kind(&self) -> AlgorithmKind {
        match self {
            MatcherParameters::BlockMatch(_) => AlgorithmKind::BlockMatch,
            MatcherParameters::SemiGlobalBlockMatch(_) => AlgorithmKind::SemiGlobalBlockMatch
        }
    }

    pub fn defaults(kind: AlgorithmKind) -> Self {
        match kind {
            AlgorithmKind::BlockMatch => MatcherParameters::BlockMatch(Default::default()),
            AlgorithmKind::SemiGlobalBlockMatch => {
                MatcherParameters::SemiGlobalBlockMatch(Default::default())
            }
        }
    }

    pub fn common(&self) -> &CommonParams {
        match self {
            MatcherParameters::BlockMatch(p) => &p.common,
            MatcherParameters::SemiGlobalBlockMatch(p) => &p.common
        }
    }

    /// Raw value of a field, or `None` if the field does not belong to this kind.
    ///
    /// Enumerated fields are reported by their file encoding.
    pub fn get(&self, field: FieldId) -> Option<i32> {
        if field.is_common() {
            return self.common().get(field);
        }

        match (self, field) {
            (MatcherParameters::BlockMatch(p), FieldId::PreFilterSize) => Some(p.pre_filter_size),
            (MatcherParameters::BlockMatch(p), FieldId::PreFilterType) => {
                Some(p.pre_filter_type.to_raw())
            }
            (MatcherParameters::BlockMatch(p), FieldId::TextureThreshold) => {
                Some(p.texture_threshold)
            }
            (MatcherParameters::SemiGlobalBlockMatch(p), FieldId::P1) => Some(p.p1),
            (MatcherParameters::SemiGlobalBlockMatch(p), FieldId::P2) => Some(p.p2),
            (MatcherParameters::SemiGlobalBlockMatch(p), FieldId::Mode) => Some(p.mode.to_raw()),
            _ => None
        }
    }

    /// Store a raw value without any validation. Enumerated fields must hold a known encoding.
    fn put(&mut self, field: FieldId, value: i32) -> Result<(), RejectReason> {
        let kind = self.kind();
        let not_applicable = RejectReason::NotApplicable { field, kind };
        let unknown = RejectReason::UnknownVariant { field, value };

        match self {
            MatcherParameters::BlockMatch(p) => match field {
                FieldId::PreFilterSize => p.pre_filter_size = value,
                FieldId::TextureThreshold => p.texture_threshold = value,
                FieldId::PreFilterType => {
                    p.pre_filter_type = PreFilterType::from_raw(value).ok_or(unknown)?
                }
                _ => *p.common.slot_mut(field).ok_or(not_applicable)? = value
            },
            MatcherParameters::SemiGlobalBlockMatch(p) => match field {
                FieldId::P1 => p.p1 = value,
                FieldId::P2 => p.p2 = value,
                FieldId::Mode => p.mode = SgbmMode::from_raw(value).ok_or(unknown)?,
                _ => *p.common.slot_mut(field).ok_or(not_applicable)? = value
            }
        }

        Ok(())
    }
}

impl ParameterStore {
    /// Create a store with default records for an image of the given size. BlockMatch is active.
    pub fn new(image_width: u32, image_height: u32) -> Self {
        Self {
            kind: AlgorithmKind::BlockMatch,
            block_match: BlockMatchParams::default(),
            semi_global: SemiGlobalParams::default(),
            image_width,
            image_height
        }
    }

    pub fn kind(&self) -> AlgorithmKind {
        self.kind
    }

    /// Select the active kind. Neither record is touched.
    pub fn set_kind(&mut self, kind: AlgorithmKind) {
        self.kind = kind;
    }

    /// The record of the active kind.
    pub fn active(&self) -> MatcherParameters {
        self.record(self.kind)
    }

    pub fn record(&self, kind: AlgorithmKind) -> MatcherParameters {
        match kind {
            AlgorithmKind::BlockMatch => MatcherParameters::BlockMatch(self.block_match),
            AlgorithmKind::SemiGlobalBlockMatch => {
                MatcherParameters::SemiGlobalBlockMatch(self.semi_global)
            }
        }
    }

    /// Overwrite the record of `params.kind()`. Does not change the active kind.
    pub fn replace(&mut self, params: MatcherParameters) {
        match params {
            MatcherParameters::BlockMatch(p) => self.block_match = p,
            MatcherParameters::SemiGlobalBlockMatch(p) => self.semi_global = p
        }
    }

    /// Restore both records to their defaults and select BlockMatch.
    pub fn reset(&mut self) {
        self.kind = AlgorithmKind::BlockMatch;
        self.block_match = BlockMatchParams::default();
        self.semi_global = SemiGlobalParams::default();
    }

    pub fn get(&self, field: FieldId) -> Option<i32> {
        self.active().get(field)
    }

    /// Validate and store a value in the active record.
    ///
    /// An `Adjusted` outcome leaves the store untouched, the caller re-applies the returned value
    /// once.
    pub fn set(&mut self, field: FieldId, value: i32) -> SetOutcome {
        if !available_fields(self.kind).contains(&field) {
            return SetOutcome::Rejected(RejectReason::NotApplicable {
                field,
                kind: self.kind
            });
        }

        if field.is_odd_only() {
            if value % 2 == 0 {
                return match value.checked_add(1) {
                    Some(v) => SetOutcome::Adjusted(v),
                    None => SetOutcome::Rejected(RejectReason::OutOfRange { value })
                };
            }

            let limit = self.image_width.min(self.image_height).min(i32::MAX as u32) as i32;
            if value >= limit {
                return SetOutcome::Rejected(RejectReason::ExceedsImage { limit });
            }
        }

        if field == FieldId::NumDisparities {
            if value <= 0 {
                return SetOutcome::Adjusted(DISPARITY_STEP);
            }

            if value % DISPARITY_STEP != 0 {
                return match value.checked_add(DISPARITY_STEP - value % DISPARITY_STEP) {
                    Some(v) => SetOutcome::Adjusted(v),
                    None => SetOutcome::Rejected(RejectReason::OutOfRange { value })
                };
            }
        }

        let mut record = self.active();
        match record.put(field, value) {
            Ok(()) => {
                self.replace(record);
                SetOutcome::Accepted
            }
            Err(reason) => SetOutcome::Rejected(reason)
        }
    }

    /// Apply a value, re-applying a single adjustment if the store asks for one.
    pub fn set_with_adjust(&mut self, field: FieldId, value: i32) -> SetOutcome {
        match self.set(field, value) {
            SetOutcome::Adjusted(v) => self.set(field, v),
            outcome => outcome
        }
    }
}

// -----------------------------------------------------------------------------------------------
// TESTS
// -----------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn common_fields_are_available_to_both_kinds() {
        for field in COMMON_FIELDS.iter() {
            assert!(available_fields(AlgorithmKind::BlockMatch).contains(field));
            assert!(available_fields(AlgorithmKind::SemiGlobalBlockMatch).contains(field));
        }
    }

    #[test]
    fn put_rejects_unknown_mode() {
        let mut record = MatcherParameters::defaults(AlgorithmKind::SemiGlobalBlockMatch);
        assert_eq!(
            record.put(FieldId::Mode, 3),
            Err(RejectReason::UnknownVariant { field: FieldId::Mode, value: 3 })
        );
        assert_eq!(record.get(FieldId::Mode), Some(0));
    }

    #[test]
    fn field_names_round_trip() {
        for field in FieldId::ALL.iter() {
            assert_eq!(FieldId::from_name(field.name()), Some(*field));
        }
    }
}
