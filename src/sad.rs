//! # Reference SAD engine
//!
//! A plain sum-of-absolute-differences, winner-takes-all block matcher. It stands in for the
//! external correspondence engines so the tuner can run without a vision library: it accepts the
//! same parameter records and enforces the same ranges, but only honours the fields that make
//! sense for a SAD search (block size, disparity range, uniqueness and texture thresholds, valid
//! regions).

// -----------------------------------------------------------------------------------------------
// IMPORTS
// -----------------------------------------------------------------------------------------------

use crate::disparity::{DisparityAlgorithm, DisparityMap, UNKNOWN_DISPARITY};
use crate::error::*;
use crate::frame::{StereoFrame, ValidRegion};
use crate::params::{AlgorithmKind, FieldId, MatcherParameters, DISPARITY_STEP};

// -----------------------------------------------------------------------------------------------
// CONSTANTS
// -----------------------------------------------------------------------------------------------

/// Bound on the magnitude of minDisparity and on numDisparities, keeping search offsets in range.
const MAX_DISPARITY_RANGE: i32 = 1 << 16;

// -----------------------------------------------------------------------------------------------
// DATA STRUCTURES
// -----------------------------------------------------------------------------------------------

/// The subset of a record the SAD search uses.
#[derive(Debug, Clone, Copy)]
struct Search {
    semi_window: i32,
    min_disparity: i32,
    num_disparities: i32,
    uniqueness_ratio: i32,
    texture_threshold: i32
}

pub struct SadMatcher {
    kind: AlgorithmKind,
    search: Option<Search>,
    left_region: Option<ValidRegion>
}

// -----------------------------------------------------------------------------------------------
// FUNCTIONS
// -----------------------------------------------------------------------------------------------

/// Engine factory producing a `SadMatcher` for either kind.
pub fn sad_factory(kind: AlgorithmKind) -> Result<Box<dyn DisparityAlgorithm>> {
    Ok(Box::new(SadMatcher::new(kind)))
}

fn refuse(field: FieldId, value: i32, reason: &str) -> Error {
    Error::AdapterConfiguration {
        field,
        value,
        reason: reason.into()
    }
}

// -----------------------------------------------------------------------------------------------
// IMPLEMENTATIONS
// -----------------------------------------------------------------------------------------------

impl SadMatcher {
    pub fn new(kind: AlgorithmKind) -> Self {
        Self {
            kind,
            search: None,
            left_region: None
        }
    }

    fn validate(&self, params: &MatcherParameters) -> Result<Search> {
        if params.kind() != self.kind {
            return Err(Error::Compute(format!(
                "{} engine cannot take a {} record",
                self.kind,
                params.kind()
            )));
        }

        let common = params.common();

        let min_block = match self.kind {
            AlgorithmKind::BlockMatch => 5,
            AlgorithmKind::SemiGlobalBlockMatch => 1
        };
        if common.block_size % 2 == 0 || common.block_size < min_block || common.block_size > 255
        {
            return Err(refuse(
                FieldId::BlockSize,
                common.block_size,
                "must be odd and within the engine's window limits"
            ));
        }

        if common.num_disparities <= 0
            || common.num_disparities % DISPARITY_STEP != 0
            || common.num_disparities > MAX_DISPARITY_RANGE
        {
            return Err(refuse(
                FieldId::NumDisparities,
                common.num_disparities,
                "must be a positive multiple of 16 no larger than 65536"
            ));
        }

        if !(-MAX_DISPARITY_RANGE..=MAX_DISPARITY_RANGE).contains(&common.min_disparity) {
            return Err(refuse(
                FieldId::MinDisparity,
                common.min_disparity,
                "must be within -65536..=65536"
            ));
        }

        if common.uniqueness_ratio < 0 {
            return Err(refuse(FieldId::UniquenessRatio, common.uniqueness_ratio, "must be >= 0"));
        }

        if common.speckle_window_size < 0 {
            return Err(refuse(
                FieldId::SpeckleWindowSize,
                common.speckle_window_size,
                "must be >= 0"
            ));
        }

        let mut texture_threshold = 0;

        match params {
            MatcherParameters::BlockMatch(p) => {
                if !(1..=63).contains(&common.pre_filter_cap) {
                    return Err(refuse(
                        FieldId::PreFilterCap,
                        common.pre_filter_cap,
                        "must be within 1..=63"
                    ));
                }
                if p.pre_filter_size % 2 == 0 || !(5..=255).contains(&p.pre_filter_size) {
                    return Err(refuse(
                        FieldId::PreFilterSize,
                        p.pre_filter_size,
                        "must be odd and within 5..=255"
                    ));
                }
                if p.texture_threshold < 0 {
                    return Err(refuse(
                        FieldId::TextureThreshold,
                        p.texture_threshold,
                        "must be >= 0"
                    ));
                }
                texture_threshold = p.texture_threshold;
            }
            MatcherParameters::SemiGlobalBlockMatch(p) => {
                if p.p1 < 0 {
                    return Err(refuse(FieldId::P1, p.p1, "must be >= 0"));
                }
                if (p.p1 != 0 || p.p2 != 0) && p.p2 <= p.p1 {
                    return Err(refuse(FieldId::P2, p.p2, "must be greater than P1"));
                }
            }
        }

        Ok(Search {
            semi_window: (common.block_size - 1) / 2,
            min_disparity: common.min_disparity,
            num_disparities: common.num_disparities,
            uniqueness_ratio: common.uniqueness_ratio,
            texture_threshold
        })
    }

    /// Calculate the SAD criterion for the given position and disparity.
    fn get_criterion(frame: &StereoFrame, search: &Search, x: i32, y: i32, d: i32) -> u32 {
        let mut acc = 0u32;

        for j in -search.semi_window..=search.semi_window {
            for i in -search.semi_window..=search.semi_window {
                let yj = (y + j) as u32;
                let l = frame.left.get_pixel((x + i) as u32, yj)[0] as i32;
                let r = frame.right.get_pixel((x + i - d) as u32, yj)[0] as i32;
                acc += (l - r).abs() as u32;
            }
        }

        acc
    }

    /// Sum of horizontal gradients over the window, the texture measure.
    fn get_texture(frame: &StereoFrame, search: &Search, x: i32, y: i32) -> i32 {
        let mut acc = 0;

        for j in -search.semi_window..=search.semi_window {
            for i in -search.semi_window..search.semi_window {
                let a = frame.left.get_pixel((x + i) as u32, (y + j) as u32)[0] as i32;
                let b = frame.left.get_pixel((x + i + 1) as u32, (y + j) as u32)[0] as i32;
                acc += (a - b).abs();
            }
        }

        acc
    }
}

impl DisparityAlgorithm for SadMatcher {
    fn configure(&mut self, params: &MatcherParameters) -> Result<()> {
        let search = self.validate(params)?;
        self.search = Some(search);

        Ok(())
    }

    fn set_valid_regions(&mut self, left: ValidRegion, _right: ValidRegion) {
        self.left_region = Some(left);
    }

    /// Compute the disparity map for the given frame.
    fn compute(&mut self, frame: &StereoFrame) -> Result<DisparityMap> {
        let search = self
            .search
            .ok_or_else(|| Error::Compute("engine has not been configured".into()))?;

        let width = frame.width() as i32;
        let height = frame.height() as i32;
        let mut disp_map = DisparityMap::new(frame.width(), frame.height());

        // Columns for which every `x - d` window of the search range stays inside the right image
        let max_disparity = search.min_disparity + search.num_disparities - 1;
        let x_start = search.semi_window + max_disparity.max(0);
        let x_end = width - search.semi_window + search.min_disparity.min(0);

        for y in search.semi_window..(height - search.semi_window) {
            for x in x_start..x_end {
                if let Some(region) = self.left_region {
                    if !region.contains(x as u32, y as u32) {
                        continue;
                    }
                }

                if search.texture_threshold > 0
                    && Self::get_texture(frame, &search, x, y) < search.texture_threshold
                {
                    continue;
                }

                // Vector of criterions
                let crits: Vec<u32> = (0..search.num_disparities)
                    .map(|k| Self::get_criterion(frame, &search, x, y, search.min_disparity + k))
                    .collect();

                // Find index of minimum value
                let min_index = crits
                    .iter()
                    .enumerate()
                    .fold(0, |min_idx, (idx, &val)| {
                        if val < crits[min_idx] {
                            idx
                        }
                        else {
                            min_idx
                        }
                    });
                let best = crits[min_index];

                // Uniqueness: any other candidate further than one step away must be clearly worse
                if search.uniqueness_ratio > 0 {
                    let ambiguous = crits.iter().enumerate().any(|(idx, &val)| {
                        (idx as i64 - min_index as i64).abs() > 1
                            && (val as u64) * 100
                                <= (best as u64) * (100 + search.uniqueness_ratio as u64)
                    });
                    if ambiguous {
                        continue;
                    }
                }

                // Sub pixel interpolation, skipped on the outer edge of the criterion
                let mut disp_val = (search.min_disparity + min_index as i32) as f32;
                if min_index > 0 && min_index + 1 < crits.len() {
                    let c_left = crits[min_index - 1] as f32;
                    let c_right = crits[min_index + 1] as f32;
                    let denom = 2.0 * (c_left.max(c_right) - best as f32);

                    if denom > 0.0 {
                        disp_val += (c_left - c_right) / denom;
                    }
                }

                disp_map.put(
                    x as u32,
                    y as u32,
                    if disp_val < 0.0 { UNKNOWN_DISPARITY } else { disp_val }
                );
            }
        }

        Ok(disp_map)
    }
}

// -----------------------------------------------------------------------------------------------
// TESTS
// -----------------------------------------------------------------------------------------------
