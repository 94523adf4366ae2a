//! # Disparity pipeline
//!
//! Drives a tuning session: every accepted edit reconfigures the matcher, recomputes the disparity
//! map and refreshes the normalised visualisation. Edits made inside a bulk edit are staged and
//! followed by exactly one recompute.

// -----------------------------------------------------------------------------------------------
// IMPORTS
// -----------------------------------------------------------------------------------------------

use log::{info, warn};
use std::ops::{Deref, DerefMut};
use std::path::Path;
use std::time::Instant;

use crate::adapter::{AvailabilityListener, EngineFactory, MatcherAdapter};
use crate::codec::{read_params, write_params};
use crate::depth::{estimate_depth, CalibrationInputs, DepthMode, DepthProbe};
use crate::disparity::DisparityResult;
use crate::error::*;
use crate::frame::StereoFrame;
use crate::params::{AlgorithmKind, FieldId, ParameterStore, SetOutcome};

// -----------------------------------------------------------------------------------------------
// DATA STRUCTURES
// -----------------------------------------------------------------------------------------------

pub struct DisparityPipeline<F: EngineFactory> {
    frame: StereoFrame,
    store: ParameterStore,
    adapter: MatcherAdapter<F>,
    result: Option<DisparityResult>,
    live: bool
}

/// Scoped bulk edit. While held, edits are staged without recomputing; finishing or dropping it
/// restores live updates and recomputes once.
pub struct BulkEdit<'a, F: EngineFactory> {
    pipeline: &'a mut DisparityPipeline<F>,
    /// Store as it was when the edit began, restored if the engine refuses the result.
    before: ParameterStore,
    was_live: bool,
    finished: bool
}

/// What a parameter file load changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadReport {
    pub kind: AlgorithmKind,
    pub applied: Vec<(FieldId, i32)>,
    pub rejected: Vec<(FieldId, i32, SetOutcome)>
}

// -----------------------------------------------------------------------------------------------
// IMPLEMENTATIONS
// -----------------------------------------------------------------------------------------------

impl<F: EngineFactory> DisparityPipeline<F> {
    /// Create a session over a fixed frame. Nothing is computed until the first `recompute`.
    pub fn new(frame: StereoFrame, factory: F) -> Self {
        let mut adapter = MatcherAdapter::new(factory);
        if let Some((left, right)) = frame.valid_regions {
            adapter.set_valid_regions(left, right);
        }

        Self {
            store: ParameterStore::new(frame.width(), frame.height()),
            frame,
            adapter,
            result: None,
            live: true
        }
    }

    pub fn frame(&self) -> &StereoFrame {
        &self.frame
    }

    pub fn store(&self) -> &ParameterStore {
        &self.store
    }

    pub fn adapter(&self) -> &MatcherAdapter<F> {
        &self.adapter
    }

    /// The most recent successful result.
    pub fn result(&self) -> Option<&DisparityResult> {
        self.result.as_ref()
    }

    pub fn is_live(&self) -> bool {
        self.live
    }

    pub fn subscribe(&mut self, listener: AvailabilityListener) {
        self.adapter.subscribe(listener);
    }

    /// Configure the matcher with the active record and recompute the disparity map.
    ///
    /// On error the previous result stays in place.
    pub fn recompute(&mut self) -> Result<&DisparityResult> {
        let params = self.store.active();
        self.adapter.configure(&params)?;

        self.compute()
    }

    fn compute(&mut self) -> Result<&DisparityResult> {
        let started = Instant::now();
        let raw = self.adapter.compute(&self.frame)?;
        let elapsed = started.elapsed();

        let result = DisparityResult::new(raw, elapsed);
        info!("Disparity computation took {:.3} milliseconds", result.elapsed_millis());

        Ok(&*self.result.insert(result))
    }

    /// Recompute if live. Returns whether a recompute ran.
    ///
    /// If the engine refuses the active record the store is restored to `before`, the state the
    /// edit started from.
    fn refresh(&mut self, before: &ParameterStore) -> Result<bool> {
        if !self.live {
            return Ok(false);
        }

        let params = self.store.active();
        if let Err(e) = self.adapter.configure(&params) {
            self.store = before.clone();
            return Err(e);
        }

        self.compute()?;
        Ok(true)
    }

    /// Edit one field of the active record.
    ///
    /// Only an `Accepted` edit triggers a recompute.
    pub fn set_param(&mut self, field: FieldId, value: i32) -> Result<SetOutcome> {
        let before = self.store.clone();
        let outcome = self.store.set(field, value);

        if outcome == SetOutcome::Accepted {
            self.refresh(&before)?;
        }

        Ok(outcome)
    }

    /// Switch the active algorithm. Both records are kept as they are.
    pub fn select_algorithm(&mut self, kind: AlgorithmKind) -> Result<()> {
        let before = self.store.clone();
        self.store.set_kind(kind);
        self.refresh(&before)?;

        Ok(())
    }

    /// Start staging edits.
    pub fn begin_bulk_edit(&mut self) -> BulkEdit<'_, F> {
        let was_live = self.live;
        let before = self.store.clone();
        self.live = false;

        BulkEdit {
            pipeline: self,
            before,
            was_live,
            finished: false
        }
    }

    /// Load a parameter file, switching kind if the file names the other algorithm, then
    /// recompute once.
    pub fn load_params<P: AsRef<Path>>(&mut self, path: P) -> Result<LoadReport> {
        let mut bulk = self.begin_bulk_edit();

        let doc = read_params(path.as_ref())?;
        let kind = doc.kind()?;

        bulk.select_algorithm(kind)?;

        let mut report = LoadReport {
            kind,
            applied: Vec::new(),
            rejected: Vec::new()
        };

        for (field, value) in doc.fields()? {
            match bulk.store.set_with_adjust(field, value) {
                SetOutcome::Accepted => {
                    let stored = bulk.store.get(field).unwrap_or(value);
                    report.applied.push((field, stored));
                }
                outcome => {
                    warn!(
                        "Ignoring {} = {} from {}: {:?}",
                        field,
                        value,
                        path.as_ref().display(),
                        outcome
                    );
                    report.rejected.push((field, value, outcome));
                }
            }
        }

        bulk.finish()?;
        info!("Loaded {} parameters from {}", kind, path.as_ref().display());

        Ok(report)
    }

    /// Save the active record.
    pub fn save_params<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        write_params(path, &self.store.active())
    }

    /// Restore default records and BlockMatch, then recompute once.
    pub fn reset_defaults(&mut self) -> Result<()> {
        let mut bulk = self.begin_bulk_edit();
        bulk.store.reset();

        bulk.finish()
    }

    /// Estimate depth at a pixel of the current visualisation.
    ///
    /// The image width of `inputs` is replaced by the width of the visualisation.
    pub fn depth_at(
        &self,
        x: u32,
        y: u32,
        inputs: &CalibrationInputs,
        mode: DepthMode
    ) -> DepthProbe {
        let disparity = match &self.result {
            Some(result) => result.sample(x, y),
            None => -1
        };

        let inputs = CalibrationInputs {
            image_width: self.image_width(),
            ..*inputs
        };

        DepthProbe {
            x,
            y,
            disparity,
            depth: estimate_depth(&inputs, mode, disparity)
        }
    }

    /// Width of the current visualisation, used as the image width in metric depth mode.
    pub fn image_width(&self) -> u32 {
        match &self.result {
            Some(result) => result.normalised.width(),
            None => self.frame.width()
        }
    }
}

impl<'a, F: EngineFactory> BulkEdit<'a, F> {
    /// Restore live updates and recompute.
    pub fn finish(mut self) -> Result<()> {
        self.finished = true;
        self.pipeline.live = self.was_live;

        self.pipeline.refresh(&self.before).map(|_| ())
    }
}

impl<'a, F: EngineFactory> Deref for BulkEdit<'a, F> {
    type Target = DisparityPipeline<F>;

    fn deref(&self) -> &Self::Target {
        self.pipeline
    }
}

impl<'a, F: EngineFactory> DerefMut for BulkEdit<'a, F> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.pipeline
    }
}

impl<'a, F: EngineFactory> Drop for BulkEdit<'a, F> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }

        self.pipeline.live = self.was_live;
        if let Err(e) = self.pipeline.refresh(&self.before) {
            warn!("Recompute after abandoned bulk edit failed: {}", e);
        }
    }
}
