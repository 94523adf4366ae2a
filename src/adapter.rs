//! # Matcher adapter
//!
//! Wraps the external correspondence engine behind a small state machine. The adapter is either
//! unbound, or bound to one engine instance of a single algorithm kind. Changing kind tears the
//! old engine down and builds a fresh one with the new kind's record.

// -----------------------------------------------------------------------------------------------
// IMPORTS
// -----------------------------------------------------------------------------------------------

use log::debug;

use crate::disparity::{DisparityAlgorithm, DisparityMap};
use crate::error::*;
use crate::frame::{StereoFrame, ValidRegion};
use crate::params::{available_fields, AlgorithmKind, FieldId, MatcherParameters};

// -----------------------------------------------------------------------------------------------
// TYPES
// -----------------------------------------------------------------------------------------------

/// Called every time the adapter binds to a kind, with the fields meaningful for it.
pub type AvailabilityListener = Box<dyn FnMut(AlgorithmKind, &[FieldId])>;

// -----------------------------------------------------------------------------------------------
// TRAITS
// -----------------------------------------------------------------------------------------------

/// Builds engines for the adapter.
pub trait EngineFactory {
    fn create(&self, kind: AlgorithmKind) -> Result<Box<dyn DisparityAlgorithm>>;
}

impl<F> EngineFactory for F
where
    F: Fn(AlgorithmKind) -> Result<Box<dyn DisparityAlgorithm>>
{
    fn create(&self, kind: AlgorithmKind) -> Result<Box<dyn DisparityAlgorithm>> {
        self(kind)
    }
}

// -----------------------------------------------------------------------------------------------
// DATA STRUCTURES
// -----------------------------------------------------------------------------------------------

enum AdapterState {
    Uninitialized,
    Bound {
        kind: AlgorithmKind,
        engine: Box<dyn DisparityAlgorithm>
    }
}

pub struct MatcherAdapter<F: EngineFactory> {
    factory: F,
    state: AdapterState,
    valid_regions: Option<(ValidRegion, ValidRegion)>,
    listeners: Vec<AvailabilityListener>
}

// -----------------------------------------------------------------------------------------------
// IMPLEMENTATIONS
// -----------------------------------------------------------------------------------------------

impl<F: EngineFactory> MatcherAdapter<F> {
    pub fn new(factory: F) -> Self {
        Self {
            factory,
            state: AdapterState::Uninitialized,
            valid_regions: None,
            listeners: Vec::new()
        }
    }

    /// Remember the valid regions of a rectified pair. Applied now if bound, and again on every
    /// later bind.
    pub fn set_valid_regions(&mut self, left: ValidRegion, right: ValidRegion) {
        self.valid_regions = Some((left, right));

        if let AdapterState::Bound { engine, .. } = &mut self.state {
            engine.set_valid_regions(left, right);
        }
    }

    /// Register a listener for the availability signal.
    pub fn subscribe(&mut self, listener: AvailabilityListener) {
        self.listeners.push(listener);
    }

    /// Kind of the bound engine, if any.
    pub fn bound_kind(&self) -> Option<AlgorithmKind> {
        match &self.state {
            AdapterState::Uninitialized => None,
            AdapterState::Bound { kind, .. } => Some(*kind)
        }
    }

    /// Fields meaningful for the bound engine. Empty while unbound.
    pub fn available_fields(&self) -> &'static [FieldId] {
        match self.bound_kind() {
            Some(kind) => available_fields(kind),
            None => &[]
        }
    }

    /// Push a full record into the engine, binding a new engine first if the record's kind
    /// differs from the bound one.
    ///
    /// If a freshly built engine refuses its first configuration the previous binding stays.
    pub fn configure(&mut self, params: &MatcherParameters) -> Result<()> {
        let kind = params.kind();

        if let AdapterState::Bound { kind: bound, engine } = &mut self.state {
            if *bound == kind {
                return engine.configure(params);
            }
        }

        let mut engine = self.factory.create(kind)?;
        engine.configure(params)?;

        if let Some((left, right)) = self.valid_regions {
            engine.set_valid_regions(left, right);
        }

        debug!("Matcher bound to {}", kind);
        self.state = AdapterState::Bound { kind, engine };

        let fields = available_fields(kind);
        for listener in self.listeners.iter_mut() {
            listener(kind, fields);
        }

        Ok(())
    }

    pub fn compute(&mut self, frame: &StereoFrame) -> Result<DisparityMap> {
        match &mut self.state {
            AdapterState::Bound { engine, .. } => engine.compute(frame),
            AdapterState::Uninitialized => {
                Err(Error::Compute("matcher has not been configured".into()))
            }
        }
    }
}
