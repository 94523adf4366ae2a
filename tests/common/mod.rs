//! Scripted engine shared by the integration tests.

#![allow(dead_code)]

use std::cell::RefCell;
use std::rc::Rc;

use cv_stereo_tuner::prelude::*;
use cv_stereo_tuner::{Error, Result, UNKNOWN_DISPARITY};
use image::GrayImage;

pub const WIDTH: u32 = 32;
pub const HEIGHT: u32 = 24;

/// What the scripted engine writes into its maps.
#[derive(Debug, Clone, Copy)]
pub enum Output {
    /// Disparity equals the column index, with column 0 unknown.
    Gradient,
    Unknown,
    Constant(f32)
}

#[derive(Debug)]
pub struct Script {
    pub creates: Vec<AlgorithmKind>,
    pub configures: usize,
    pub computes: usize,
    pub refuse: Option<(FieldId, i32)>,
    pub fail_compute: bool,
    pub output: Output,
    pub regions: Option<(ValidRegion, ValidRegion)>,
    pub last_params: Option<MatcherParameters>
}

pub struct ScriptedEngine {
    script: Rc<RefCell<Script>>
}

impl Default for Script {
    fn default() -> Self {
        Self {
            creates: Vec::new(),
            configures: 0,
            computes: 0,
            refuse: None,
            fail_compute: false,
            output: Output::Gradient,
            regions: None,
            last_params: None
        }
    }
}

impl DisparityAlgorithm for ScriptedEngine {
    fn configure(&mut self, params: &MatcherParameters) -> Result<()> {
        let mut script = self.script.borrow_mut();
        script.configures += 1;

        if let Some((field, value)) = script.refuse {
            if params.get(field) == Some(value) {
                return Err(Error::AdapterConfiguration {
                    field,
                    value,
                    reason: "scripted refusal".into()
                });
            }
        }

        script.last_params = Some(*params);
        Ok(())
    }

    fn set_valid_regions(&mut self, left: ValidRegion, right: ValidRegion) {
        self.script.borrow_mut().regions = Some((left, right));
    }

    fn compute(&mut self, frame: &StereoFrame) -> Result<DisparityMap> {
        let mut script = self.script.borrow_mut();
        script.computes += 1;

        if script.fail_compute {
            return Err(Error::Compute("scripted failure".into()));
        }

        let mut map = DisparityMap::new(frame.width(), frame.height());
        for y in 0..frame.height() {
            for x in 0..frame.width() {
                let val = match script.output {
                    Output::Gradient if x == 0 => UNKNOWN_DISPARITY,
                    Output::Gradient => x as f32,
                    Output::Unknown => UNKNOWN_DISPARITY,
                    Output::Constant(v) => v
                };
                map.put(x, y, val);
            }
        }

        Ok(map)
    }
}

pub type Factory = Box<dyn Fn(AlgorithmKind) -> Result<Box<dyn DisparityAlgorithm>>>;

/// A factory whose engines all report to the same script.
pub fn scripted_factory(script: &Rc<RefCell<Script>>) -> Factory {
    let script = Rc::clone(script);

    Box::new(move |kind| {
        script.borrow_mut().creates.push(kind);
        Ok(Box::new(ScriptedEngine {
            script: Rc::clone(&script)
        }) as Box<dyn DisparityAlgorithm>)
    })
}

pub fn blank_frame() -> StereoFrame {
    StereoFrame::from_gray(GrayImage::new(WIDTH, HEIGHT), GrayImage::new(WIDTH, HEIGHT))
        .expect("same size")
}

pub fn scripted_pipeline() -> (DisparityPipeline<Factory>, Rc<RefCell<Script>>) {
    let script = Rc::new(RefCell::new(Script::default()));
    let pipeline = DisparityPipeline::new(blank_frame(), scripted_factory(&script));

    (pipeline, script)
}
