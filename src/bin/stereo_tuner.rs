//! # Stereo tuner
//!
//! Headless tuning session: loads a stereo pair (rectifying it when calibration is given), applies
//! parameter edits, writes the disparity visualisation and reports depth at a probed pixel.

// -----------------------------------------------------------------------------------------------
// IMPORTS
// -----------------------------------------------------------------------------------------------

use clap::{Parser, ValueEnum};
use log::{info, warn};
use std::path::PathBuf;

use cv_stereo_tuner::calibration::StereoCalibration;
use cv_stereo_tuner::prelude::*;
use cv_stereo_tuner::rectify::rectify_frame;
use cv_stereo_tuner::sad::sad_factory;

// -----------------------------------------------------------------------------------------------
// TYPES
// -----------------------------------------------------------------------------------------------

type CliResult<T> = std::result::Result<T, Box<dyn std::error::Error>>;

// -----------------------------------------------------------------------------------------------
// DATA STRUCTURES
// -----------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Algorithm {
    Bm,
    Sgbm
}

#[derive(Parser, Debug)]
#[command(name = "stereo-tuner")]
#[command(about = "Tune stereo matcher parameters against a fixed image pair")]
#[command(version)]
struct Cli {
    /// Left image of the pair.
    #[arg(long, default_value = "tsukuba/scene1.row3.col3.ppm")]
    left: PathBuf,

    /// Right image of the pair.
    #[arg(long, default_value = "tsukuba/scene1.row3.col5.ppm")]
    right: PathBuf,

    /// Intrinsics file (M1, D1, M2, D2). Rectifies the pair together with --extrinsics.
    #[arg(long)]
    intrinsics: Option<PathBuf>,

    /// Extrinsics file (R, T).
    #[arg(long)]
    extrinsics: Option<PathBuf>,

    /// Matcher to start with.
    #[arg(long, value_enum, default_value = "bm")]
    algorithm: Algorithm,

    /// Parameter file to load (.yml, .xml or .json).
    #[arg(long)]
    params: Option<PathBuf>,

    /// Parameter edit, e.g. `blockSize=9`. May be repeated.
    #[arg(long = "set", value_name = "FIELD=VALUE")]
    edits: Vec<String>,

    /// Where to save the final parameters.
    #[arg(long)]
    save_params: Option<PathBuf>,

    /// Where to write the normalised disparity image.
    #[arg(long, default_value = "disparity.png")]
    output: PathBuf,

    /// Pixel to estimate depth at, as `x,y`.
    #[arg(long)]
    probe: Option<String>,

    /// Focal length, in pixels unless --metric is given.
    #[arg(long, default_value_t = 0.0)]
    focal_length: f64,

    /// Sensor width, in the focal length's unit. Only used with --metric.
    #[arg(long, default_value_t = 0.0)]
    sensor_width: f64,

    /// Distance between the two camera centres.
    #[arg(long, default_value_t = 0.0)]
    baseline: f64,

    /// Interpret the focal length in sensor units rather than pixels.
    #[arg(long)]
    metric: bool
}

// -----------------------------------------------------------------------------------------------
// MAIN
// -----------------------------------------------------------------------------------------------

fn main() -> CliResult<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    let mut frame = StereoFrame::open(&cli.left, &cli.right)?;

    match (&cli.intrinsics, &cli.extrinsics) {
        (Some(intrinsics), Some(extrinsics)) => {
            info!("Using provided calibration files to undistort and rectify images");
            let calib = StereoCalibration::load(intrinsics, extrinsics)?;
            frame = rectify_frame(&calib, &frame)?.frame;
        }
        (None, None) => (),
        _ => warn!("Both --intrinsics and --extrinsics are needed to rectify, using raw images")
    }

    let mut pipeline = DisparityPipeline::new(frame, sad_factory);

    // Past this point errors are reported and the session carries on with its last good state
    {
        let kind = match cli.algorithm {
            Algorithm::Bm => AlgorithmKind::BlockMatch,
            Algorithm::Sgbm => AlgorithmKind::SemiGlobalBlockMatch
        };

        let mut bulk = pipeline.begin_bulk_edit();
        if let Err(e) = bulk.select_algorithm(kind) {
            warn!("Could not select {}: {}", kind, e);
        }
        if let Err(e) = bulk.finish() {
            warn!("Initial disparity computation failed: {}", e);
        }
    }

    if let Some(path) = &cli.params {
        match pipeline.load_params(path) {
            Ok(report) => info!(
                "Applied {} fields, {} rejected",
                report.applied.len(),
                report.rejected.len()
            ),
            Err(e) => warn!("Could not load {}: {}", path.display(), e)
        }
    }

    let applied = apply_edits(&mut pipeline, &cli.edits);
    if !cli.edits.is_empty() {
        info!("Applied {} of {} edits", applied, cli.edits.len());
    }

    if let Some(path) = &cli.save_params {
        if let Err(e) = pipeline.save_params(path) {
            warn!("Could not save parameters to {}: {}", path.display(), e);
        }
    }

    match pipeline.result() {
        Some(result) => {
            result.normalised.save(&cli.output)?;
            info!("Disparity written to {}", cli.output.display());
        }
        None => warn!("No disparity map was computed, nothing written to {}", cli.output.display())
    }

    if let Some(probe) = &cli.probe {
        let (x, y) = parse_probe(probe)?;
        let inputs = CalibrationInputs {
            focal_length: cli.focal_length,
            sensor_width: cli.sensor_width,
            baseline: cli.baseline,
            image_width: pipeline.image_width()
        };
        let mode = if cli.metric { DepthMode::MetricFocal } else { DepthMode::PixelFocal };

        let probe = pipeline.depth_at(x, y, &inputs, mode);
        match probe.depth {
            Some(depth) => println!(
                "{} @ (x: {}, y: {}), baseline: {}",
                depth, probe.x, probe.y, cli.baseline
            ),
            None => println!("depth unavailable @ (x: {}, y: {})", probe.x, probe.y)
        }
    }

    Ok(())
}

// -----------------------------------------------------------------------------------------------
// FUNCTIONS
// -----------------------------------------------------------------------------------------------

/// Apply `FIELD=VALUE` edits in order, re-applying a single adjustment. Failed edits are logged
/// and skipped. Returns how many edits were stored.
fn apply_edits<F: EngineFactory>(
    pipeline: &mut DisparityPipeline<F>,
    edits: &[String]
) -> usize {
    let mut applied = 0;

    for edit in edits {
        let (field, value) = match parse_edit(edit) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!("Ignoring edit {:?}: {}", edit, e);
                continue;
            }
        };

        let outcome = match pipeline.set_param(field, value) {
            Ok(SetOutcome::Adjusted(v)) => {
                info!("{} adjusted to {}", field, v);
                pipeline.set_param(field, v)
            }
            other => other
        };

        match outcome {
            Ok(SetOutcome::Accepted) => applied += 1,
            Ok(SetOutcome::Rejected(reason)) => {
                warn!("{} = {} rejected: {}", field, value, reason)
            }
            Ok(SetOutcome::Adjusted(v)) => {
                warn!("{} = {} needs a further adjustment to {}", field, value, v)
            }
            Err(e) => warn!("{} = {} not applied: {}", field, value, e)
        }
    }

    applied
}

fn parse_edit(edit: &str) -> CliResult<(FieldId, i32)> {
    let (name, value) = edit
        .split_once('=')
        .ok_or_else(|| format!("expected FIELD=VALUE, got {:?}", edit))?;
    let field = FieldId::from_name(name.trim())
        .ok_or_else(|| format!("unknown parameter {:?}", name))?;

    Ok((field, value.trim().parse()?))
}

fn parse_probe(probe: &str) -> CliResult<(u32, u32)> {
    let (x, y) = probe
        .split_once(',')
        .ok_or_else(|| format!("expected x,y, got {:?}", probe))?;

    Ok((x.trim().parse()?, y.trim().parse()?))
}

// -----------------------------------------------------------------------------------------------
// TESTS
// -----------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use image::GrayImage;

    #[test]
    fn refused_and_malformed_edits_do_not_stop_the_session() {
        let frame = StereoFrame::from_gray(GrayImage::new(48, 32), GrayImage::new(48, 32)).unwrap();
        let mut pipeline = DisparityPipeline::new(frame, sad_factory);
        let edits: Vec<String> = vec![
            "blockSize=3".into(),
            "nonsense".into(),
            "P1=8".into(),
            "numDisparities=20".into(),
            "blockSize=8".into()
        ];

        assert_eq!(apply_edits(&mut pipeline, &edits), 2);
        assert_eq!(pipeline.store().get(FieldId::NumDisparities), Some(32));
        assert_eq!(pipeline.store().get(FieldId::BlockSize), Some(9));
        assert!(pipeline.result().is_some());
    }

    #[test]
    fn edits_are_parsed() {
        assert_eq!(parse_edit(" textureThreshold = 12").unwrap(), (FieldId::TextureThreshold, 12));
        assert!(parse_edit("blockSize").is_err());
        assert!(parse_edit("blocksize=5").is_err());
        assert_eq!(parse_probe("3, 4").unwrap(), (3, 4));
    }
}
