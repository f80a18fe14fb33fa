use std::{error::Error, fs, path::Path};

use clap::Parser;
use log::info;
use optrack_core::CameraCalibration;
use optrack_pipeline::{
    FrameInputs, FrameOutcome, InputChannel, InputType, OpticalMarkerTracker, ToolUpdate,
};
use serde::{Deserialize, Serialize};

/// Replay recorded marker detections and point clouds through the tracker.
#[derive(Debug, Parser)]
#[command(author, version, about = "Optical marker + depth tool tracking replay")]
struct Args {
    /// Path to the JSON tracker configuration.
    #[arg(long)]
    config: String,

    /// Path to a JSON array of recorded frame inputs.
    #[arg(long)]
    frames: String,

    /// Camera calibration JSON overriding the one named in the configuration.
    #[arg(long)]
    calibration: Option<String>,

    /// Acquisition rate reported for every input channel, in Hz.
    #[arg(long)]
    rate: Option<f64>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct ReplayReport {
    processed: usize,
    skipped: usize,
    updates: Vec<ToolUpdate>,
}

fn load_json_file<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, Box<dyn Error>> {
    let data = fs::read_to_string(path)?;
    let value = serde_json::from_str(&data)?;
    Ok(value)
}

fn input_channels(input: InputType, rate: Option<f64>) -> Vec<InputChannel> {
    let names: &[&str] = match input {
        InputType::RgbOnly => &["Video"],
        InputType::RgbAndDepth => &["Video", "Depth"],
    };
    names
        .iter()
        .map(|name| {
            let channel = InputChannel::new(name);
            match rate {
                Some(hz) => channel.with_rate(hz),
                None => channel,
            }
        })
        .collect()
}

fn replay_from_files(
    config_path: &str,
    frames_path: &str,
    calibration_path: Option<&str>,
    rate: Option<f64>,
) -> Result<String, Box<dyn Error>> {
    let mut tracker = OpticalMarkerTracker::from_config_file(Path::new(config_path))?;
    let channels = input_channels(tracker.config().input_type, rate);
    match calibration_path {
        Some(path) => {
            let calibration = CameraCalibration::from_json_file(Path::new(path))?;
            tracker.connect_with_calibration(calibration, &channels)?;
        }
        None => tracker.connect(&channels)?,
    }

    let frames: Vec<FrameInputs> = load_json_file(Path::new(frames_path))?;
    let mut report = ReplayReport::default();
    for frame in &frames {
        match tracker.update(frame, &mut report.updates)? {
            FrameOutcome::Processed(_) => report.processed += 1,
            FrameOutcome::Skipped(_) => report.skipped += 1,
        }
    }
    tracker.disconnect();
    info!(
        "replayed {} frame(s): {} processed, {} skipped, {} update(s)",
        frames.len(),
        report.processed,
        report.skipped,
        report.updates.len()
    );

    Ok(serde_json::to_string_pretty(&report)?)
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    if let Err(err) = try_main() {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn try_main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    let json = replay_from_files(
        &args.config,
        &args.frames,
        args.calibration.as_deref(),
        args.rate,
    )?;
    println!("{}", json);
    Ok(())
}
