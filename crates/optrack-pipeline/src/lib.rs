//! Per-frame tracking pipeline for `optrack`.
//!
//! The entry point is [`OpticalMarkerTracker`]: build it from a
//! [`TrackerConfig`], connect it to a camera calibration and its input
//! channels, then feed it [`FrameInputs`] and collect [`ToolUpdate`]s through
//! a [`TransformSink`].
//!
//! ```no_run
//! use optrack_pipeline::{FrameInputs, InputChannel, OpticalMarkerTracker, ToolUpdate};
//!
//! let mut tracker =
//!     OpticalMarkerTracker::from_config_file(std::path::Path::new("tracker.json")).unwrap();
//! tracker.connect(&[InputChannel::new("Video")]).unwrap();
//!
//! let mut updates: Vec<ToolUpdate> = Vec::new();
//! let inputs = FrameInputs {
//!     timestamp: 0.0,
//!     detections: Some(Vec::new()),
//!     point_cloud: None,
//! };
//! tracker.update(&inputs, &mut updates).unwrap();
//! ```

mod config;
mod error;
mod fusion;
mod sink;
mod tool;
mod tracker;

pub use config::*;
pub use error::*;
pub use fusion::*;
pub use sink::*;
pub use tool::*;
pub use tracker::*;
