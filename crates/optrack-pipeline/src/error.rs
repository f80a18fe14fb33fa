use std::path::PathBuf;

use thiserror::Error;

use crate::fusion::FusionMethod;

/// Setup and lifecycle errors of the tracker.
///
/// Per-frame problems (missing inputs, pose or plane-fit failures) are not
/// errors; they are reported through [`crate::FrameOutcome`].
#[derive(Debug, Error, Clone, PartialEq)]
pub enum TrackerError {
    #[error("tool {tool} uses {method:?} fusion, which needs depth, but the input type is RGB_ONLY")]
    DepthRequired { tool: String, method: FusionMethod },
    #[error("data source #{index} has no id")]
    MissingToolId { index: usize },
    #[error("tool {id}: {reason}")]
    MalformedToolSource { id: String, reason: String },
    #[error("marker dictionary is not set")]
    EmptyDictionary,
    #[error("duplicate tool source id {0}")]
    DuplicateSourceId(String),
    #[error("camera calibration file {} does not exist", .0.display())]
    MissingCalibration(PathBuf),
    #[error("failed to load camera calibration {}: {message}", .path.display())]
    Calibration { path: PathBuf, message: String },
    #[error("input type {input} needs {expected} input channel(s), got {actual}")]
    ChannelCount {
        input: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("tracker is not connected")]
    NotConnected,
}
