//! The optical marker tracking device.
//!
//! [`OpticalMarkerTracker`] owns the configured tools and turns one set of
//! frame inputs into at most one [`ToolUpdate`] per tool:
//!
//! 1. a tool whose marker is not detected reports identity with
//!    [`ToolStatus::OutOfView`];
//! 2. otherwise its pose estimator computes the optical transform; a failure
//!    is logged and the tool is skipped for this frame;
//! 3. in `RGB_AND_DEPTH` mode, tools whose fusion policy needs depth fit a
//!    plane to the point-cloud samples inside the marker and build a depth
//!    transform from it;
//! 4. the fusion policy combines both and the result is reported with
//!    [`ToolStatus::Ok`].
//!
//! All updates of a frame share its timestamp and frame number.

use std::path::{Path, PathBuf};

use log::{debug, error, info, trace, warn};
use optrack_core::{CameraCalibration, Detection, PointCloud, Real, RigidTransform, MM_PER_M};
use optrack_linear::{
    fit_plane, plane_to_transform, FrameOptions, HomographyPoseTracker, MarkerPoseEstimator,
    PlaneFitError, PlaneFitOptions, PoseOptions, RegionExtractor,
};
use serde::{Deserialize, Serialize};

use crate::config::{InputType, PlaneFitFailurePolicy, TrackerConfig};
use crate::error::TrackerError;
use crate::fusion::{fuse, FusionOutcome};
use crate::sink::{ToolStatus, ToolUpdate, TransformSink};
use crate::tool::{TrackedTool, TrackingMode};

/// Acquisition rate used when no input channel reports one.
pub const DEFAULT_ACQUISITION_RATE_HZ: Real = 30.0;

/// Builds the pose estimator of each tool.
pub type EstimatorFactory = Box<dyn Fn(&PoseOptions) -> Box<dyn MarkerPoseEstimator>>;

/// An upstream stream the tracker reads from.
#[derive(Debug, Clone, PartialEq)]
pub struct InputChannel {
    pub id: String,
    pub acquisition_rate_hz: Option<Real>,
}

impl InputChannel {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_owned(),
            acquisition_rate_hz: None,
        }
    }

    pub fn with_rate(mut self, hz: Real) -> Self {
        self.acquisition_rate_hz = Some(hz);
        self
    }
}

/// Everything the tracker consumes for one frame.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameInputs {
    pub timestamp: f64,
    /// `None` while no video frame has been buffered yet.
    pub detections: Option<Vec<Detection>>,
    pub point_cloud: Option<PointCloud>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ToolOutcome {
    /// An `Ok` update was emitted.
    Updated,
    /// Marker not detected; an identity `OutOfView` update was emitted.
    OutOfView,
    PoseFailed,
    PlaneFitFailed(PlaneFitError),
    /// Marker map tracking or a policy without an estimator.
    Unsupported,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    VideoNotBuffered,
    DepthNotBuffered,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FrameSummary {
    pub frame_number: u64,
    pub timestamp: f64,
    /// Outcome per processed tool, in configuration order.
    pub tools: Vec<(String, ToolOutcome)>,
    /// A plane-fit failure stopped the tool loop early.
    pub aborted: bool,
}

impl FrameSummary {
    pub fn outcome(&self, source_id: &str) -> Option<&ToolOutcome> {
        self.tools
            .iter()
            .find(|(id, _)| id == source_id)
            .map(|(_, outcome)| outcome)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FrameOutcome {
    /// Inputs were not available yet; nothing was emitted.
    Skipped(SkipReason),
    Processed(FrameSummary),
}

/// Read-only state shared by every tool of one frame.
struct FrameContext<'a> {
    calibration: &'a CameraCalibration,
    cloud: Option<&'a PointCloud>,
    extractor: &'a RegionExtractor,
    plane_fit: &'a PlaneFitOptions,
    frame: &'a FrameOptions,
    frame_number: u64,
    timestamp: f64,
}

impl FrameContext<'_> {
    fn emit(
        &self,
        sink: &mut dyn TransformSink,
        tool: &TrackedTool,
        transform: RigidTransform,
        status: ToolStatus,
    ) {
        sink.tool_time_stamped_update(ToolUpdate {
            source_id: tool.source_id().to_owned(),
            transform,
            status,
            frame_number: self.frame_number,
            timestamp: self.timestamp,
        });
    }

    fn process(
        &self,
        tool: &mut TrackedTool,
        detections: &[Detection],
        sink: &mut dyn TransformSink,
    ) -> ToolOutcome {
        let (marker_id, marker_size_mm) = match tool.mode() {
            TrackingMode::SingleMarker {
                marker_id,
                marker_size_mm,
            } => (*marker_id, *marker_size_mm),
            TrackingMode::MarkerMap { .. } => {
                debug!("{}: marker map tracking unsupported", tool.source_id());
                return ToolOutcome::Unsupported;
            }
        };

        let Some(detection) = detections.iter().find(|d| d.id == marker_id) else {
            self.emit(sink, tool, RigidTransform::identity(), ToolStatus::OutOfView);
            return ToolOutcome::OutOfView;
        };

        let pose = tool.estimator_mut().estimate_pose(
            detection,
            self.calibration,
            marker_size_mm / MM_PER_M,
        );
        let Some(pose) = pose else {
            error!(
                "{}: pose estimation failed for marker {}",
                tool.source_id(),
                marker_id
            );
            return ToolOutcome::PoseFailed;
        };
        let optical = pose.to_transform_mm();
        tool.last_rgb = Some(optical);

        let method = tool.fusion();
        if !method.has_estimator() {
            debug!("{}: {} fusion has no estimator", tool.source_id(), method.as_str());
            return ToolOutcome::Unsupported;
        }
        let depth = match self.cloud {
            Some(cloud) if method.requires_depth() => {
                let samples = self.extractor.extract_corners(cloud, &detection.corners);
                match fit_plane(&samples, self.plane_fit) {
                    Ok(plane) => {
                        let (transform, _) = plane_to_transform(
                            &plane.normal,
                            &optical.axis(0),
                            &plane.centroid,
                            self.frame,
                        );
                        tool.last_depth = Some(transform);
                        Some(transform)
                    }
                    Err(e) => {
                        warn!("{}: plane fit failed: {e}", tool.source_id());
                        return ToolOutcome::PlaneFitFailed(e);
                    }
                }
            }
            _ => None,
        };

        debug!("{}: {} fusion", tool.source_id(), method.as_str());
        match fuse(method, &optical, depth.as_ref()) {
            FusionOutcome::Fused(transform) => {
                if method.carries_state() {
                    tool.fused = transform;
                }
                self.emit(sink, tool, transform, ToolStatus::Ok);
                ToolOutcome::Updated
            }
            FusionOutcome::MissingDepth | FusionOutcome::Unsupported => {
                debug!(
                    "{}: {} fusion produced no pose",
                    tool.source_id(),
                    method.as_str()
                );
                ToolOutcome::Unsupported
            }
        }
    }
}

/// Optical marker tracker with optional depth fusion.
pub struct OpticalMarkerTracker {
    config: TrackerConfig,
    config_dir: Option<PathBuf>,
    tools: Vec<TrackedTool>,
    extractor: RegionExtractor,
    calibration: Option<CameraCalibration>,
    acquisition_rate_hz: Real,
    frame_number: u64,
    last_processed_timestamp: Option<f64>,
}

impl OpticalMarkerTracker {
    /// Validate `config` and build one homography pose tracker per tool.
    pub fn new(config: TrackerConfig) -> Result<Self, TrackerError> {
        Self::with_estimator_factory(
            config,
            Box::new(|opts: &PoseOptions| -> Box<dyn MarkerPoseEstimator> {
                Box::new(HomographyPoseTracker::new(*opts))
            }),
        )
    }

    pub fn with_estimator_factory(
        config: TrackerConfig,
        factory: EstimatorFactory,
    ) -> Result<Self, TrackerError> {
        let tools = config
            .tool_specs()?
            .into_iter()
            .map(|spec| TrackedTool::new(spec, factory(&config.pose)))
            .collect::<Vec<_>>();
        info!(
            "optical marker tracker: {} tool(s), input {}, dictionary {}",
            tools.len(),
            config.input_type.as_str(),
            config.marker_dictionary
        );
        Ok(Self {
            extractor: RegionExtractor::new(config.depth_range),
            config,
            config_dir: None,
            tools,
            calibration: None,
            acquisition_rate_hz: DEFAULT_ACQUISITION_RATE_HZ,
            frame_number: 0,
            last_processed_timestamp: None,
        })
    }

    /// Load a JSON configuration; relative paths in it resolve against the
    /// file's directory.
    pub fn from_config_file(path: &Path) -> anyhow::Result<Self> {
        let config = TrackerConfig::from_json_file(path)?;
        let tracker = Self::new(config)?;
        Ok(tracker.with_config_dir(path.parent().unwrap_or(Path::new("."))))
    }

    pub fn with_config_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config_dir = Some(dir.into());
        self
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// Calibration file path with the configuration directory applied.
    pub fn calibration_path(&self) -> PathBuf {
        let file = &self.config.camera_calibration_file;
        match &self.config_dir {
            Some(dir) if file.is_relative() => dir.join(file),
            _ => file.clone(),
        }
    }

    /// Load the camera calibration and attach the input channels.
    pub fn connect(&mut self, channels: &[InputChannel]) -> Result<(), TrackerError> {
        let path = self.calibration_path();
        if !path.is_file() {
            return Err(TrackerError::MissingCalibration(path));
        }
        let calibration =
            CameraCalibration::from_json_file(&path).map_err(|e| TrackerError::Calibration {
                path: path.clone(),
                message: format!("{e:#}"),
            })?;
        self.connect_with_calibration(calibration, channels)
    }

    pub fn connect_with_calibration(
        &mut self,
        calibration: CameraCalibration,
        channels: &[InputChannel],
    ) -> Result<(), TrackerError> {
        let input = self.config.input_type;
        if channels.len() != input.channel_count() {
            return Err(TrackerError::ChannelCount {
                input: input.as_str(),
                expected: input.channel_count(),
                actual: channels.len(),
            });
        }

        let lowest = channels
            .iter()
            .filter_map(|c| c.acquisition_rate_hz)
            .filter(|hz| *hz > 0.0)
            .reduce(Real::min);
        self.acquisition_rate_hz = match lowest {
            Some(hz) => hz,
            None => {
                warn!(
                    "no input channel reports an acquisition rate, using {} Hz",
                    DEFAULT_ACQUISITION_RATE_HZ
                );
                DEFAULT_ACQUISITION_RATE_HZ
            }
        };

        info!(
            "connected: {}x{} camera, {} Hz",
            calibration.image_width, calibration.image_height, self.acquisition_rate_hz
        );
        self.calibration = Some(calibration);
        Ok(())
    }

    pub fn disconnect(&mut self) {
        if self.calibration.take().is_some() {
            info!("disconnected");
        }
    }

    pub fn is_connected(&self) -> bool {
        self.calibration.is_some()
    }

    pub fn acquisition_rate_hz(&self) -> Real {
        self.acquisition_rate_hz
    }

    /// Number of the next frame to be processed.
    pub fn frame_number(&self) -> u64 {
        self.frame_number
    }

    pub fn last_processed_timestamp(&self) -> Option<f64> {
        self.last_processed_timestamp
    }

    pub fn tools(&self) -> &[TrackedTool] {
        &self.tools
    }

    pub fn tool(&self, source_id: &str) -> Option<&TrackedTool> {
        self.tools.iter().find(|t| t.source_id() == source_id)
    }

    /// Serialize the active configuration.
    pub fn write_configuration(&self) -> anyhow::Result<String> {
        self.config.to_json()
    }

    /// Process one frame and hand the resulting tool updates to `sink`.
    pub fn update(
        &mut self,
        inputs: &FrameInputs,
        sink: &mut dyn TransformSink,
    ) -> Result<FrameOutcome, TrackerError> {
        let Some(calibration) = self.calibration.as_ref() else {
            return Err(TrackerError::NotConnected);
        };
        let Some(detections) = inputs.detections.as_deref() else {
            trace!("no video frame buffered yet");
            return Ok(FrameOutcome::Skipped(SkipReason::VideoNotBuffered));
        };
        let cloud = match self.config.input_type {
            InputType::RgbOnly => None,
            InputType::RgbAndDepth => match inputs.point_cloud.as_ref() {
                Some(cloud) => Some(cloud),
                None => {
                    trace!("no depth frame buffered yet");
                    return Ok(FrameOutcome::Skipped(SkipReason::DepthNotBuffered));
                }
            },
        };
        if let Some(last) = self.last_processed_timestamp {
            if inputs.timestamp < last {
                debug!(
                    "frame at {} is older than the last processed frame at {}",
                    inputs.timestamp, last
                );
            }
        }

        let ctx = FrameContext {
            calibration,
            cloud,
            extractor: &self.extractor,
            plane_fit: &self.config.plane_fit,
            frame: &self.config.frame,
            frame_number: self.frame_number,
            timestamp: inputs.timestamp,
        };
        let policy = self.config.plane_fit_failure;
        let mut summary = FrameSummary {
            frame_number: self.frame_number,
            timestamp: inputs.timestamp,
            tools: Vec::with_capacity(self.tools.len()),
            aborted: false,
        };

        for tool in self.tools.iter_mut() {
            let outcome = ctx.process(tool, detections, sink);
            let abort = policy == PlaneFitFailurePolicy::AbortFrame
                && matches!(outcome, ToolOutcome::PlaneFitFailed(_));
            summary.tools.push((tool.source_id().to_owned(), outcome));
            if abort {
                warn!(
                    "frame {}: aborted after plane fit failure of {}",
                    summary.frame_number,
                    tool.source_id()
                );
                summary.aborted = true;
                break;
            }
        }

        self.frame_number += 1;
        self.last_processed_timestamp = Some(inputs.timestamp);
        Ok(FrameOutcome::Processed(summary))
    }
}
