//! High-level entry crate for `optrack`: optical marker + depth tool tracking.
//!
//! Each tracked tool carries one square fiducial marker. Per frame the
//! tracker estimates the marker pose from its four detected corners and, when
//! a depth point cloud is available and the tool's fusion policy asks for it,
//! fits a plane to the cloud samples on the marker face and fuses both
//! estimates.
//!
//! ## Running the tracker
//!
//! ```no_run
//! use optrack::prelude::*;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = TrackerConfig::new(
//!     "camera.json",
//!     InputType::RgbAndDepth,
//!     "ARUCO_MIP_36h12",
//!     vec![ToolSourceConfig::single_marker("Stylus", 3, 50.0)
//!         .with_fusion(FusionMethod::Component)],
//! );
//! let mut tracker = OpticalMarkerTracker::new(config)?;
//! tracker.connect(&[InputChannel::new("Video"), InputChannel::new("Depth")])?;
//!
//! let mut updates: Vec<ToolUpdate> = Vec::new();
//! let inputs = FrameInputs {
//!     timestamp: 0.0,
//!     detections: Some(vec![/* detector output */]),
//!     point_cloud: None, // aligned depth cloud
//! };
//! tracker.update(&inputs, &mut updates)?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Using the geometry directly
//!
//! The per-marker building blocks live in [`linear`]:
//! [`linear::classify_corners`], [`linear::RegionExtractor`],
//! [`linear::fit_plane`] and [`linear::plane_to_transform`].

/// Core math types, camera model, frame inputs and RANSAC.
pub mod core {
    pub use optrack_core::*;
}

/// Per-marker geometry: region extraction, plane fit, frame construction and
/// optical pose.
pub mod linear {
    pub use optrack_linear::*;
}

/// Tracker device, configuration, fusion policies and transform sinks.
pub mod pipeline {
    pub use optrack_pipeline::*;
}

/// The types most applications need.
pub mod prelude {
    pub use optrack_core::{CameraCalibration, Detection, PointCloud, RigidTransform};
    pub use optrack_pipeline::{
        FrameInputs, FrameOutcome, FusionMethod, InputChannel, InputType, OpticalMarkerTracker,
        ToolSourceConfig, ToolStatus, ToolUpdate, TrackerConfig, TransformSink,
    };
}
