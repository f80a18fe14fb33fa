use std::path::PathBuf;

use optrack_core::{Real, RigidTransform};
use optrack_linear::MarkerPoseEstimator;

use crate::fusion::FusionMethod;

/// How a tool is recognized in the image.
#[derive(Debug, Clone, PartialEq)]
pub enum TrackingMode {
    SingleMarker { marker_id: i32, marker_size_mm: Real },
    /// Rigid multi-marker board; recognized in configuration only.
    MarkerMap { file: PathBuf },
}

/// Validated tool description resolved from the configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolSpec {
    /// `"<name>To<reference frame>"`.
    pub source_id: String,
    pub name: String,
    pub mode: TrackingMode,
    pub fusion: FusionMethod,
}

/// A configured tool with its pose-estimator state and last estimates.
pub struct TrackedTool {
    spec: ToolSpec,
    estimator: Box<dyn MarkerPoseEstimator>,
    pub(crate) last_rgb: Option<RigidTransform>,
    pub(crate) last_depth: Option<RigidTransform>,
    pub(crate) fused: RigidTransform,
}

impl TrackedTool {
    pub fn new(spec: ToolSpec, estimator: Box<dyn MarkerPoseEstimator>) -> Self {
        Self {
            spec,
            estimator,
            last_rgb: None,
            last_depth: None,
            fused: RigidTransform::identity(),
        }
    }

    pub fn spec(&self) -> &ToolSpec {
        &self.spec
    }

    pub fn source_id(&self) -> &str {
        &self.spec.source_id
    }

    pub fn fusion(&self) -> FusionMethod {
        self.spec.fusion
    }

    pub fn mode(&self) -> &TrackingMode {
        &self.spec.mode
    }

    /// Most recent optical transform (millimeters).
    pub fn last_rgb(&self) -> Option<&RigidTransform> {
        self.last_rgb.as_ref()
    }

    /// Most recent depth-derived transform (millimeters).
    pub fn last_depth(&self) -> Option<&RigidTransform> {
        self.last_depth.as_ref()
    }

    /// Fused transform carried across frames by stateful policies; identity
    /// until the first fusion.
    pub fn fused(&self) -> &RigidTransform {
        &self.fused
    }

    pub(crate) fn estimator_mut(&mut self) -> &mut dyn MarkerPoseEstimator {
        self.estimator.as_mut()
    }
}
