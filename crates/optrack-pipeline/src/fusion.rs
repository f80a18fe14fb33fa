//! Per-tool fusion policies combining the optical and depth estimates.

use optrack_core::{RigidTransform, Vec3};
use serde::{Deserialize, Serialize};

/// How a tool combines its optical (RGB) and depth transforms.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FusionMethod {
    /// Optical pose only.
    #[default]
    #[serde(rename = "RGB_ONLY")]
    RgbOnly,
    /// Plane pose from the point cloud only.
    #[serde(rename = "DEPTH_ONLY")]
    DepthOnly,
    /// Optical rotation and in-plane translation, depth along the camera axis.
    #[serde(rename = "COMPONENT")]
    Component,
    /// Accepted in configuration; never produces a pose.
    #[serde(rename = "KALMAN")]
    Kalman,
}

impl FusionMethod {
    pub fn requires_depth(self) -> bool {
        !matches!(self, FusionMethod::RgbOnly)
    }

    /// Whether the policy can produce a pose at all.
    pub fn has_estimator(self) -> bool {
        !matches!(self, FusionMethod::Kalman)
    }

    /// Whether the fused result is carried on the tool between frames.
    pub fn carries_state(self) -> bool {
        matches!(self, FusionMethod::Component | FusionMethod::Kalman)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FusionMethod::RgbOnly => "RGB_ONLY",
            FusionMethod::DepthOnly => "DEPTH_ONLY",
            FusionMethod::Component => "COMPONENT",
            FusionMethod::Kalman => "KALMAN",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FusionOutcome {
    Fused(RigidTransform),
    /// The policy needs a depth transform and none was supplied.
    MissingDepth,
    /// The policy has no estimator behind it.
    Unsupported,
}

/// Rotation and x/y translation from `optical`, z translation from `depth`.
pub fn component_fusion(optical: &RigidTransform, depth: &RigidTransform) -> RigidTransform {
    let t_opt = optical.translation();
    let t = Vec3::new(t_opt.x, t_opt.y, depth.translation().z);
    RigidTransform::from_parts(&optical.rotation(), &t)
}

/// Apply `method` to the estimates of one tool.
pub fn fuse(
    method: FusionMethod,
    optical: &RigidTransform,
    depth: Option<&RigidTransform>,
) -> FusionOutcome {
    match (method, depth) {
        (FusionMethod::RgbOnly, _) => FusionOutcome::Fused(*optical),
        (FusionMethod::Kalman, _) => FusionOutcome::Unsupported,
        (FusionMethod::DepthOnly, Some(depth)) => FusionOutcome::Fused(*depth),
        (FusionMethod::Component, Some(depth)) => {
            FusionOutcome::Fused(component_fusion(optical, depth))
        }
        (FusionMethod::DepthOnly | FusionMethod::Component, None) => FusionOutcome::MissingDepth,
    }
}
