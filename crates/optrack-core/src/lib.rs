//! Core math and data types for `optrack`.
//!
//! This crate contains:
//! - linear algebra aliases and geometry primitives (`Real`, `Pt2`,
//!   [`vector_angle_deg`], [`inverse_slope`], ...),
//! - the homogeneous [`RigidTransform`] reported for every tool,
//! - the pinhole [`CameraCalibration`] loaded at connect time,
//! - per-frame inputs ([`Detection`], [`PointCloud`]),
//! - a seeded, bounded RANSAC engine ([`ransac`], [`Estimator`]),
//! - [`synthetic`] marker scenes for tests.

/// Camera calibration model and loading.
mod camera;
/// Marker detections and organized point clouds.
mod frame;
/// Type aliases and geometry helpers.
mod math;
/// Generic RANSAC engine.
mod ransac;
mod transform;

pub mod synthetic;

pub use camera::*;
pub use frame::*;
pub use math::*;
pub use ransac::*;
pub use transform::*;
