//! Per-marker geometry for `optrack`.
//!
//! Everything here works on one marker at a time: classify its corner
//! quadrilateral, harvest the point-cloud samples on its face, fit a plane to
//! them, turn the plane into a rigid frame, and estimate the optical pose from
//! the corners alone.

mod frame;
mod homography;
mod marker_pose;
mod orientation;
mod plane;
mod region;

pub use frame::*;
pub use homography::*;
pub use marker_pose::*;
pub use orientation::*;
pub use plane::*;
pub use region::*;
