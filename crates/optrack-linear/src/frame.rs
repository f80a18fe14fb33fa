//! Build a rigid frame from a fitted plane.
//!
//! The plane normal becomes the z axis after its sign is repaired against an
//! expected direction. The in-plane x axis comes from a guess (normally the
//! optical estimate's x axis) unless the guess is nearly parallel to the
//! normal, in which case the camera x or y axis is used instead.

use log::debug;
use optrack_core::{vector_angle_deg, Mat3, Pt3, Real, RigidTransform, Vec3};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameOptions {
    /// Minimum angle between a candidate x axis and the normal line, in
    /// degrees. Parallel and antiparallel candidates are equally unstable.
    pub stability_threshold_deg: Real,
    /// Direction the repaired normal must agree with.
    pub expected_normal: Vec3,
}

impl Default for FrameOptions {
    fn default() -> Self {
        Self {
            stability_threshold_deg: 10.0,
            expected_normal: Vec3::new(0.0, 0.0, -1.0),
        }
    }
}

/// Which candidate supplied the in-plane axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BasisSource {
    Guess,
    TheoreticalX,
    TheoreticalY,
}

/// Orient a cloud-space plane normal into transform space.
///
/// Cloud points are y-up while transforms follow the image (y-down), so y is
/// mirrored first; the result is then flipped if it points away from
/// `expected`.
pub fn orient_normal(normal: &Vec3, expected: &Vec3) -> Vec3 {
    let mirrored = Vec3::new(normal.x, -normal.y, normal.z);
    if mirrored.dot(expected) < 0.0 {
        -mirrored
    } else {
        mirrored
    }
}

/// Angle between the lines spanned by `a` and `b`, in `[0, 90]` degrees.
fn line_angle_deg(a: &Vec3, b: &Vec3) -> Real {
    let angle = vector_angle_deg(a, b);
    angle.min(180.0 - angle)
}

/// Rigid transform whose z axis is the oriented plane normal, whose x axis
/// follows `x_guess` where stable, and whose origin is the plane centroid
/// with its y mirrored.
pub fn plane_to_transform(
    normal: &Vec3,
    x_guess: &Vec3,
    centroid: &Pt3,
    opts: &FrameOptions,
) -> (RigidTransform, BasisSource) {
    let z = orient_normal(normal, &opts.expected_normal).normalize();
    let guess = x_guess.normalize();
    let theoretical_x = Vec3::x();
    let theoretical_y = Vec3::y();

    let stable = |axis: &Vec3| line_angle_deg(axis, &z) > opts.stability_threshold_deg;

    let (x, y, source) = if guess.iter().all(|v| v.is_finite()) && stable(&guess) {
        let y = z.cross(&guess).normalize();
        (y.cross(&z).normalize(), y, BasisSource::Guess)
    } else if stable(&theoretical_x) {
        let y = z.cross(&theoretical_x).normalize();
        (y.cross(&z).normalize(), y, BasisSource::TheoreticalX)
    } else {
        let x = theoretical_y.cross(&z).normalize();
        (x, z.cross(&x).normalize(), BasisSource::TheoreticalY)
    };
    debug!("plane frame basis from {:?}", source);

    let rotation = Mat3::from_columns(&[x, y, z]);
    let translation = Vec3::new(centroid.x, -centroid.y, centroid.z);
    (RigidTransform::from_parts(&rotation, &translation), source)
}
