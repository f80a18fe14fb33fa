//! Scalar and linear algebra aliases plus small geometry primitives.

use nalgebra::{Matrix3, Matrix4, Point2, Point3, Rotation3, Vector2, Vector3};

/// Scalar type used throughout the workspace (currently `f64`).
pub type Real = f64;

/// 2D vector with [`Real`] components.
pub type Vec2 = Vector2<Real>;
/// 3D vector with [`Real`] components.
pub type Vec3 = Vector3<Real>;
/// 2D point with [`Real`] coordinates (image pixels).
pub type Pt2 = Point2<Real>;
/// 3D point with [`Real`] coordinates.
pub type Pt3 = Point3<Real>;
/// 3×3 matrix with [`Real`] entries.
pub type Mat3 = Matrix3<Real>;
/// 4×4 matrix with [`Real`] entries.
pub type Mat4 = Matrix4<Real>;

/// Millimeters per meter; optical pose estimators report meters.
pub const MM_PER_M: Real = 1000.0;

/// Unsigned angle between two vectors, in degrees.
///
/// Both inputs are normalized first. Returns `NaN` if either vector has zero
/// length.
pub fn vector_angle_deg(a: &Vec3, b: &Vec3) -> Real {
    let cos = a.normalize().dot(&b.normalize()).clamp(-1.0, 1.0);
    cos.acos().to_degrees().abs()
}

/// Inverse slope `dx / dy` of the segment `p1 -> p2`.
///
/// Returns `0.0` when both endpoints lie on the same row, which turns a
/// horizontal segment into a constant column bound instead of a division by
/// zero.
pub fn inverse_slope(p1: &Pt2, p2: &Pt2) -> Real {
    if p1.y == p2.y {
        0.0
    } else {
        (p1.x - p2.x) / (p1.y - p2.y)
    }
}

/// Rotation matrix from a Rodrigues (axis * angle) vector.
pub fn rodrigues(rvec: &Vec3) -> Mat3 {
    Rotation3::new(*rvec).into_inner()
}

/// Convert a 2D point into homogeneous coordinates `(x, y, 1)`.
pub fn to_homogeneous(p: &Pt2) -> Vec3 {
    Vec3::new(p.x, p.y, 1.0)
}

/// Convert a homogeneous 3-vector back into a 2D point.
///
/// The caller must ensure `w != 0`.
pub fn from_homogeneous(v: &Vec3) -> Pt2 {
    Pt2::new(v.x / v.z, v.y / v.z)
}
