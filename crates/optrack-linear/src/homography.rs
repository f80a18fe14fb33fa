//! Normalized DLT homography between two planes.
//!
//! Maps marker-plane coordinates to (normalized) image coordinates,
//! `x' ~ H x`. Both point sets are Hartley-normalized before the linear
//! solve and the result is de-normalized with `H[2,2] == 1` when possible.

use nalgebra::DMatrix;
use optrack_core::{from_homogeneous, to_homogeneous, Mat3, Pt2, Real};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum HomographyError {
    #[error("need at least 4 point correspondences, got {0}")]
    NotEnoughPoints(usize),
    #[error("point correspondences are degenerate")]
    Degenerate,
    #[error("svd failed")]
    SvdFailed,
}

/// Translate to the centroid and scale to mean distance `sqrt(2)`.
fn normalize_points(points: &[Pt2]) -> Option<(Vec<Pt2>, Mat3)> {
    if points.is_empty() {
        return None;
    }
    let n = points.len() as Real;
    let c = points.iter().fold(Pt2::origin().coords, |acc, p| acc + p.coords) / n;
    let mean_dist = points.iter().map(|p| (p.coords - c).norm()).sum::<Real>() / n;
    if mean_dist <= Real::EPSILON {
        return None;
    }

    let s = std::f64::consts::SQRT_2 / mean_dist;
    let t = Mat3::new(s, 0.0, -s * c.x, 0.0, s, -s * c.y, 0.0, 0.0, 1.0);
    let normalized = points
        .iter()
        .map(|p| Pt2::from((p.coords - c) * s))
        .collect();
    Some((normalized, t))
}

/// Estimate `H` such that `image ~ H * world`.
pub fn dlt_homography(world: &[Pt2], image: &[Pt2]) -> Result<Mat3, HomographyError> {
    let n = world.len();
    if n < 4 || image.len() != n {
        return Err(HomographyError::NotEnoughPoints(n.min(image.len())));
    }

    let (world_n, t_w) = normalize_points(world).ok_or(HomographyError::Degenerate)?;
    let (image_n, t_i) = normalize_points(image).ok_or(HomographyError::Degenerate)?;

    // Zero rows pad the minimal case to a square system so the full V is available.
    let rows = (2 * n).max(9);
    let mut a = DMatrix::<Real>::zeros(rows, 9);
    for (i, (pw, pi)) in world_n.iter().zip(&image_n).enumerate() {
        let (x, y, u, v) = (pw.x, pw.y, pi.x, pi.y);
        let r0 = 2 * i;
        let r1 = r0 + 1;

        a[(r0, 0)] = -x;
        a[(r0, 1)] = -y;
        a[(r0, 2)] = -1.0;
        a[(r0, 6)] = u * x;
        a[(r0, 7)] = u * y;
        a[(r0, 8)] = u;

        a[(r1, 3)] = -x;
        a[(r1, 4)] = -y;
        a[(r1, 5)] = -1.0;
        a[(r1, 6)] = v * x;
        a[(r1, 7)] = v * y;
        a[(r1, 8)] = v;
    }

    let svd = a.svd(false, true);
    let v_t = svd.v_t.ok_or(HomographyError::SvdFailed)?;
    let h = v_t.row(svd.singular_values.imin());

    let mut h_mat = Mat3::from_fn(|r, c| h[3 * r + c]);
    let t_i_inv = t_i.try_inverse().ok_or(HomographyError::Degenerate)?;
    h_mat = t_i_inv * h_mat * t_w;

    let scale = h_mat[(2, 2)];
    if scale.abs() > Real::EPSILON {
        h_mat /= scale;
    }
    if !h_mat.iter().all(|v| v.is_finite()) || h_mat.determinant().abs() <= Real::EPSILON {
        return Err(HomographyError::Degenerate);
    }
    Ok(h_mat)
}

/// Map a point through `h`; `None` when it lands at infinity.
pub fn apply_homography(h: &Mat3, p: &Pt2) -> Option<Pt2> {
    let q = h * to_homogeneous(p);
    if q.z.abs() <= Real::EPSILON {
        return None;
    }
    Some(from_homogeneous(&q))
}
