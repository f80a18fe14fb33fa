//! Plane fitting for marker region samples.
//!
//! The least-squares fit takes the centroid of the samples and the
//! eigenvector of the smallest eigenvalue of their scatter matrix as normal.
//! The normal has no inherent sign; callers orient it (see
//! [`crate::frame::plane_to_transform`]).
//!
//! A RANSAC pass ([`PlaneFitMethod::Ransac`]) rejects edge and background
//! bleed-through before the final least-squares refit, at the cost of extra
//! latency; it is bounded by [`RansacOptions::max_iters`].

use log::debug;
use nalgebra::Matrix3;
use optrack_core::{ransac, Estimator, Pt3, RansacOptions, Real, Vec3};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors returned by the plane estimators.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum PlaneFitError {
    #[error("need at least 3 region samples, got {0}")]
    NotEnoughPoints(usize),
    #[error("region samples are collinear or coincident")]
    Degenerate,
    #[error("ransac found no plane with at least {min_inliers} inliers among {points} samples")]
    NoConsensus { points: usize, min_inliers: usize },
}

/// Fitted plane: unit normal through a centroid.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlaneEstimate {
    pub normal: Vec3,
    pub centroid: Pt3,
    /// RMS point-to-plane distance over the samples used.
    pub rms: Real,
    /// Number of samples the final fit used.
    pub inliers: usize,
}

impl PlaneEstimate {
    /// Unsigned distance from `p` to the plane.
    pub fn distance(&self, p: &Pt3) -> Real {
        self.normal.dot(&(p - self.centroid)).abs()
    }
}

/// Relative eigenvalue ratio under which the samples are treated as a line.
const RANK_THRESHOLD: Real = 1e-8;

fn least_squares_indexed(points: &[Pt3], indices: &[usize]) -> Result<PlaneEstimate, PlaneFitError> {
    let n = indices.len();
    if n < 3 {
        return Err(PlaneFitError::NotEnoughPoints(n));
    }

    let centroid = indices
        .iter()
        .fold(Vec3::zeros(), |acc, &i| acc + points[i].coords)
        / n as Real;

    let scatter = indices.iter().fold(Matrix3::<Real>::zeros(), |acc, &i| {
        let d = points[i].coords - centroid;
        acc + d * d.transpose()
    });

    let eigen = scatter.symmetric_eigen();
    let mut order = [0usize, 1, 2];
    order.sort_by(|&a, &b| eigen.eigenvalues[a].total_cmp(&eigen.eigenvalues[b]));
    let (smallest, middle, largest) = (
        eigen.eigenvalues[order[0]],
        eigen.eigenvalues[order[1]],
        eigen.eigenvalues[order[2]],
    );
    if largest <= RANK_THRESHOLD || middle / largest < RANK_THRESHOLD {
        return Err(PlaneFitError::Degenerate);
    }

    let normal: Vec3 = eigen.eigenvectors.column(order[0]).into_owned().normalize();
    let rms = (smallest.max(0.0) / n as Real).sqrt();

    Ok(PlaneEstimate {
        normal,
        centroid: Pt3::from(centroid),
        rms,
        inliers: n,
    })
}

/// Least-squares plane through all `points`.
pub fn fit_plane_least_squares(points: &[Pt3]) -> Result<PlaneEstimate, PlaneFitError> {
    let all: Vec<usize> = (0..points.len()).collect();
    least_squares_indexed(points, &all)
}

/// RANSAC model for planes through 3-D samples.
pub struct PlaneEstimator;

impl Estimator for PlaneEstimator {
    type Datum = Pt3;
    type Model = PlaneEstimate;

    const MIN_SAMPLES: usize = 3;

    fn fit(data: &[Pt3], sample: &[usize]) -> Option<PlaneEstimate> {
        let (a, b, c) = (data[sample[0]], data[sample[1]], data[sample[2]]);
        let normal = (b - a).cross(&(c - a));
        let len = normal.norm();
        if len <= Real::EPSILON * (b - a).norm() * (c - a).norm() {
            return None;
        }
        Some(PlaneEstimate {
            normal: normal / len,
            centroid: Pt3::from((a.coords + b.coords + c.coords) / 3.0),
            rms: 0.0,
            inliers: 3,
        })
    }

    fn residual(model: &PlaneEstimate, datum: &Pt3) -> f64 {
        model.distance(datum)
    }

    fn refit(data: &[Pt3], inliers: &[usize]) -> Option<PlaneEstimate> {
        least_squares_indexed(data, inliers).ok()
    }
}

/// Which estimator [`fit_plane`] runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PlaneFitMethod {
    /// Single least-squares pass over every sample.
    LeastSquares,
    /// RANSAC consensus followed by a least-squares refit on the inliers.
    Ransac(RansacOptions),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaneFitOptions {
    pub method: PlaneFitMethod,
}

impl Default for PlaneFitOptions {
    fn default() -> Self {
        Self {
            method: PlaneFitMethod::LeastSquares,
        }
    }
}

/// Fit a plane to region samples with the configured method.
pub fn fit_plane(points: &[Pt3], opts: &PlaneFitOptions) -> Result<PlaneEstimate, PlaneFitError> {
    match &opts.method {
        PlaneFitMethod::LeastSquares => fit_plane_least_squares(points),
        PlaneFitMethod::Ransac(ransac_opts) => {
            if points.len() < PlaneEstimator::MIN_SAMPLES {
                return Err(PlaneFitError::NotEnoughPoints(points.len()));
            }
            let res = ransac::<PlaneEstimator>(points, ransac_opts);
            debug!(
                "plane ransac: {} of {} inliers after {} iterations",
                res.inliers.len(),
                points.len(),
                res.iters
            );
            if !res.success() {
                return Err(PlaneFitError::NoConsensus {
                    points: points.len(),
                    min_inliers: ransac_opts.min_inliers,
                });
            }
            least_squares_indexed(points, &res.inliers)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Samples on the plane `z = 600 + 0.1 x` over a small grid.
    fn tilted_patch() -> Vec<Pt3> {
        let mut pts = Vec::new();
        for i in 0..10 {
            for j in 0..10 {
                let x = i as Real * 2.0;
                let y = j as Real * 2.0;
                pts.push(Pt3::new(x, y, 600.0 + 0.1 * x));
            }
        }
        pts
    }

    fn expected_normal() -> Vec3 {
        Vec3::new(-0.1, 0.0, 1.0).normalize()
    }

    #[test]
    fn least_squares_recovers_tilted_plane() {
        let pts = tilted_patch();
        let est = fit_plane_least_squares(&pts).unwrap();
        assert!(est.normal.dot(&expected_normal()).abs() > 1.0 - 1e-9);
        assert!((est.centroid.x - 9.0).abs() < 1e-9);
        assert!(est.rms < 1e-6);
        assert_eq!(est.inliers, 100);
    }

    #[test]
    fn too_few_or_collinear_samples_fail() {
        assert_eq!(
            fit_plane_least_squares(&[]),
            Err(PlaneFitError::NotEnoughPoints(0))
        );
        let line: Vec<Pt3> = (0..10).map(|i| Pt3::new(i as Real, 2.0 * i as Real, 500.0)).collect();
        assert_eq!(fit_plane_least_squares(&line), Err(PlaneFitError::Degenerate));
        let same = vec![Pt3::new(1.0, 1.0, 1.0); 5];
        assert_eq!(fit_plane_least_squares(&same), Err(PlaneFitError::Degenerate));
    }

    #[test]
    fn ransac_ignores_background_bleed() {
        let mut pts = tilted_patch();
        for k in 0..12 {
            pts.push(Pt3::new(k as Real * 1.5, 3.0, 1500.0 + k as Real));
        }

        let ls = fit_plane_least_squares(&pts).unwrap();
        assert!(ls.normal.dot(&expected_normal()).abs() < 0.999);

        let opts = PlaneFitOptions {
            method: PlaneFitMethod::Ransac(RansacOptions {
                min_inliers: 20,
                ..RansacOptions::default()
            }),
        };
        let robust = fit_plane(&pts, &opts).unwrap();
        assert!(robust.normal.dot(&expected_normal()).abs() > 1.0 - 1e-9);
        assert_eq!(robust.inliers, 100);
    }

    #[test]
    fn ransac_without_consensus_fails() {
        let pts = tilted_patch();
        let opts = PlaneFitOptions {
            method: PlaneFitMethod::Ransac(RansacOptions {
                min_inliers: 1000,
                ..RansacOptions::default()
            }),
        };
        assert!(matches!(
            fit_plane(&pts, &opts),
            Err(PlaneFitError::NoConsensus { points: 100, .. })
        ));
    }

    #[test]
    fn options_json_roundtrip() {
        let opts = PlaneFitOptions {
            method: PlaneFitMethod::Ransac(RansacOptions::default()),
        };
        let json = serde_json::to_string(&opts).unwrap();
        assert!(json.contains("\"ransac\""), "{json}");
        let back: PlaneFitOptions = serde_json::from_str(&json).unwrap();
        assert_eq!(back, opts);
    }
}
