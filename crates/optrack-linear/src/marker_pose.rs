//! Optical pose of a single square marker.
//!
//! [`MarkerPoseEstimator`] is the seam between the tracker and whatever turns
//! four corner pixels into a pose. The bundled [`HomographyPoseTracker`]
//! solves a normalized DLT homography from the marker square to the
//! undistorted image corners and decomposes it into a rotation and a
//! translation in meters.

use log::debug;
use optrack_core::{
    rodrigues, CameraCalibration, Detection, Mat3, Pt2, Pt3, Real, RigidTransform, Vec3, MM_PER_M,
};
use serde::{Deserialize, Serialize};

use crate::homography::dlt_homography;

/// Marker pose in the camera frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MarkerPose {
    pub rotation: Mat3,
    /// Marker center, in meters.
    pub translation_m: Vec3,
    /// Mean corner reprojection error, in pixels.
    pub reprojection_error_px: Real,
}

impl MarkerPose {
    /// Pose from a Rodrigues rotation vector and a translation in meters.
    pub fn from_rvec_tvec(rvec: &Vec3, tvec: &Vec3) -> Self {
        Self {
            rotation: rodrigues(rvec),
            translation_m: *tvec,
            reprojection_error_px: 0.0,
        }
    }

    /// Rigid transform with the translation converted to millimeters.
    pub fn to_transform_mm(&self) -> RigidTransform {
        RigidTransform::from_parts(&self.rotation, &(self.translation_m * MM_PER_M))
    }
}

/// Turns one detection into a marker pose.
///
/// Implementations may keep per-marker state between frames; the tracker
/// owns one instance per tool.
pub trait MarkerPoseEstimator {
    fn estimate_pose(
        &mut self,
        detection: &Detection,
        calibration: &CameraCalibration,
        marker_size_m: Real,
    ) -> Option<MarkerPose>;
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoseOptions {
    /// Poses whose mean corner reprojection error exceeds this are rejected.
    pub max_reprojection_error_px: Real,
    /// While tracking, reject a pose whose marker center moved more than this
    /// (meters) since the last accepted pose. The rejection ends the track, so
    /// the next detection is accepted as a fresh start.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_jump_m: Option<Real>,
}

impl Default for PoseOptions {
    fn default() -> Self {
        Self {
            max_reprojection_error_px: 4.0,
            max_jump_m: None,
        }
    }
}

/// Marker corners in the marker frame, in detector order: top-left,
/// top-right, bottom-right, bottom-left with y up and z out of the face.
pub fn marker_object_corners(marker_size: Real) -> [Pt2; 4] {
    let h = marker_size / 2.0;
    [
        Pt2::new(-h, h),
        Pt2::new(h, h),
        Pt2::new(h, -h),
        Pt2::new(-h, -h),
    ]
}

/// Decompose a plane-to-normalized-image homography into `(R, t)`.
///
/// The sign of `H` is chosen so the plane origin lies in front of the camera.
pub fn pose_from_homography(h: &Mat3) -> Option<(Mat3, Vec3)> {
    let h1 = h.column(0).into_owned();
    let h2 = h.column(1).into_owned();
    let h3 = h.column(2).into_owned();

    let norm = 0.5 * (h1.norm() + h2.norm());
    if norm <= Real::EPSILON {
        return None;
    }
    let mut lambda = 1.0 / norm;
    if lambda * h3.z < 0.0 {
        lambda = -lambda;
    }

    let r1 = h1 * lambda;
    let r2 = h2 * lambda;
    let approx = Mat3::from_columns(&[r1, r2, r1.cross(&r2)]);

    // Nearest rotation in the Frobenius sense.
    let svd = approx.svd(true, true);
    let u = svd.u?;
    let v_t = svd.v_t?;
    let mut rotation = u * v_t;
    if rotation.determinant() < 0.0 {
        let mut u_flipped = u;
        u_flipped.column_mut(2).neg_mut();
        rotation = u_flipped * v_t;
    }

    Some((rotation, h3 * lambda))
}

/// Homography based single-marker pose estimator with frame-to-frame state.
///
/// The last accepted pose gates sudden jumps (see
/// [`PoseOptions::max_jump_m`]); any rejection clears it.
#[derive(Debug, Clone, Default)]
pub struct HomographyPoseTracker {
    options: PoseOptions,
    last_pose: Option<MarkerPose>,
    tracked_frames: u64,
}

impl HomographyPoseTracker {
    pub fn new(options: PoseOptions) -> Self {
        Self {
            options,
            last_pose: None,
            tracked_frames: 0,
        }
    }

    pub fn options(&self) -> &PoseOptions {
        &self.options
    }

    /// Last accepted pose, cleared on the first failure.
    pub fn last_pose(&self) -> Option<&MarkerPose> {
        self.last_pose.as_ref()
    }

    /// Consecutive frames with an accepted pose.
    pub fn tracked_frames(&self) -> u64 {
        self.tracked_frames
    }

    pub fn reset(&mut self) {
        self.last_pose = None;
        self.tracked_frames = 0;
    }

    fn solve(
        &self,
        detection: &Detection,
        calibration: &CameraCalibration,
        marker_size_m: Real,
    ) -> Option<MarkerPose> {
        if marker_size_m <= 0.0 {
            debug!("marker {}: non-positive marker size", detection.id);
            return None;
        }
        let object = marker_object_corners(marker_size_m);
        let image: Vec<Pt2> = detection
            .corners
            .iter()
            .map(|px| Pt2::from(calibration.pixel_to_normalized(px)))
            .collect();

        let h = match dlt_homography(&object, &image) {
            Ok(h) => h,
            Err(e) => {
                debug!("marker {}: {e}", detection.id);
                return None;
            }
        };
        let (rotation, translation) = pose_from_homography(&h)?;

        let mut err_sum = 0.0;
        for (obj, measured) in object.iter().zip(&detection.corners) {
            let p_c = rotation * Vec3::new(obj.x, obj.y, 0.0) + translation;
            let Some(projected) = calibration.project(&Pt3::from(p_c)) else {
                debug!("marker {}: corner behind the camera", detection.id);
                return None;
            };
            err_sum += (projected - *measured).norm();
        }
        let reprojection_error_px = err_sum / object.len() as Real;
        if reprojection_error_px > self.options.max_reprojection_error_px {
            debug!(
                "marker {}: reprojection error {:.2} px above {:.2} px",
                detection.id, reprojection_error_px, self.options.max_reprojection_error_px
            );
            return None;
        }
        if let (Some(max_jump), Some(last)) = (self.options.max_jump_m, &self.last_pose) {
            let jump = (translation - last.translation_m).norm();
            if jump > max_jump {
                debug!(
                    "marker {}: jumped {:.4} m since the last pose, limit {:.4} m",
                    detection.id, jump, max_jump
                );
                return None;
            }
        }

        Some(MarkerPose {
            rotation,
            translation_m: translation,
            reprojection_error_px,
        })
    }
}

impl MarkerPoseEstimator for HomographyPoseTracker {
    fn estimate_pose(
        &mut self,
        detection: &Detection,
        calibration: &CameraCalibration,
        marker_size_m: Real,
    ) -> Option<MarkerPose> {
        match self.solve(detection, calibration, marker_size_m) {
            Some(pose) => {
                self.last_pose = Some(pose);
                self.tracked_frames += 1;
                Some(pose)
            }
            None => {
                self.reset();
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use optrack_core::CameraIntrinsics;

    fn calibration() -> CameraCalibration {
        CameraCalibration::new(
            640,
            480,
            CameraIntrinsics {
                fx: 600.0,
                fy: 600.0,
                cx: 320.0,
                cy: 240.0,
                skew: 0.0,
            },
        )
    }

    fn project_marker(rotation: &Mat3, t: &Vec3, size: Real) -> Detection {
        let cal = calibration();
        let obj = marker_object_corners(size);
        let corners = std::array::from_fn(|i| {
            let p = rotation * Vec3::new(obj[i].x, obj[i].y, 0.0) + t;
            cal.project(&Pt3::from(p)).unwrap()
        });
        Detection::new(7, corners)
    }

    fn frontal() -> Mat3 {
        Mat3::from_diagonal(&Vec3::new(1.0, -1.0, -1.0))
    }

    #[test]
    fn frontal_marker_pose() {
        let t = Vec3::new(0.02, -0.01, 0.5);
        let det = project_marker(&frontal(), &t, 0.05);
        let mut tracker = HomographyPoseTracker::default();

        let pose = tracker.estimate_pose(&det, &calibration(), 0.05).unwrap();
        assert!((pose.rotation - frontal()).norm() < 1e-9);
        assert!((pose.translation_m - t).norm() < 1e-9);
        assert!(pose.reprojection_error_px < 1e-6);
        assert_eq!(tracker.tracked_frames(), 1);

        let mm = pose.to_transform_mm();
        assert!((mm.translation() - Vec3::new(20.0, -10.0, 500.0)).norm() < 1e-6);
    }

    #[test]
    fn tilted_marker_pose() {
        let rotation = rodrigues(&Vec3::new(0.3, -0.2, 0.1)) * frontal();
        let t = Vec3::new(-0.05, 0.03, 0.8);
        let det = project_marker(&rotation, &t, 0.08);
        let mut tracker = HomographyPoseTracker::default();
        let pose = tracker.estimate_pose(&det, &calibration(), 0.08).unwrap();
        assert!((pose.rotation - rotation).norm() < 1e-6);
        assert!((pose.translation_m - t).norm() < 1e-6);
    }

    #[test]
    fn inconsistent_quad_is_rejected_and_resets_state() {
        let cal = calibration();
        let mut tracker = HomographyPoseTracker::new(PoseOptions::default());
        let good = project_marker(&frontal(), &Vec3::new(0.0, 0.0, 0.5), 0.05);
        assert!(tracker.estimate_pose(&good, &cal, 0.05).is_some());
        assert!(tracker.last_pose().is_some());

        // Three times wider than tall: no rigid placement of a square fits it.
        let stretched = Detection::new(
            7,
            [
                Pt2::new(170.0, 190.0),
                Pt2::new(470.0, 190.0),
                Pt2::new(470.0, 290.0),
                Pt2::new(170.0, 290.0),
            ],
        );
        assert!(tracker.estimate_pose(&stretched, &cal, 0.05).is_none());
        assert_eq!(tracker.tracked_frames(), 0);
        assert!(tracker.last_pose().is_none());
    }

    #[test]
    fn jump_gate_drops_one_frame_then_reacquires() {
        let cal = calibration();
        let mut tracker = HomographyPoseTracker::new(PoseOptions {
            max_jump_m: Some(0.01),
            ..PoseOptions::default()
        });
        let near = project_marker(&frontal(), &Vec3::new(0.0, 0.0, 0.5), 0.05);
        let nudged = project_marker(&frontal(), &Vec3::new(0.005, 0.0, 0.5), 0.05);
        let far = project_marker(&frontal(), &Vec3::new(0.08, 0.0, 0.5), 0.05);

        assert!(tracker.estimate_pose(&near, &cal, 0.05).is_some());
        assert!(tracker.estimate_pose(&nudged, &cal, 0.05).is_some());
        assert_eq!(tracker.tracked_frames(), 2);

        assert!(tracker.estimate_pose(&far, &cal, 0.05).is_none());
        assert!(tracker.last_pose().is_none());

        let pose = tracker.estimate_pose(&far, &cal, 0.05).unwrap();
        assert!((pose.translation_m - Vec3::new(0.08, 0.0, 0.5)).norm() < 1e-9);
        assert_eq!(tracker.tracked_frames(), 1);
    }

    #[test]
    fn no_jump_gate_by_default() {
        let cal = calibration();
        let mut tracker = HomographyPoseTracker::default();
        let near = project_marker(&frontal(), &Vec3::new(0.0, 0.0, 0.5), 0.05);
        let far = project_marker(&frontal(), &Vec3::new(0.08, 0.0, 0.5), 0.05);
        assert!(tracker.estimate_pose(&near, &cal, 0.05).is_some());
        assert!(tracker.estimate_pose(&far, &cal, 0.05).is_some());
        assert_eq!(tracker.tracked_frames(), 2);
    }

    #[test]
    fn collapsed_corners_fail() {
        let det = Detection::new(1, [Pt2::new(100.0, 100.0); 4]);
        let mut tracker = HomographyPoseTracker::default();
        assert!(tracker.estimate_pose(&det, &calibration(), 0.05).is_none());
    }

    #[test]
    fn rvec_pose_conversion() {
        let pose = MarkerPose::from_rvec_tvec(
            &Vec3::new(std::f64::consts::PI, 0.0, 0.0),
            &Vec3::new(0.1, 0.2, 0.3),
        );
        assert!((pose.rotation - frontal()).norm() < 1e-12);
        let t = pose.to_transform_mm();
        assert!(t.is_rigid(1e-12));
        assert!((t.translation() - Vec3::new(100.0, 200.0, 300.0)).norm() < 1e-9);
    }
}
