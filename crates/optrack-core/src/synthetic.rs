//! Deterministic synthetic marker scenes for tests and demos.
//!
//! A [`MarkerScene`] places one square marker in front of a pinhole camera
//! and renders both sensor views of it: the detector corners and an
//! organized point cloud of the (infinite) marker plane.

use crate::{CameraCalibration, Detection, Mat3, PointCloud, Pt2, Pt3, Real, Vec3, MM_PER_M};

/// Rotation of a marker facing the camera squarely: marker y up on screen,
/// marker z pointing back at the camera.
pub fn frontal_rotation() -> Mat3 {
    Mat3::from_diagonal(&Vec3::new(1.0, -1.0, -1.0))
}

#[derive(Debug, Clone)]
pub struct MarkerScene {
    pub calibration: CameraCalibration,
    /// Marker-to-camera rotation.
    pub rotation: Mat3,
    /// Marker center in the camera frame, meters.
    pub translation_m: Vec3,
    pub marker_size_m: Real,
}

impl MarkerScene {
    pub fn new(
        calibration: CameraCalibration,
        rotation: Mat3,
        translation_m: Vec3,
        marker_size_m: Real,
    ) -> Self {
        Self {
            calibration,
            rotation,
            translation_m,
            marker_size_m,
        }
    }

    /// Marker facing the camera at `translation_m`.
    pub fn frontal(calibration: CameraCalibration, translation_m: Vec3, marker_size_m: Real) -> Self {
        Self::new(calibration, frontal_rotation(), translation_m, marker_size_m)
    }

    /// Marker corners in the camera frame (meters), in detector order.
    pub fn corners_camera(&self) -> [Pt3; 4] {
        let h = self.marker_size_m / 2.0;
        let local = [(-h, h), (h, h), (h, -h), (-h, -h)];
        local.map(|(x, y)| Pt3::from(self.rotation * Vec3::new(x, y, 0.0) + self.translation_m))
    }

    /// Projected detection, or `None` if a corner is behind the camera.
    pub fn detection(&self, id: i32) -> Option<Detection> {
        let mut corners = [Pt2::origin(); 4];
        for (px, p) in corners.iter_mut().zip(self.corners_camera()) {
            *px = self.calibration.project(&p)?;
        }
        Some(Detection::new(id, corners))
    }

    /// Marker-plane normal in the camera frame.
    pub fn normal(&self) -> Vec3 {
        self.rotation.column(2).into_owned()
    }

    /// Point cloud of the marker plane over the whole image, in millimeters
    /// with y mirrored. Pixels whose ray does not hit the plane in front of
    /// the camera are `None`.
    pub fn point_cloud(&self) -> PointCloud {
        let n = self.normal();
        let offset = n.dot(&(self.translation_m * MM_PER_M));
        let width = self.calibration.image_width as usize;
        let height = self.calibration.image_height as usize;
        PointCloud::from_fn(width, height, |row, col| {
            let ray = self
                .calibration
                .pixel_ray(&Pt2::new(col as Real, row as Real));
            let denom = n.dot(&ray);
            if denom.abs() <= Real::EPSILON {
                return None;
            }
            let s = offset / denom;
            if s <= 0.0 {
                return None;
            }
            let p = ray * s;
            Some(Pt3::new(p.x, -p.y, p.z))
        })
    }
}
