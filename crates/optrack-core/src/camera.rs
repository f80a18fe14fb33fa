//! Pinhole camera calibration used by the optical pose estimator.
//!
//! The calibration is loaded once at connect time from a JSON resource:
//!
//! ```json
//! {
//!   "image_width": 640,
//!   "image_height": 480,
//!   "intrinsics": { "fx": 615.0, "fy": 615.0, "cx": 320.0, "cy": 240.0, "skew": 0.0 },
//!   "distortion": { "k1": 0.0, "k2": 0.0, "p1": 0.0, "p2": 0.0, "k3": 0.0 }
//! }
//! ```

use std::{fs, path::Path};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::{Mat3, Pt2, Pt3, Real, Vec2, Vec3};

/// Pinhole intrinsics with optional skew.
///
/// ```text
/// [ fx  skew  cx ]
/// [  0   fy   cy ]
/// [  0    0    1 ]
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraIntrinsics {
    pub fx: Real,
    pub fy: Real,
    pub cx: Real,
    pub cy: Real,
    #[serde(default)]
    pub skew: Real,
}

impl CameraIntrinsics {
    /// Build the 3×3 calibration matrix `K`.
    pub fn k_matrix(&self) -> Mat3 {
        Mat3::new(
            self.fx, self.skew, self.cx, 0.0, self.fy, self.cy, 0.0, 0.0, 1.0,
        )
    }

    fn sensor_to_pixel(&self, n: &Vec2) -> Pt2 {
        Pt2::new(
            self.fx * n.x + self.skew * n.y + self.cx,
            self.fy * n.y + self.cy,
        )
    }

    fn pixel_to_sensor(&self, px: &Pt2) -> Vec2 {
        let y = (px.y - self.cy) / self.fy;
        let x = (px.x - self.cx - self.skew * y) / self.fx;
        Vec2::new(x, y)
    }
}

/// Brown-Conrady radial/tangential distortion coefficients.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BrownConrady {
    pub k1: Real,
    pub k2: Real,
    pub p1: Real,
    pub p2: Real,
    #[serde(default)]
    pub k3: Real,
}

impl BrownConrady {
    fn distort(&self, n: &Vec2) -> Vec2 {
        let (x, y) = (n.x, n.y);
        let r2 = x * x + y * y;
        let radial = 1.0 + self.k1 * r2 + self.k2 * r2 * r2 + self.k3 * r2 * r2 * r2;
        let dx = 2.0 * self.p1 * x * y + self.p2 * (r2 + 2.0 * x * x);
        let dy = self.p1 * (r2 + 2.0 * y * y) + 2.0 * self.p2 * x * y;
        Vec2::new(x * radial + dx, y * radial + dy)
    }

    /// Fixed-point inversion of [`Self::distort`].
    fn undistort(&self, d: &Vec2) -> Vec2 {
        const MAX_ITERS: usize = 10;
        const TOL: Real = 1e-12;

        let mut u = *d;
        for _ in 0..MAX_ITERS {
            let r2 = u.norm_squared();
            let radial = 1.0 + self.k1 * r2 + self.k2 * r2 * r2 + self.k3 * r2 * r2 * r2;
            let dx = 2.0 * self.p1 * u.x * u.y + self.p2 * (r2 + 2.0 * u.x * u.x);
            let dy = self.p1 * (r2 + 2.0 * u.y * u.y) + 2.0 * self.p2 * u.x * u.y;
            let next = Vec2::new((d.x - dx) / radial, (d.y - dy) / radial);
            let step = (next - u).amax();
            u = next;
            if step < TOL {
                break;
            }
        }
        u
    }
}

/// Camera calibration resource: intrinsics, distortion and image size.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraCalibration {
    pub image_width: u32,
    pub image_height: u32,
    pub intrinsics: CameraIntrinsics,
    #[serde(default)]
    pub distortion: Option<BrownConrady>,
}

impl CameraCalibration {
    pub fn new(image_width: u32, image_height: u32, intrinsics: CameraIntrinsics) -> Self {
        Self {
            image_width,
            image_height,
            intrinsics,
            distortion: None,
        }
    }

    /// Load a calibration from a JSON file.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let data = fs::read_to_string(path)
            .with_context(|| format!("reading camera calibration {}", path.display()))?;
        let calib: Self = serde_json::from_str(&data)
            .with_context(|| format!("parsing camera calibration {}", path.display()))?;
        anyhow::ensure!(
            calib.intrinsics.fx > 0.0 && calib.intrinsics.fy > 0.0,
            "camera calibration {} has non-positive focal length",
            path.display()
        );
        Ok(calib)
    }

    /// Project a camera-frame point to distorted pixel coordinates.
    ///
    /// Returns `None` for points on or behind the image plane.
    pub fn project(&self, p_c: &Pt3) -> Option<Pt2> {
        if p_c.z <= 0.0 {
            return None;
        }
        let n = Vec2::new(p_c.x / p_c.z, p_c.y / p_c.z);
        let d = match &self.distortion {
            Some(dist) => dist.distort(&n),
            None => n,
        };
        Some(self.intrinsics.sensor_to_pixel(&d))
    }

    /// Map a measured (distorted) pixel to undistorted normalized coordinates
    /// on the `z = 1` plane.
    pub fn pixel_to_normalized(&self, px: &Pt2) -> Vec2 {
        let d = self.intrinsics.pixel_to_sensor(px);
        match &self.distortion {
            Some(dist) => dist.undistort(&d),
            None => d,
        }
    }

    /// Unit viewing ray through a pixel.
    pub fn pixel_ray(&self, px: &Pt2) -> Vec3 {
        let n = self.pixel_to_normalized(px);
        Vec3::new(n.x, n.y, 1.0).normalize()
    }
}
