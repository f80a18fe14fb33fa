//! Per-frame inputs: marker detections and an aligned point cloud.

use serde::{Deserialize, Serialize};

use crate::{Pt2, Pt3};

/// One detected marker: id and its four corner pixels, in detector order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub id: i32,
    pub corners: [Pt2; 4],
}

impl Detection {
    pub fn new(id: i32, corners: [Pt2; 4]) -> Self {
        Self { id, corners }
    }
}

/// Organized point cloud aligned to the color image.
///
/// Points are stored row-major with a fixed `width`; `None` marks pixels with
/// no valid depth return. Coordinates are millimeters in a y-up camera frame,
/// so `y` is mirrored relative to image rows and `z` is the depth.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointCloud {
    pub width: usize,
    pub points: Vec<Option<Pt3>>,
}

impl PointCloud {
    pub fn new(width: usize, points: Vec<Option<Pt3>>) -> Self {
        Self { width, points }
    }

    /// Build a cloud by evaluating `f(row, col)` for every pixel.
    pub fn from_fn(
        width: usize,
        height: usize,
        mut f: impl FnMut(usize, usize) -> Option<Pt3>,
    ) -> Self {
        let mut points = Vec::with_capacity(width * height);
        for row in 0..height {
            for col in 0..width {
                points.push(f(row, col));
            }
        }
        Self { width, points }
    }

    /// Number of complete rows.
    pub fn height(&self) -> usize {
        if self.width == 0 {
            0
        } else {
            self.points.len() / self.width
        }
    }

    /// Sample at pixel `(row, col)`; `None` out of bounds or invalid.
    pub fn point_at(&self, row: i64, col: i64) -> Option<Pt3> {
        if row < 0 || col < 0 {
            return None;
        }
        let (row, col) = (row as usize, col as usize);
        if col >= self.width || row >= self.height() {
            return None;
        }
        self.points[row * self.width + col]
    }
}
