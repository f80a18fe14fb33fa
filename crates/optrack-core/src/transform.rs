use serde::{Deserialize, Serialize};

use crate::{Mat3, Mat4, Real, Vec3};

/// Homogeneous 4×4 rigid transform (rotation block + translation column).
///
/// Values are only ever built whole: [`RigidTransform::identity`] or
/// [`RigidTransform::from_parts`]. The last row is always `[0, 0, 0, 1]`.
///
/// Serialized as four row arrays so recorded output reads like the matrix it
/// represents.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[[Real; 4]; 4]", into = "[[Real; 4]; 4]")]
pub struct RigidTransform {
    matrix: Mat4,
}

impl RigidTransform {
    pub fn identity() -> Self {
        Self {
            matrix: Mat4::identity(),
        }
    }

    /// Assemble a transform from a 3×3 rotation and a translation vector.
    pub fn from_parts(rotation: &Mat3, translation: &Vec3) -> Self {
        let mut matrix = Mat4::identity();
        matrix.fixed_view_mut::<3, 3>(0, 0).copy_from(rotation);
        matrix.fixed_view_mut::<3, 1>(0, 3).copy_from(translation);
        Self { matrix }
    }

    pub fn matrix(&self) -> &Mat4 {
        &self.matrix
    }

    pub fn rotation(&self) -> Mat3 {
        self.matrix.fixed_view::<3, 3>(0, 0).into_owned()
    }

    pub fn translation(&self) -> Vec3 {
        self.matrix.fixed_view::<3, 1>(0, 3).into_owned()
    }

    /// Column `i` (0 = x, 1 = y, 2 = z) of the rotation block.
    pub fn axis(&self, i: usize) -> Vec3 {
        self.matrix.fixed_view::<3, 1>(0, i).into_owned()
    }

    /// Whether the rotation block is orthonormal with determinant +1 within `tol`.
    pub fn is_rigid(&self, tol: Real) -> bool {
        let r = self.rotation();
        let gram_err = (r.transpose() * r - Mat3::identity()).abs().max();
        gram_err <= tol && (r.determinant() - 1.0).abs() <= tol
    }

    pub fn is_identity(&self) -> bool {
        self.matrix == Mat4::identity()
    }

    /// Element at `(row, col)`.
    pub fn get(&self, row: usize, col: usize) -> Real {
        self.matrix[(row, col)]
    }
}

impl Default for RigidTransform {
    fn default() -> Self {
        Self::identity()
    }
}

impl From<[[Real; 4]; 4]> for RigidTransform {
    fn from(rows: [[Real; 4]; 4]) -> Self {
        let mut matrix = Mat4::zeros();
        for (r, row) in rows.iter().enumerate() {
            for (c, v) in row.iter().enumerate() {
                matrix[(r, c)] = *v;
            }
        }
        Self { matrix }
    }
}

impl From<RigidTransform> for [[Real; 4]; 4] {
    fn from(t: RigidTransform) -> Self {
        let mut rows = [[0.0; 4]; 4];
        for (r, row) in rows.iter_mut().enumerate() {
            for (c, v) in row.iter_mut().enumerate() {
                *v = t.matrix[(r, c)];
            }
        }
        rows
    }
}
