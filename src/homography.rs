//! 3x3 projective transforms between image planes.

use nalgebra::{Matrix3, Vector3};

use crate::util::{MoonRegError, MoonRegResult};

/// Determinants below this magnitude are treated as singular.
pub const DEGENERATE_DET: f64 = 1e-12;

/// Projective transform; registration results map model space to user space.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Homography(Matrix3<f64>);

impl Homography {
    pub fn identity() -> Self {
        Self(Matrix3::identity())
    }

    pub fn from_matrix(matrix: Matrix3<f64>) -> Self {
        Self(matrix)
    }

    /// Pure translation by `(tx, ty)`.
    pub fn translation(tx: f64, ty: f64) -> Self {
        Self(Matrix3::new(1.0, 0.0, tx, 0.0, 1.0, ty, 0.0, 0.0, 1.0))
    }

    /// Builds from 9 row-major values.
    pub fn from_row_slice(values: &[f64]) -> MoonRegResult<Self> {
        if values.len() != 9 {
            return Err(MoonRegError::InvalidInput("homography needs exactly 9 values"));
        }
        if values.iter().any(|v| !v.is_finite()) {
            return Err(MoonRegError::InvalidInput("homography values must be finite"));
        }
        Ok(Self(Matrix3::from_row_slice(values)))
    }

    pub fn matrix(&self) -> &Matrix3<f64> {
        &self.0
    }

    /// Row-major copy of the 9 coefficients.
    pub fn to_row_major(&self) -> [f64; 9] {
        let m = &self.0;
        [
            m[(0, 0)],
            m[(0, 1)],
            m[(0, 2)],
            m[(1, 0)],
            m[(1, 1)],
            m[(1, 2)],
            m[(2, 0)],
            m[(2, 1)],
            m[(2, 2)],
        ]
    }

    pub fn determinant(&self) -> f64 {
        self.0.determinant()
    }

    /// True when the matrix is singular or holds non-finite values.
    pub fn is_degenerate(&self) -> bool {
        let det = self.determinant();
        !det.is_finite() || det.abs() < DEGENERATE_DET
    }

    /// Scales so that `h33 == 1` when possible.
    pub fn normalized(&self) -> Self {
        let h33 = self.0[(2, 2)];
        if h33.abs() > f64::EPSILON {
            Self(self.0 / h33)
        } else {
            *self
        }
    }

    /// Inverse transform; fails with `TransformError` when singular.
    pub fn inverse(&self) -> MoonRegResult<Self> {
        if self.is_degenerate() {
            return Err(MoonRegError::transform("homography is singular"));
        }
        self.0
            .try_inverse()
            .map(|m| Self(m).normalized())
            .ok_or_else(|| MoonRegError::transform("homography is not invertible"))
    }

    /// Maps a point; `None` when it lands on the line at infinity.
    pub fn project(&self, x: f64, y: f64) -> Option<(f64, f64)> {
        let p = self.0 * Vector3::new(x, y, 1.0);
        if p.z.abs() < 1e-12 {
            return None;
        }
        Some((p.x / p.z, p.y / p.z))
    }

    /// Element-wise comparison after normalisation.
    pub fn approx_eq(&self, other: &Homography, eps: f64) -> bool {
        let a = self.normalized().to_row_major();
        let b = other.normalized().to_row_major();
        a.iter().zip(b.iter()).all(|(x, y)| (x - y).abs() <= eps)
    }

    /// Composition `self * other` (apply `other` first).
    pub fn compose(&self, other: &Homography) -> Self {
        Self(self.0 * other.0).normalized()
    }
}

impl Default for Homography {
    fn default() -> Self {
        Self::identity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn translation_projects_and_inverts() {
        let h = Homography::translation(3.0, -2.0);
        assert_eq!(h.project(1.0, 1.0), Some((4.0, -1.0)));
        let inv = h.inverse().unwrap();
        assert!(inv.approx_eq(&Homography::translation(-3.0, 2.0), 1e-12));
        assert!(h.compose(&inv).approx_eq(&Homography::identity(), 1e-12));
    }

    #[test]
    fn singular_matrix_is_rejected() {
        let h = Homography::from_row_slice(&[1.0, 2.0, 3.0, 2.0, 4.0, 6.0, 0.0, 0.0, 1.0]).unwrap();
        assert!(h.is_degenerate());
        assert!(matches!(h.inverse(), Err(MoonRegError::TransformError { .. })));
    }

    #[test]
    fn row_major_order_is_preserved() {
        let values = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 10.0];
        let h = Homography::from_row_slice(&values).unwrap();
        assert_eq!(h.to_row_major(), values);
        assert!(Homography::from_row_slice(&values[..8]).is_err());
    }
}
