use nalgebra::{Isometry3, Matrix3, Rotation3, Translation3, UnitQuaternion, Vector3, Vector6};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use std::ops::Mul;

/// A rigid body transformation.
///
/// When used as a board pose, a `Transform` maps points expressed in the board
/// frame into the camera frame: `p_cam = R * p_board + t`.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Transform {
    inner: Isometry3<f64>,
}

impl Transform {
    /// Creates a `Transform` from a translation and a rotation vector.
    ///
    /// The rotation vector is the rotation axis scaled by the rotation angle in
    /// radians.
    pub fn new(tx: f64, ty: f64, tz: f64, rx: f64, ry: f64, rz: f64) -> Self {
        Self::from_parts(
            Rotation3::new(Vector3::new(rx, ry, rz)),
            Vector3::new(tx, ty, tz),
        )
    }

    pub fn identity() -> Self {
        Self {
            inner: Isometry3::identity(),
        }
    }

    pub fn from_parts(rotation: Rotation3<f64>, translation: Vector3<f64>) -> Self {
        Self {
            inner: Isometry3::from_parts(
                Translation3::from(translation),
                UnitQuaternion::from_rotation_matrix(&rotation),
            ),
        }
    }

    pub fn rot_mat(&self) -> Matrix3<f64> {
        self.inner.rotation.to_rotation_matrix().into_inner()
    }

    pub fn trans(&self) -> Vector3<f64> {
        self.inner.translation.vector
    }

    /// Returns the rotation as axis times angle.
    pub fn rot_vec(&self) -> Vector3<f64> {
        self.inner.rotation.scaled_axis()
    }

    /// Returns `self * other`, the transform that applies `other` first.
    pub fn compose(&self, other: &Transform) -> Transform {
        Transform {
            inner: self.inner * other.inner,
        }
    }

    pub fn inverse(&self) -> Transform {
        Transform {
            inner: self.inner.inverse(),
        }
    }

    pub fn transform_point(&self, point: &Vector3<f64>) -> Vector3<f64> {
        self.inner.rotation * point + self.inner.translation.vector
    }

    pub fn rotate(&self, vector: &Vector3<f64>) -> Vector3<f64> {
        self.inner.rotation * vector
    }

    pub fn inverse_transform_point(&self, point: &Vector3<f64>) -> Vector3<f64> {
        self.inner
            .rotation
            .inverse_transform_vector(&(point - self.inner.translation.vector))
    }

    /// Applies a left increment `[dt, dr]` to the transform.
    ///
    /// The result is `exp(dr) * self` followed by a translation of `dt`, so that
    /// the derivative of `retract(delta).transform_point(p)` at `delta = 0` is
    /// `[I, -skew(R p + t)]`.
    pub fn retract(&self, delta: &Vector6<f64>) -> Transform {
        let dt = Vector3::new(delta[0], delta[1], delta[2]);
        let dr = UnitQuaternion::from_scaled_axis(Vector3::new(delta[3], delta[4], delta[5]));
        Transform {
            inner: Isometry3::from_parts(
                Translation3::from(dr * self.inner.translation.vector + dt),
                UnitQuaternion::new_normalize((dr * self.inner.rotation).into_inner()),
            ),
        }
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::identity()
    }
}

impl Mul for Transform {
    type Output = Transform;

    fn mul(self, rhs: Transform) -> Transform {
        self.compose(&rhs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::FRAC_PI_2;

    #[test]
    fn rotation_vector_roundtrip() {
        let xi = Transform::new(0.1, -0.2, 0.3, 0.2, -0.1, 0.4);
        assert_relative_eq!(xi.rot_vec(), Vector3::new(0.2, -0.1, 0.4), epsilon = 1e-12);
        assert_relative_eq!(xi.trans(), Vector3::new(0.1, -0.2, 0.3));
    }

    #[test]
    fn rotation_stays_orthonormal() {
        let xi = Transform::new(1.0, 2.0, 3.0, 0.5, 0.7, -1.1)
            .retract(&Vector6::new(0.01, 0.02, 0.03, 0.1, -0.2, 0.3));
        let r = xi.rot_mat();
        assert_relative_eq!(r.transpose() * r, Matrix3::identity(), epsilon = 1e-12);
        assert_relative_eq!(r.determinant(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn compose_applies_right_operand_first() {
        let a = Transform::new(1.0, 0.0, 0.0, 0.0, 0.0, FRAC_PI_2);
        let b = Transform::new(0.0, 2.0, 0.0, 0.0, 0.0, 0.0);
        let p = Vector3::new(1.0, 0.0, 0.0);

        let ab = a * b;
        assert_relative_eq!(
            ab.transform_point(&p),
            a.transform_point(&b.transform_point(&p)),
            epsilon = 1e-12
        );

        // Not commutative.
        let ba = b * a;
        assert!((ab.transform_point(&p) - ba.transform_point(&p)).norm() > 1.0);
    }

    #[test]
    fn inverse_undoes_transform() {
        let xi = Transform::new(0.3, -0.4, 2.0, 0.1, 0.2, 0.3);
        let p = Vector3::new(0.5, 0.25, -1.0);
        assert_relative_eq!(
            xi.inverse().transform_point(&xi.transform_point(&p)),
            p,
            epsilon = 1e-12
        );
        assert_relative_eq!(
            xi.inverse_transform_point(&xi.transform_point(&p)),
            p,
            epsilon = 1e-12
        );
    }

    #[test]
    fn retract_matches_derivative() {
        let xi = Transform::new(0.3, -0.4, 2.0, 0.1, 0.2, 0.3);
        let p = Vector3::new(0.5, 0.25, 0.0);
        let eps = 1e-7;
        let q = xi.transform_point(&p);

        // Rotation about z moves q by (-q.y, q.x, 0) to first order.
        let moved = xi
            .retract(&Vector6::new(0.0, 0.0, 0.0, 0.0, 0.0, eps))
            .transform_point(&p);
        assert_relative_eq!(
            (moved - q) / eps,
            Vector3::new(-q.y, q.x, 0.0),
            epsilon = 1e-5
        );
    }
}
