//! Enhanced unified camera model.
//!
//! A point is first projected onto a quadric defined by `beta` and then onto
//! the normalized image plane from a center shifted by `alpha`:
//!
//! ```text
//! rho   = sqrt(z^2 + beta (x^2 + y^2))
//! denom = alpha rho + (1 - alpha) z
//! u     = fu x / denom + u0
//! v     = fv y / denom + v0
//! ```
//!
//! The parameter vector is ordered `[alpha, beta, fu, fv, u0, v0]`.

use super::{CameraError, CameraModel, check_count, check_dimensions, check_finite, check_positive};
use nalgebra::{DMatrix, Matrix2x3, Vector2, Vector3};

/// Smallest admissible projection denominator.
const MIN_DENOM: f64 = 1e-3;

const PARAM_COUNT: usize = 6;

#[derive(Clone, Debug, PartialEq)]
pub struct EnhancedUnified {
    width: usize,
    height: usize,
    params: [f64; PARAM_COUNT],
}

impl EnhancedUnified {
    pub fn new(
        width: usize,
        height: usize,
        params: [f64; PARAM_COUNT],
    ) -> Result<Self, CameraError> {
        check_dimensions(width, height)?;
        Self::validate(&params)?;
        Ok(Self {
            width,
            height,
            params,
        })
    }

    pub fn alpha(&self) -> f64 {
        self.params[0]
    }

    pub fn beta(&self) -> f64 {
        self.params[1]
    }

    fn validate(params: &[f64]) -> Result<(), CameraError> {
        check_count(params, PARAM_COUNT)?;
        let alpha = params[0];
        if !(0.0..=1.0).contains(&alpha) {
            return Err(CameraError::InvalidParameter {
                name: "alpha",
                value: alpha,
            });
        }
        check_positive("beta", params[1])?;
        check_positive("fu", params[2])?;
        check_positive("fv", params[3])?;
        check_finite("u0", params[4])?;
        check_finite("v0", params[5])
    }

    /// Returns `(rho, denom)` if `point` lies inside the projection domain.
    fn denominator(&self, point: &Vector3<f64>) -> Option<(f64, f64)> {
        let [alpha, beta, ..] = self.params;
        let rho = (point.z * point.z + beta * (point.x * point.x + point.y * point.y)).sqrt();
        let denom = alpha * rho + (1.0 - alpha) * point.z;
        if denom < MIN_DENOM {
            return None;
        }

        // Beyond this bound the quadric is crossed a second time.
        if alpha > 0.5 && point.z < denom * (alpha - 1.0) / (2.0 * alpha - 1.0) {
            return None;
        }

        Some((rho, denom))
    }
}

impl CameraModel for EnhancedUnified {
    fn name(&self) -> &'static str {
        "eucm"
    }

    fn width(&self) -> usize {
        self.width
    }

    fn height(&self) -> usize {
        self.height
    }

    fn params(&self) -> &[f64] {
        &self.params
    }

    fn set_params(&mut self, params: &[f64]) -> Result<(), CameraError> {
        Self::validate(params)?;
        self.params.copy_from_slice(params);
        Ok(())
    }

    fn reconstruct_point(&self, pixel: &Vector2<f64>) -> Option<Vector3<f64>> {
        let [alpha, beta, fu, fv, u0, v0] = self.params;
        let xn = (pixel.x - u0) / fu;
        let yn = (pixel.y - v0) / fv;
        let r2 = xn * xn + yn * yn;

        if alpha > 0.5 && r2 >= 1.0 / ((2.0 * alpha - 1.0) * beta) {
            return None;
        }

        let det = 1.0 - (2.0 * alpha - 1.0) * beta * r2;
        if det < 0.0 {
            return None;
        }

        let mz = (1.0 - alpha * alpha * beta * r2) / (alpha * det.sqrt() + 1.0 - alpha);
        Some(Vector3::new(xn, yn, mz))
    }

    fn project(&self, point: &Vector3<f64>) -> Option<Vector2<f64>> {
        let [_, _, fu, fv, u0, v0] = self.params;
        let (_, denom) = self.denominator(point)?;
        Some(Vector2::new(
            fu * point.x / denom + u0,
            fv * point.y / denom + v0,
        ))
    }

    fn clone_model(&self) -> Box<dyn CameraModel> {
        Box::new(self.clone())
    }

    fn project_with_param_jacobian(
        &self,
        point: &Vector3<f64>,
    ) -> Option<(Vector2<f64>, DMatrix<f64>)> {
        let [alpha, _, fu, fv, u0, v0] = self.params;
        let (rho, denom) = self.denominator(point)?;
        let (x, y, z) = (point.x, point.y, point.z);
        let denom2 = denom * denom;

        let ddenom_dalpha = rho - z;
        let ddenom_dbeta = alpha * (x * x + y * y) / (2.0 * rho);
        let (du, dv) = (-fu * x / denom2, -fv * y / denom2);

        #[rustfmt::skip]
        let jacobian = DMatrix::from_row_slice(2, PARAM_COUNT, &[
            du * ddenom_dalpha, du * ddenom_dbeta, x / denom, 0.0, 1.0, 0.0,
            dv * ddenom_dalpha, dv * ddenom_dbeta, 0.0, y / denom, 0.0, 1.0,
        ]);

        Some((Vector2::new(fu * x / denom + u0, fv * y / denom + v0), jacobian))
    }

    fn project_with_point_jacobian(
        &self,
        point: &Vector3<f64>,
    ) -> Option<(Vector2<f64>, Matrix2x3<f64>)> {
        let [alpha, beta, fu, fv, u0, v0] = self.params;
        let (rho, denom) = self.denominator(point)?;
        let (x, y, z) = (point.x, point.y, point.z);
        let denom2 = denom * denom;

        let ddenom_dx = alpha * beta * x / rho;
        let ddenom_dy = alpha * beta * y / rho;
        let ddenom_dz = alpha * z / rho + 1.0 - alpha;

        let jacobian = Matrix2x3::new(
            fu * (denom - x * ddenom_dx) / denom2,
            -fu * x * ddenom_dy / denom2,
            -fu * x * ddenom_dz / denom2,
            -fv * y * ddenom_dx / denom2,
            fv * (denom - y * ddenom_dy) / denom2,
            -fv * y * ddenom_dz / denom2,
        );

        Some((Vector2::new(fu * x / denom + u0, fv * y / denom + v0), jacobian))
    }
}
