//! Camera projection models.
//!
//! A camera model maps rays in the camera frame (x right, y down, z forward)
//! to pixels and back. Every model is parameterized by a flat vector of
//! intrinsics so that the calibration engine can treat the family uniformly.

use nalgebra::{DMatrix, Matrix2x3, Vector2, Vector3};
use std::fmt;
use thiserror::Error;

pub mod eucm;
pub mod pinhole;

pub use eucm::EnhancedUnified;
pub use pinhole::Pinhole;

/// Step used by the finite difference Jacobians.
const DIFF_STEP: f64 = 1e-6;

#[derive(Debug, Error)]
pub enum CameraError {
    #[error("expected image dimensions of at least 1x1 but got: {width}x{height}")]
    InvalidDimensions { width: usize, height: usize },
    #[error("expected {expected} parameters but got: {got}")]
    ParameterCount { expected: usize, got: usize },
    #[error("parameter {name} has invalid value: {value}")]
    InvalidParameter { name: &'static str, value: f64 },
}

/// Capabilities shared by every camera model.
pub trait CameraModel: fmt::Debug + Send + Sync {
    /// Short identifier of the model family.
    fn name(&self) -> &'static str;

    fn width(&self) -> usize;

    fn height(&self) -> usize;

    /// Current intrinsic parameter vector.
    fn params(&self) -> &[f64];

    /// Replaces the intrinsic parameters.
    ///
    /// Fails without modifying the model if `params` has the wrong length or
    /// would leave the projection ill-defined.
    fn set_params(&mut self, params: &[f64]) -> Result<(), CameraError>;

    /// Maps a pixel to a viewing ray in the camera frame.
    ///
    /// Returns `None` if the pixel has no preimage under the current
    /// parameters. The returned ray is not necessarily of unit length.
    fn reconstruct_point(&self, pixel: &Vector2<f64>) -> Option<Vector3<f64>>;

    /// Maps a point in the camera frame to a pixel.
    ///
    /// Returns `None` if the point lies outside the model's domain.
    fn project(&self, point: &Vector3<f64>) -> Option<Vector2<f64>>;

    /// Returns an independent copy of the model.
    fn clone_model(&self) -> Box<dyn CameraModel>;

    fn param_count(&self) -> usize {
        self.params().len()
    }

    fn contains(&self, pixel: &Vector2<f64>) -> bool {
        pixel.x >= 0.0
            && pixel.y >= 0.0
            && pixel.x < self.width() as f64
            && pixel.y < self.height() as f64
    }

    /// Projects `point` and returns the 2xN derivative of the pixel with
    /// respect to the parameter vector.
    fn project_with_param_jacobian(
        &self,
        point: &Vector3<f64>,
    ) -> Option<(Vector2<f64>, DMatrix<f64>)> {
        let pixel = self.project(point)?;
        let params = self.params().to_vec();
        let mut jacobian = DMatrix::zeros(2, params.len());
        let mut probe = self.clone_model();

        for (i, value) in params.iter().enumerate() {
            let step = DIFF_STEP * value.abs().max(1.0);
            let mut shifted = params.clone();

            shifted[i] = value + step;
            probe.set_params(&shifted).ok()?;
            let forward = probe.project(point)?;

            shifted[i] = value - step;
            probe.set_params(&shifted).ok()?;
            let backward = probe.project(point)?;

            jacobian
                .column_mut(i)
                .copy_from(&((forward - backward) / (2.0 * step)));
        }

        Some((pixel, jacobian))
    }

    /// Projects `point` and returns the 2x3 derivative of the pixel with
    /// respect to the point.
    fn project_with_point_jacobian(
        &self,
        point: &Vector3<f64>,
    ) -> Option<(Vector2<f64>, Matrix2x3<f64>)> {
        let pixel = self.project(point)?;
        let mut jacobian = Matrix2x3::zeros();

        for i in 0..3 {
            let step = DIFF_STEP * point[i].abs().max(1.0);
            let mut shifted = *point;

            shifted[i] = point[i] + step;
            let forward = self.project(&shifted)?;

            shifted[i] = point[i] - step;
            let backward = self.project(&shifted)?;

            jacobian
                .column_mut(i)
                .copy_from(&((forward - backward) / (2.0 * step)));
        }

        Some((pixel, jacobian))
    }
}

impl Clone for Box<dyn CameraModel> {
    fn clone(&self) -> Self {
        self.clone_model()
    }
}

fn check_dimensions(width: usize, height: usize) -> Result<(), CameraError> {
    match width >= 1 && height >= 1 {
        true => Ok(()),
        false => Err(CameraError::InvalidDimensions { width, height }),
    }
}

fn check_count(params: &[f64], expected: usize) -> Result<(), CameraError> {
    match params.len() == expected {
        true => Ok(()),
        false => Err(CameraError::ParameterCount {
            expected,
            got: params.len(),
        }),
    }
}

fn check_positive(name: &'static str, value: f64) -> Result<(), CameraError> {
    match value.is_finite() && value > 0.0 {
        true => Ok(()),
        false => Err(CameraError::InvalidParameter { name, value }),
    }
}

fn check_finite(name: &'static str, value: f64) -> Result<(), CameraError> {
    match value.is_finite() {
        true => Ok(()),
        false => Err(CameraError::InvalidParameter { name, value }),
    }
}
