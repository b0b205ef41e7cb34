use super::{CameraError, CameraModel, check_count, check_dimensions, check_finite, check_positive};
use nalgebra::{Vector2, Vector3};

const MIN_DEPTH: f64 = 1e-3;

const PARAM_COUNT: usize = 4;

/// Distortion-free perspective camera with parameters `[fu, fv, u0, v0]`.
#[derive(Clone, Debug, PartialEq)]
pub struct Pinhole {
    width: usize,
    height: usize,
    params: [f64; PARAM_COUNT],
}

impl Pinhole {
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

    fn validate(params: &[f64]) -> Result<(), CameraError> {
        check_count(params, PARAM_COUNT)?;
        check_positive("fu", params[0])?;
        check_positive("fv", params[1])?;
        check_finite("u0", params[2])?;
        check_finite("v0", params[3])
    }
}

impl CameraModel for Pinhole {
    fn name(&self) -> &'static str {
        "pinhole"
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
        let [fu, fv, u0, v0] = self.params;
        Some(Vector3::new((pixel.x - u0) / fu, (pixel.y - v0) / fv, 1.0))
    }

    fn project(&self, point: &Vector3<f64>) -> Option<Vector2<f64>> {
        let [fu, fv, u0, v0] = self.params;
        if point.z < MIN_DEPTH {
            return None;
        }
        Some(Vector2::new(
            fu * point.x / point.z + u0,
            fv * point.y / point.z + v0,
        ))
    }

    fn clone_model(&self) -> Box<dyn CameraModel> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn projects_in_front_only() {
        let cam = Pinhole::new(640, 480, [500.0, 500.0, 320.0, 240.0]).unwrap();
        assert_relative_eq!(
            cam.project(&Vector3::new(0.1, 0.2, 1.0)).unwrap(),
            Vector2::new(370.0, 340.0)
        );
        assert!(cam.project(&Vector3::new(0.1, 0.2, -1.0)).is_none());
    }

    #[test]
    fn numeric_jacobian_of_focal_length() {
        let cam = Pinhole::new(640, 480, [500.0, 400.0, 320.0, 240.0]).unwrap();
        let (_, jacobian) = cam
            .project_with_param_jacobian(&Vector3::new(0.5, -0.25, 2.0))
            .unwrap();
        assert_relative_eq!(jacobian[(0, 0)], 0.25, epsilon = 1e-6);
        assert_relative_eq!(jacobian[(1, 1)], -0.125, epsilon = 1e-6);
        assert_relative_eq!(jacobian[(0, 2)], 1.0, epsilon = 1e-6);
        assert_relative_eq!(jacobian[(1, 2)], 0.0, epsilon = 1e-6);
    }
}
