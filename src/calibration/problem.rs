use crate::{camera::CameraModel, observation::Observation, transform::Transform};
use nalgebra::{DMatrix, DVector, Matrix2x6, Matrix3, Matrix3x6, Matrix6, Vector2, Vector6};
use rayon::prelude::*;

/// Point in the search space: intrinsics followed by one pose per observation.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct Estimate {
    pub intrinsics: Vec<f64>,
    pub poses: Vec<Transform>,
}

/// Gauss-Newton approximation of the cost around an estimate.
#[derive(Debug)]
pub(crate) struct NormalEquations {
    /// `J^T J`
    pub hessian: DMatrix<f64>,
    /// `J^T r`
    pub gradient: DVector<f64>,
    /// Sum of squared residual components.
    pub cost: f64,
}

impl NormalEquations {
    /// Solves `(J^T J + lambda I) delta = -J^T r`.
    ///
    /// Returns `None` if the damped system is not positive definite.
    pub fn solve(&self, lambda: f64) -> Option<DVector<f64>> {
        let mut damped = self.hessian.clone();
        for i in 0..damped.nrows() {
            damped[(i, i)] += lambda;
        }
        let delta = damped.cholesky()?.solve(&(-&self.gradient));
        delta.iter().all(|v| v.is_finite()).then_some(delta)
    }
}

/// Contribution of a single observation to the normal equations.
struct Block {
    h_kk: DMatrix<f64>,
    h_kp: DMatrix<f64>,
    h_pp: Matrix6<f64>,
    g_k: DVector<f64>,
    g_p: Vector6<f64>,
    cost: f64,
}

/// Reprojection least squares over a fixed set of observations.
///
/// Every retained correspondence contributes the residual
/// `project(pose * point) - pixel`.
pub(crate) struct Problem<'a> {
    camera: &'a dyn CameraModel,
    observations: &'a [Observation],
    refine_extrinsics: bool,
}

impl<'a> Problem<'a> {
    pub fn new(
        camera: &'a dyn CameraModel,
        observations: &'a [Observation],
        refine_extrinsics: bool,
    ) -> Self {
        Self {
            camera,
            observations,
            refine_extrinsics,
        }
    }

    /// Number of unknowns.
    pub fn dim(&self) -> usize {
        let poses = match self.refine_extrinsics {
            true => 6 * self.observations.len(),
            false => 0,
        };
        self.camera.param_count() + poses
    }

    /// Number of scalar residuals.
    pub fn residual_count(&self) -> usize {
        2 * self.observations.iter().map(Observation::len).sum::<usize>()
    }

    pub fn observations(&self) -> &[Observation] {
        self.observations
    }

    /// Estimate holding the observation poses.
    pub fn initial(&self, intrinsics: &[f64]) -> Estimate {
        Estimate {
            intrinsics: intrinsics.to_vec(),
            poses: self.observations.iter().map(|o| *o.pose()).collect(),
        }
    }

    /// Applies a solver step.
    pub fn retract(&self, estimate: &Estimate, delta: &DVector<f64>) -> Estimate {
        let k = estimate.intrinsics.len();
        let intrinsics = estimate
            .intrinsics
            .iter()
            .zip(delta.iter())
            .map(|(value, step)| value + step)
            .collect();

        let poses = match self.refine_extrinsics {
            true => estimate
                .poses
                .iter()
                .enumerate()
                .map(|(i, pose)| pose.retract(&delta.fixed_rows::<6>(k + 6 * i).into_owned()))
                .collect(),
            false => estimate.poses.clone(),
        };

        Estimate { intrinsics, poses }
    }

    /// Camera configured with the intrinsics of `estimate`.
    ///
    /// Returns `None` if the intrinsics are rejected by the model.
    pub fn model(&self, estimate: &Estimate) -> Option<Box<dyn CameraModel>> {
        let mut model = self.camera.clone_model();
        model.set_params(&estimate.intrinsics).ok()?;
        Some(model)
    }

    /// Sum of squared residual components, or `None` if any correspondence
    /// cannot be projected.
    pub fn cost(&self, estimate: &Estimate) -> Option<f64> {
        let model = self.model(estimate)?;
        let costs: Option<Vec<f64>> = self
            .observations
            .par_iter()
            .zip(estimate.poses.par_iter())
            .map(|(observation, pose)| {
                observation
                    .correspondences()
                    .iter()
                    .map(|c| {
                        let pixel = model.project(&pose.transform_point(&c.point))?;
                        Some((pixel - c.pixel).norm_squared())
                    })
                    .sum::<Option<f64>>()
            })
            .collect();

        Some(costs?.into_iter().sum())
    }

    /// Builds the normal equations at `estimate`.
    ///
    /// Observations are linearized in parallel and reduced in order, so the
    /// result does not depend on scheduling.
    pub fn linearize(&self, estimate: &Estimate) -> Option<NormalEquations> {
        let model = self.model(estimate)?;
        let blocks: Option<Vec<Block>> = self
            .observations
            .par_iter()
            .zip(estimate.poses.par_iter())
            .map(|(observation, pose)| self.block(model.as_ref(), observation, pose))
            .collect();

        let k = estimate.intrinsics.len();
        let n = self.dim();
        let mut hessian = DMatrix::zeros(n, n);
        let mut gradient = DVector::zeros(n);
        let mut cost = 0.0;

        for (i, block) in blocks?.into_iter().enumerate() {
            let mut h_kk = hessian.view_mut((0, 0), (k, k));
            h_kk += &block.h_kk;
            let mut g_k = gradient.rows_mut(0, k);
            g_k += &block.g_k;
            cost += block.cost;

            if self.refine_extrinsics {
                let offset = k + 6 * i;
                hessian
                    .view_mut((0, offset), (k, 6))
                    .copy_from(&block.h_kp);
                hessian
                    .view_mut((offset, 0), (6, k))
                    .copy_from(&block.h_kp.transpose());
                hessian
                    .fixed_view_mut::<6, 6>(offset, offset)
                    .copy_from(&block.h_pp);
                gradient.fixed_rows_mut::<6>(offset).copy_from(&block.g_p);
            }
        }

        Some(NormalEquations {
            hessian,
            gradient,
            cost,
        })
    }

    fn block(
        &self,
        model: &dyn CameraModel,
        observation: &Observation,
        pose: &Transform,
    ) -> Option<Block> {
        let k = model.param_count();
        let mut block = Block {
            h_kk: DMatrix::zeros(k, k),
            h_kp: DMatrix::zeros(k, 6),
            h_pp: Matrix6::zeros(),
            g_k: DVector::zeros(k),
            g_p: Vector6::zeros(),
            cost: 0.0,
        };

        for c in observation.correspondences() {
            let point = pose.transform_point(&c.point);
            let (pixel, j_k) = model.project_with_param_jacobian(&point)?;
            let residual: Vector2<f64> = pixel - c.pixel;

            block.h_kk += j_k.transpose() * &j_k;
            block.g_k += j_k.transpose() * residual;
            block.cost += residual.norm_squared();

            if self.refine_extrinsics {
                let (_, j_point) = model.project_with_point_jacobian(&point)?;
                // Derivative of the camera-frame point under a left increment
                // [dt, dr] of the pose.
                let mut j_increment = Matrix3x6::<f64>::zeros();
                j_increment
                    .fixed_view_mut::<3, 3>(0, 0)
                    .copy_from(&Matrix3::identity());
                j_increment
                    .fixed_view_mut::<3, 3>(0, 3)
                    .copy_from(&(-point.cross_matrix()));
                let j_p: Matrix2x6<f64> = j_point * j_increment;

                block.h_kp += j_k.transpose() * j_p;
                block.h_pp += j_p.transpose() * j_p;
                block.g_p += j_p.transpose() * residual;
            }
        }

        Some(block)
    }
}
