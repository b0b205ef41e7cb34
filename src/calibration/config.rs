#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Settings of the intrinsic calibration engine.
///
/// The solver damps the normal equations as `(J^T J + lambda I) delta = -J^T r`.
/// `lambda` starts at `lambda_init`, is divided by `lambda_factor` after every
/// accepted step and multiplied by it after every rejected one.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CalibrationConfig {
    /// Fewest usable observations accepted by `initialize` and `compute`.
    pub min_observations: usize,
    /// Also refine the board pose of every observation.
    pub refine_extrinsics: bool,
    pub max_iterations: usize,
    /// Relative decrease of the total squared residual below which the
    /// solver stops.
    pub cost_tolerance: f64,
    /// Norm of `J^T r` below which the solver stops.
    pub gradient_tolerance: f64,
    /// Step norm, relative to the parameter norm, below which the solver stops.
    pub step_tolerance: f64,
    pub lambda_init: f64,
    pub lambda_factor: f64,
    /// Damping above which the solve is considered singular.
    pub lambda_max: f64,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            min_observations: 2,
            refine_extrinsics: false,
            max_iterations: 100,
            cost_tolerance: 1e-10,
            gradient_tolerance: 1e-10,
            step_tolerance: 1e-10,
            lambda_init: 1e-3,
            lambda_factor: 10.0,
            lambda_max: 1e12,
        }
    }
}

impl CalibrationConfig {
    pub fn with_min_observations(mut self, min_observations: usize) -> Self {
        self.min_observations = min_observations;
        self
    }

    pub fn with_refine_extrinsics(mut self, refine_extrinsics: bool) -> Self {
        self.refine_extrinsics = refine_extrinsics;
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_cost_tolerance(mut self, cost_tolerance: f64) -> Self {
        self.cost_tolerance = cost_tolerance;
        self
    }

    pub fn with_lambda_init(mut self, lambda_init: f64) -> Self {
        self.lambda_init = lambda_init;
        self
    }

    pub fn with_lambda_max(mut self, lambda_max: f64) -> Self {
        self.lambda_max = lambda_max;
        self
    }

    /// Observation count below which calibration is refused.
    ///
    /// Never less than one.
    pub(crate) fn required_observations(&self) -> usize {
        self.min_observations.max(1)
    }
}
