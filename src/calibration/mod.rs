//! Intrinsic calibration from board observations.
//!
//! The engine minimizes the pixel reprojection error of every correspondence
//! over the intrinsics of a [`CameraModel`], optionally together with the board
//! pose of every observation, using a damped Gauss-Newton (Levenberg-Marquardt)
//! iteration.

use crate::{
    camera::{CameraError, CameraModel},
    observation::{Observation, ObservationSource},
    transform::Transform,
};
use log::{debug, info, warn};
use thiserror::Error;

mod config;
mod problem;
mod residual;
mod solver;

pub use config::CalibrationConfig;
pub use residual::ResidualStats;
pub use solver::Termination;

use problem::Problem;

#[derive(Debug, Error)]
pub enum CalibrationError {
    #[error("expected at least {required} usable observations but found: {found}")]
    Initialization { found: usize, required: usize },
    #[error("failed to load observations: {0}")]
    Source(String),
    #[error("observation has {pixels} pixels but {points} board points")]
    MalformedObservation { pixels: usize, points: usize },
    #[error("{residuals} residuals cannot determine {parameters} parameters")]
    UnderDetermined { residuals: usize, parameters: usize },
    #[error("damping reached {lambda:e} without reducing the cost {cost:e}")]
    NumericalSingularity { lambda: f64, cost: f64 },
    /// The cost could not be evaluated at the screened initial parameters.
    #[error("cost is undefined at the initial parameters")]
    UndefinedCost,
    #[error("calibration has not been initialized")]
    NotInitialized,
    #[error(transparent)]
    Camera(#[from] CameraError),
}

/// Lifecycle of an [`IntrinsicCalibration`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CalibrationState {
    #[default]
    Uninitialized,
    /// Observations are loaded.
    Initialized,
    /// The last `compute` met a convergence criterion.
    Converged,
    /// The last `initialize` or `compute` failed, or stopped at the iteration
    /// cap.
    Failed,
}

/// Summary of a `compute` run.
#[derive(Clone, Debug)]
pub struct CalibrationReport {
    pub termination: Termination,
    /// Iterations performed, including rejected steps.
    pub iterations: usize,
    pub initial_cost: f64,
    pub final_cost: f64,
    /// Sum of squared residuals of every accepted estimate.
    pub cost_history: Vec<f64>,
    /// Observations left out because none of their correspondences could be
    /// projected with the initial parameters.
    pub excluded: Vec<usize>,
    /// Board pose of every loaded observation after the run.
    pub poses: Vec<Transform>,
    pub residuals: ResidualStats,
}

impl CalibrationReport {
    pub fn converged(&self) -> bool {
        self.termination.is_converged()
    }
}

/// Calibrates the intrinsics of a camera model.
///
/// ```no_run
/// # use eucalib::prelude::*;
/// # fn main() -> Result<(), eucalib::Error> {
/// # let source: Vec<Observation> = Vec::new();
/// let camera = EnhancedUnified::new(640, 480, [0.5, 1.0, 500.0, 500.0, 320.0, 240.0])?;
/// let mut calibration = IntrinsicCalibration::new(&camera, CalibrationConfig::default());
/// calibration.initialize(&source)?;
///
/// let mut params = camera.params().to_vec();
/// let report = calibration.compute(&mut params)?;
/// println!("{}", report.residuals);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct IntrinsicCalibration {
    camera: Box<dyn CameraModel>,
    config: CalibrationConfig,
    observations: Vec<Observation>,
    poses: Vec<Transform>,
    state: CalibrationState,
}

impl IntrinsicCalibration {
    /// Creates an engine for the model family of `camera`.
    pub fn new(camera: &dyn CameraModel, config: CalibrationConfig) -> Self {
        Self {
            camera: camera.clone_model(),
            config,
            observations: Vec::new(),
            poses: Vec::new(),
            state: CalibrationState::Uninitialized,
        }
    }

    pub fn config(&self) -> &CalibrationConfig {
        &self.config
    }

    pub fn state(&self) -> CalibrationState {
        self.state
    }

    /// Camera holding the parameters of the last `compute`.
    pub fn camera(&self) -> &dyn CameraModel {
        self.camera.as_ref()
    }

    pub fn observations(&self) -> &[Observation] {
        &self.observations
    }

    /// Current board poses, refined by `compute` if extrinsic refinement is
    /// enabled.
    pub fn poses(&self) -> &[Transform] {
        &self.poses
    }

    /// Loads observations from `source`, replacing any loaded before.
    ///
    /// Observations without correspondences are discarded. Returns the number
    /// of observations kept.
    pub fn initialize<S>(&mut self, source: &S) -> Result<usize, CalibrationError>
    where
        S: ObservationSource + ?Sized,
    {
        self.observations.clear();
        self.poses.clear();
        self.state = CalibrationState::Failed;

        let loaded = source.observations()?;
        let total = loaded.len();
        let observations: Vec<Observation> = loaded
            .into_iter()
            .enumerate()
            .filter_map(|(i, observation)| match observation.is_empty() {
                true => {
                    warn!("observation {i} has no correspondences, discarding it");
                    None
                }
                false => Some(observation),
            })
            .collect();

        let required = self.config.required_observations();
        if observations.len() < required {
            return Err(CalibrationError::Initialization {
                found: observations.len(),
                required,
            });
        }

        info!("loaded {} of {total} observations", observations.len());
        self.poses = observations.iter().map(|o| *o.pose()).collect();
        self.observations = observations;
        self.state = CalibrationState::Initialized;

        Ok(self.observations.len())
    }

    /// Refines `params` in place and returns a summary of the run.
    ///
    /// `params` holds the initial guess on entry and the best estimate found
    /// on return, also when an error is returned after the solver started.
    /// Stopping at the iteration cap is not an error: the report is returned
    /// with `converged() == false` and the engine moves to
    /// [`CalibrationState::Failed`].
    pub fn compute(&mut self, params: &mut [f64]) -> Result<CalibrationReport, CalibrationError> {
        if self.observations.is_empty() {
            return Err(CalibrationError::NotInitialized);
        }

        let result = self.solve(params);
        self.state = match &result {
            Ok(report) if report.converged() => CalibrationState::Converged,
            _ => CalibrationState::Failed,
        };
        result
    }

    fn solve(&mut self, params: &mut [f64]) -> Result<CalibrationReport, CalibrationError> {
        let mut model = self.camera.clone_model();
        model.set_params(params)?;

        let (active, indices, excluded) = self.screen(model.as_ref());
        let required = self.config.required_observations();
        if active.len() < required {
            return Err(CalibrationError::Initialization {
                found: active.len(),
                required,
            });
        }

        let problem = Problem::new(model.as_ref(), &active, self.config.refine_extrinsics);
        if problem.residual_count() < problem.dim() {
            return Err(CalibrationError::UnderDetermined {
                residuals: problem.residual_count(),
                parameters: problem.dim(),
            });
        }

        info!(
            "calibrating {} with {} observations and {} residuals",
            model.name(),
            active.len(),
            problem.residual_count()
        );

        let Some(outcome) = solver::minimize(&problem, problem.initial(params), &self.config)
        else {
            return Err(CalibrationError::UndefinedCost);
        };

        params.copy_from_slice(&outcome.estimate.intrinsics);
        self.camera.set_params(params)?;
        for (&slot, pose) in indices.iter().zip(&outcome.estimate.poses) {
            self.poses[slot] = *pose;
        }

        if outcome.termination == Termination::DampingSaturated && outcome.accepted() == 0 {
            warn!("no step reduced the cost of {:e}", outcome.final_cost());
            return Err(CalibrationError::NumericalSingularity {
                lambda: outcome.lambda,
                cost: outcome.final_cost(),
            });
        }

        let (errors, unprojected) = residual::reprojection_errors(
            self.camera.as_ref(),
            problem.observations(),
            &outcome.estimate.poses,
        );
        let residuals = ResidualStats::from_errors(&errors, unprojected);

        match outcome.termination {
            Termination::MaxIterations => warn!(
                "stopped after {} iterations without converging, {residuals}",
                outcome.iterations
            ),
            termination => info!(
                "{termination:?} after {} iterations, {residuals}",
                outcome.iterations
            ),
        }

        Ok(CalibrationReport {
            termination: outcome.termination,
            iterations: outcome.iterations,
            initial_cost: outcome.initial_cost(),
            final_cost: outcome.final_cost(),
            cost_history: outcome.cost_history,
            excluded,
            poses: self.poses.clone(),
            residuals,
        })
    }

    /// Splits the loaded observations into those usable with `model` and
    /// those excluded.
    ///
    /// Usable observations keep only correspondences that `model` can
    /// project and differentiate. Returns the usable observations, their
    /// indices and the excluded indices.
    fn screen(&self, model: &dyn CameraModel) -> (Vec<Observation>, Vec<usize>, Vec<usize>) {
        let mut active = Vec::with_capacity(self.observations.len());
        let mut indices = Vec::with_capacity(self.observations.len());
        let mut excluded = Vec::new();

        for (i, (observation, pose)) in self.observations.iter().zip(&self.poses).enumerate() {
            let kept: Vec<_> = observation
                .correspondences()
                .iter()
                .filter(|c| {
                    let point = pose.transform_point(&c.point);
                    model.project_with_param_jacobian(&point).is_some()
                        && (!self.config.refine_extrinsics
                            || model.project_with_point_jacobian(&point).is_some())
                })
                .copied()
                .collect();

            if kept.is_empty() {
                warn!("observation {i} cannot be projected with the initial parameters");
                excluded.push(i);
                continue;
            }

            if kept.len() < observation.len() {
                debug!(
                    "observation {i}: dropping {} unprojectable correspondences",
                    observation.len() - kept.len()
                );
            }

            active.push(Observation::new(*pose, kept));
            indices.push(i);
        }

        (active, indices, excluded)
    }

    /// Reprojection error of every loaded correspondence under `params`.
    pub fn residual_analysis(&self, params: &[f64]) -> Result<ResidualStats, CalibrationError> {
        if self.observations.is_empty() {
            return Err(CalibrationError::NotInitialized);
        }

        let mut model = self.camera.clone_model();
        model.set_params(params)?;

        let (errors, unprojected) =
            residual::reprojection_errors(model.as_ref(), &self.observations, &self.poses);
        let stats = ResidualStats::from_errors(&errors, unprojected);
        info!("{stats}");

        Ok(stats)
    }
}
