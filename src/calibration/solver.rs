use super::{
    CalibrationConfig,
    problem::{Estimate, Problem},
};
use log::debug;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Smallest damping the solver decays to.
const LAMBDA_MIN: f64 = 1e-12;

/// Why the solver stopped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Termination {
    /// The relative cost decrease fell below the tolerance.
    CostConverged,
    /// The gradient norm fell below the tolerance.
    GradientConverged,
    /// The step fell below the tolerance.
    StepConverged,
    /// No step reduced the cost before the damping saturated.
    DampingSaturated,
    MaxIterations,
}

impl Termination {
    pub fn is_converged(&self) -> bool {
        !matches!(self, Termination::MaxIterations)
    }
}

/// Result of a Levenberg-Marquardt run.
#[derive(Debug)]
pub(crate) struct Outcome {
    /// Best accepted estimate.
    pub estimate: Estimate,
    pub termination: Termination,
    pub iterations: usize,
    /// Cost of every accepted estimate, starting with the initial one.
    pub cost_history: Vec<f64>,
    pub lambda: f64,
}

impl Outcome {
    pub fn initial_cost(&self) -> f64 {
        self.cost_history.first().copied().unwrap_or_default()
    }

    pub fn final_cost(&self) -> f64 {
        self.cost_history.last().copied().unwrap_or_default()
    }

    /// Number of accepted steps.
    pub fn accepted(&self) -> usize {
        self.cost_history.len().saturating_sub(1)
    }
}

/// Minimizes the problem's cost starting from `initial`.
///
/// Returns `None` if the cost is undefined at `initial`. Steps that increase
/// the cost or leave the domain of the camera model are rejected and only
/// raise the damping, so the returned estimate is the best one visited. Step
/// and cost convergence are only declared once a step has been accepted;
/// until then rejections raise the damping up to `lambda_max`.
pub(crate) fn minimize(
    problem: &Problem,
    initial: Estimate,
    config: &CalibrationConfig,
) -> Option<Outcome> {
    let mut estimate = initial;
    let mut normal = problem.linearize(&estimate)?;
    let mut cost_history = vec![normal.cost];
    let mut lambda = config.lambda_init;
    let mut iterations = 0;

    let termination = loop {
        if normal.gradient.norm() < config.gradient_tolerance {
            break Termination::GradientConverged;
        }

        if iterations >= config.max_iterations {
            break Termination::MaxIterations;
        }
        iterations += 1;

        let Some(delta) = normal.solve(lambda) else {
            debug!("iteration {iterations}: damped system is singular at lambda {lambda:e}");
            lambda *= config.lambda_factor;
            match lambda > config.lambda_max {
                true => break Termination::DampingSaturated,
                false => continue,
            }
        };

        // Before the first accepted step a vanishing step only means the
        // damping has grown, not that a minimum was reached.
        let progressed = cost_history.len() > 1;
        let scale = estimate.intrinsics.iter().map(|v| v * v).sum::<f64>().sqrt();
        if progressed && delta.norm() <= config.step_tolerance * (scale + config.step_tolerance) {
            break Termination::StepConverged;
        }

        let candidate = problem.retract(&estimate, &delta);
        let candidate_cost = problem.cost(&candidate);

        match candidate_cost {
            Some(cost) if cost < normal.cost => {
                let Some(next) = problem.linearize(&candidate) else {
                    lambda *= config.lambda_factor;
                    continue;
                };

                let decrease = normal.cost - next.cost;
                let relative = decrease / normal.cost;
                debug!(
                    "iteration {iterations}: accepted, cost {:.6e} -> {:.6e}, lambda {lambda:e}",
                    normal.cost, next.cost
                );

                estimate = candidate;
                normal = next;
                cost_history.push(normal.cost);
                lambda = (lambda / config.lambda_factor).max(LAMBDA_MIN);

                if relative < config.cost_tolerance {
                    break Termination::CostConverged;
                }
            }
            _ => {
                debug!(
                    "iteration {iterations}: rejected, cost {:?}, lambda {lambda:e}",
                    candidate_cost
                );

                let stalled = progressed
                    && candidate_cost.is_some_and(|cost| {
                        let change = (cost - normal.cost).abs();
                        match normal.cost > 0.0 {
                            true => change / normal.cost < config.cost_tolerance,
                            false => change < config.cost_tolerance,
                        }
                    });
                if stalled {
                    break Termination::CostConverged;
                }

                lambda *= config.lambda_factor;
                if lambda > config.lambda_max {
                    break Termination::DampingSaturated;
                }
            }
        }
    };

    Some(Outcome {
        estimate,
        termination,
        iterations,
        cost_history,
        lambda,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        board::BoardDescriptor,
        camera::{CameraModel, EnhancedUnified},
        observation::{Observation, ObservationSource, SyntheticSource},
        transform::Transform,
    };
    use approx::assert_relative_eq;

    const TRUTH: [f64; 6] = [0.6, 1.1, 400.0, 410.0, 320.0, 240.0];

    fn observations() -> (EnhancedUnified, Vec<Observation>) {
        let camera = EnhancedUnified::new(640, 480, TRUTH).unwrap();
        let board = BoardDescriptor::new(8, 6, 0.05).unwrap();
        let poses = vec![
            Transform::new(-0.175, -0.125, 0.5, 0.2, -0.1, 0.05),
            Transform::new(-0.1, -0.15, 0.6, -0.25, 0.3, -0.1),
            Transform::new(-0.2, -0.05, 0.45, 0.1, 0.25, 0.2),
        ];
        let observations = SyntheticSource::new(&camera, board, poses)
            .observations()
            .unwrap();
        (camera, observations)
    }

    #[test]
    fn recovers_intrinsics() {
        let (camera, observations) = observations();
        let problem = Problem::new(&camera, &observations, false);
        let initial = problem.initial(&[0.5, 1.0, 390.0, 400.0, 325.0, 245.0]);

        let outcome = minimize(&problem, initial, &CalibrationConfig::default()).unwrap();

        assert!(outcome.termination.is_converged(), "{:?}", outcome.termination);
        for (estimated, truth) in outcome.estimate.intrinsics.iter().zip(camera.params()) {
            assert_relative_eq!(estimated, truth, epsilon = 1e-6, max_relative = 1e-6);
        }
        assert!(outcome.final_cost() < 1e-12);
        assert!(outcome.cost_history.windows(2).all(|w| w[1] <= w[0]));
    }

    #[test]
    fn exact_start_stops_immediately() {
        let (camera, observations) = observations();
        let problem = Problem::new(&camera, &observations, false);
        let initial = problem.initial(camera.params());

        let outcome = minimize(&problem, initial.clone(), &CalibrationConfig::default()).unwrap();

        assert_eq!(outcome.termination, Termination::GradientConverged);
        assert_eq!(outcome.iterations, 0);
        assert_eq!(outcome.estimate, initial);
    }

    #[test]
    fn iteration_cap() {
        let (camera, observations) = observations();
        let problem = Problem::new(&camera, &observations, false);
        let initial = problem.initial(&[0.5, 1.0, 390.0, 400.0, 325.0, 245.0]);
        let config = CalibrationConfig::default().with_max_iterations(1);

        let outcome = minimize(&problem, initial, &config).unwrap();

        assert_eq!(outcome.termination, Termination::MaxIterations);
        assert_eq!(outcome.iterations, 1);
        assert!(outcome.final_cost() <= outcome.initial_cost());
    }

    /// Observations of a camera with `alpha = 1` and a guess whose focal
    /// lengths are too long.
    ///
    /// The cost decreases with alpha, so every gradient-like step leaves the
    /// model's domain.
    fn boundary_problem() -> (EnhancedUnified, Vec<Observation>) {
        let camera =
            EnhancedUnified::new(640, 480, [1.0, 1.0, 300.0, 300.0, 320.0, 240.0]).unwrap();
        let board = BoardDescriptor::new(8, 6, 0.05).unwrap();
        let (_, truth) = observations();
        let poses = truth.iter().map(|o| *o.pose()).collect();
        let observations = SyntheticSource::new(&camera, board, poses)
            .observations()
            .unwrap();
        (camera, observations)
    }

    #[test]
    fn no_progress_saturates_damping() {
        let (camera, observations) = boundary_problem();
        let problem = Problem::new(&camera, &observations, false);
        let initial = problem.initial(&[1.0, 1.0, 400.0, 400.0, 320.0, 240.0]);
        let config = CalibrationConfig::default().with_lambda_init(1e6);

        let outcome = minimize(&problem, initial.clone(), &config).unwrap();

        assert_eq!(outcome.termination, Termination::DampingSaturated);
        assert_eq!(outcome.accepted(), 0);
        assert!(outcome.lambda > config.lambda_max);
        assert_eq!(outcome.estimate, initial);
        assert_eq!(outcome.final_cost(), outcome.initial_cost());
    }

    #[test]
    fn undefined_start() {
        let (camera, observations) = observations();
        let problem = Problem::new(&camera, &observations, false);
        let initial = problem.initial(&[2.0, 1.0, 390.0, 400.0, 325.0, 245.0]);
        assert!(minimize(&problem, initial, &CalibrationConfig::default()).is_none());
    }
}
