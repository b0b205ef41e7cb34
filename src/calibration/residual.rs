use crate::{camera::CameraModel, observation::Observation, transform::Transform};
use rayon::prelude::*;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use std::fmt;

/// Aggregate pixel reprojection error.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ResidualStats {
    /// Number of correspondences that could be projected.
    pub count: usize,
    /// Number of correspondences the model could not project.
    pub unprojected: usize,
    pub mean: f64,
    pub max: f64,
    pub std_dev: f64,
    pub rms: f64,
}

impl ResidualStats {
    /// Summarizes per-correspondence error norms.
    pub fn from_errors(errors: &[f64], unprojected: usize) -> Self {
        if errors.is_empty() {
            return Self {
                unprojected,
                ..Self::default()
            };
        }

        let n = errors.len() as f64;
        let mean = errors.iter().sum::<f64>() / n;
        let max = errors.iter().copied().fold(0.0, f64::max);
        let variance = errors.iter().map(|e| (e - mean).powi(2)).sum::<f64>() / n;
        let rms = (errors.iter().map(|e| e * e).sum::<f64>() / n).sqrt();

        Self {
            count: errors.len(),
            unprojected,
            mean,
            max,
            std_dev: variance.sqrt(),
            rms,
        }
    }
}

impl fmt::Display for ResidualStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} residuals, mean {:.6} px, max {:.6} px, std {:.6} px, rms {:.6} px",
            self.count, self.mean, self.max, self.std_dev, self.rms
        )?;
        if self.unprojected > 0 {
            write!(f, ", {} unprojected", self.unprojected)?;
        }
        Ok(())
    }
}

/// Pixel error norm of every correspondence, in observation then
/// correspondence order, and the number of correspondences that could not be
/// projected.
pub(crate) fn reprojection_errors(
    camera: &dyn CameraModel,
    observations: &[Observation],
    poses: &[Transform],
) -> (Vec<f64>, usize) {
    let per_observation: Vec<(Vec<f64>, usize)> = observations
        .par_iter()
        .zip(poses.par_iter())
        .map(|(observation, pose)| {
            let mut errors = Vec::with_capacity(observation.len());
            let mut unprojected = 0;
            for c in observation.correspondences() {
                match camera.project(&pose.transform_point(&c.point)) {
                    Some(pixel) => errors.push((pixel - c.pixel).norm()),
                    None => unprojected += 1,
                }
            }
            (errors, unprojected)
        })
        .collect();

    per_observation.into_iter().fold(
        (Vec::new(), 0),
        |(mut all, total), (errors, unprojected)| {
            all.extend(errors);
            (all, total + unprojected)
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn statistics() {
        let stats = ResidualStats::from_errors(&[1.0, 2.0, 3.0, 6.0], 0);
        assert_eq!(stats.count, 4);
        assert_relative_eq!(stats.mean, 3.0);
        assert_relative_eq!(stats.max, 6.0);
        assert_relative_eq!(stats.std_dev, 3.5f64.sqrt());
        assert_relative_eq!(stats.rms, 12.5f64.sqrt());
    }

    #[test]
    fn empty_statistics_are_zero() {
        let stats = ResidualStats::from_errors(&[], 3);
        assert_eq!(stats.count, 0);
        assert_eq!(stats.unprojected, 3);
        assert_eq!(stats.mean, 0.0);
        assert_eq!(stats.max, 0.0);
    }

    #[test]
    fn report_line() {
        let stats = ResidualStats::from_errors(&[0.5, 1.5], 1);
        insta::assert_snapshot!(
            stats.to_string(),
            @"2 residuals, mean 1.000000 px, max 1.500000 px, std 0.500000 px, rms 1.118034 px, 1 unprojected"
        );
    }
}
