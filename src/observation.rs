//! Correspondences between detected pixels and known board points.

use crate::{
    board::BoardDescriptor, calibration::CalibrationError, camera::CameraModel,
    transform::Transform,
};
use nalgebra::{Vector2, Vector3};

/// A detected pixel paired with the board-frame point it images.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Correspondence {
    pub pixel: Vector2<f64>,
    pub point: Vector3<f64>,
}

impl Correspondence {
    pub fn new(pixel: Vector2<f64>, point: Vector3<f64>) -> Self {
        Self { pixel, point }
    }
}

/// One calibration snapshot: a board pose and its correspondences.
#[derive(Clone, Debug, PartialEq)]
pub struct Observation {
    pose: Transform,
    correspondences: Vec<Correspondence>,
}

impl Observation {
    pub fn new(pose: Transform, correspondences: Vec<Correspondence>) -> Self {
        Self {
            pose,
            correspondences,
        }
    }

    /// Pairs `pixels` with `points` element-wise.
    pub fn from_parts(
        pose: Transform,
        pixels: &[Vector2<f64>],
        points: &[Vector3<f64>],
    ) -> Result<Self, CalibrationError> {
        if pixels.len() != points.len() {
            return Err(CalibrationError::MalformedObservation {
                pixels: pixels.len(),
                points: points.len(),
            });
        }

        Ok(Self::new(
            pose,
            pixels
                .iter()
                .zip(points)
                .map(|(pixel, point)| Correspondence::new(*pixel, *point))
                .collect(),
        ))
    }

    /// Pose of the board in the camera frame.
    pub fn pose(&self) -> &Transform {
        &self.pose
    }

    pub fn correspondences(&self) -> &[Correspondence] {
        &self.correspondences
    }

    pub fn len(&self) -> usize {
        self.correspondences.len()
    }

    pub fn is_empty(&self) -> bool {
        self.correspondences.is_empty()
    }
}

/// Anything that can produce calibration observations.
///
/// Image decoding and corner detection live behind this trait.
pub trait ObservationSource {
    fn observations(&self) -> Result<Vec<Observation>, CalibrationError>;
}

impl ObservationSource for [Observation] {
    fn observations(&self) -> Result<Vec<Observation>, CalibrationError> {
        Ok(self.to_vec())
    }
}

impl ObservationSource for Vec<Observation> {
    fn observations(&self) -> Result<Vec<Observation>, CalibrationError> {
        Ok(self.clone())
    }
}

/// Noiseless observations of a board seen by a known camera.
///
/// Each board corner is projected through the camera; corners that cannot be
/// projected or fall outside the image are dropped.
#[derive(Debug)]
pub struct SyntheticSource {
    camera: Box<dyn CameraModel>,
    board: BoardDescriptor,
    poses: Vec<Transform>,
}

impl SyntheticSource {
    pub fn new(camera: &dyn CameraModel, board: BoardDescriptor, poses: Vec<Transform>) -> Self {
        Self {
            camera: camera.clone_model(),
            board,
            poses,
        }
    }

    pub fn board(&self) -> &BoardDescriptor {
        &self.board
    }

    pub fn poses(&self) -> &[Transform] {
        &self.poses
    }

    fn observe(&self, pose: &Transform) -> Observation {
        let correspondences = self
            .board
            .corners()
            .into_iter()
            .filter_map(|point| {
                let pixel = self.camera.project(&pose.transform_point(&point))?;
                self.camera
                    .contains(&pixel)
                    .then_some(Correspondence::new(pixel, point))
            })
            .collect();

        Observation::new(*pose, correspondences)
    }
}

impl ObservationSource for SyntheticSource {
    fn observations(&self) -> Result<Vec<Observation>, CalibrationError> {
        Ok(self.poses.iter().map(|pose| self.observe(pose)).collect())
    }
}
