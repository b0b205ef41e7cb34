use crate::{calibration::CalibrationError, camera::CameraError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("InvalidInput: {0}")]
    InvalidInput(String),
    #[error(transparent)]
    Camera(#[from] CameraError),
    #[error(transparent)]
    Calibration(#[from] CalibrationError),
}
