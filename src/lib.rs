// #![warn(missing_docs)]

//! Wide-angle Camera Calibration Utilities
//!
//! Provides the Enhanced Unified Camera Model, a renderer for synthetic
//! checkerboard images and a Levenberg-Marquardt engine that calibrates camera
//! intrinsics from board observations.

pub mod board;
pub mod calibration;
pub mod camera;

#[allow(missing_docs)]
pub mod error;

pub mod image;
pub mod observation;
pub mod transform;

pub use error::Error;

pub mod prelude {
    pub use crate::board::{BACKGROUND, BoardDescriptor, BoardGenerator, BorderStyle};
    pub use crate::calibration::{
        CalibrationConfig, CalibrationError, CalibrationReport, CalibrationState,
        IntrinsicCalibration, ResidualStats, Termination,
    };
    pub use crate::camera::{CameraError, CameraModel, EnhancedUnified, Pinhole};
    pub use crate::error::Error;
    pub use crate::image::MonoImage;
    pub use crate::observation::{Correspondence, Observation, ObservationSource, SyntheticSource};
    pub use crate::transform::Transform;
}
