use super::{BoardDescriptor, BorderStyle};
use crate::{camera::CameraModel, image::MonoImage, transform::Transform};
use nalgebra::{Vector2, Vector3};
use rayon::prelude::*;
use std::f64::consts::FRAC_PI_2;

/// Value of pixels that do not see the pattern.
pub const BACKGROUND: u8 = 255;

/// Brightness at a cell edge, from which light cells rise and dark cells fall.
const EDGE_LEVEL: f64 = 180.0;

/// Renders anti-aliased images of a checkerboard as seen by a camera.
#[derive(Debug)]
pub struct BoardGenerator {
    camera: Box<dyn CameraModel>,
    board: BoardDescriptor,
    out_of_view: u8,
}

/// Board axes and origin expressed in the camera frame.
struct BoardFrame {
    ex: Vector3<f64>,
    ey: Vector3<f64>,
    ez: Vector3<f64>,
    origin: Vector3<f64>,
    lambda_num: f64,
}

impl BoardGenerator {
    /// Creates a generator that owns a copy of `camera`.
    pub fn new(camera: &dyn CameraModel, board: BoardDescriptor) -> Self {
        Self {
            camera: camera.clone_model(),
            board,
            out_of_view: BACKGROUND,
        }
    }

    /// Sets the value of pixels the camera cannot reconstruct.
    ///
    /// Defaults to [`BACKGROUND`]. Use `0` to draw the black surround of a
    /// fisheye image circle.
    pub fn with_out_of_view(mut self, value: u8) -> Self {
        self.out_of_view = value;
        self
    }

    pub fn camera(&self) -> &dyn CameraModel {
        self.camera.as_ref()
    }

    pub fn board(&self) -> &BoardDescriptor {
        &self.board
    }

    /// Renders the board placed at `pose` (board frame to camera frame).
    pub fn generate(&self, pose: &Transform) -> MonoImage {
        let width = self.camera.width();
        let height = self.camera.height();
        let rot = pose.rot_mat();
        let frame = BoardFrame {
            ex: rot.column(0).into_owned(),
            ey: rot.column(1).into_owned(),
            ez: rot.column(2).into_owned(),
            origin: pose.trans(),
            lambda_num: pose.trans().dot(&rot.column(2)),
        };

        let mut image = MonoImage::new(width, height, BACKGROUND);
        image
            .as_raw_mut()
            .par_chunks_exact_mut(width)
            .enumerate()
            .for_each(|(row, pixels)| {
                for (col, value) in pixels.iter_mut().enumerate() {
                    *value = self.shade(&Vector2::new(col as f64, row as f64), &frame);
                }
            });

        image
    }

    fn shade(&self, pixel: &Vector2<f64>, frame: &BoardFrame) -> u8 {
        let Some(dir) = self.camera.reconstruct_point(pixel) else {
            return self.out_of_view;
        };

        let lambda = frame.lambda_num / dir.dot(&frame.ez);
        if !lambda.is_finite() || lambda < 0.0 {
            return BACKGROUND;
        }

        let v = dir * lambda - frame.origin;
        let x = v.dot(&frame.ex);
        let y = v.dot(&frame.ey);

        // Board units covered by one pixel at this depth, from the length of
        // each board axis projected onto the image plane.
        let width = self.camera.width() as f64;
        let smooth_x = FRAC_PI_2 * lambda / (frame.ex.xy().norm() * width);
        let smooth_y = FRAC_PI_2 * lambda / (frame.ey.xy().norm() * width);

        self.brightness(x, y, smooth_x.min(smooth_y))
    }

    /// Brightness of the board at `(x, y)` in the board frame.
    ///
    /// `smooth` is the width of the transition ramp across cell edges in board
    /// units.
    pub fn brightness(&self, x: f64, y: f64, smooth: f64) -> u8 {
        let cell_size = self.board.cell_size();
        let nx = self.board.nx() as i64;
        let ny = self.board.ny() as i64;

        if x <= -cell_size || x >= nx as f64 * cell_size {
            return BACKGROUND;
        }
        if y <= -cell_size || y >= ny as f64 * cell_size {
            return BACKGROUND;
        }

        let x_rel = x / cell_size;
        let y_rel = y / cell_size;
        let cx = x_rel.ceil() as i64;
        let cy = y_rel.ceil() as i64;
        let delta = (x_rel - x_rel.round())
            .abs()
            .min((y_rel - y_rel.round()).abs());
        let ramp = delta * cell_size / smooth;
        let on_border = cx == 0 || cy == 0 || cx == nx || cy == ny;

        if cx.rem_euclid(2) == cy.rem_euclid(2) {
            match on_border {
                true => BACKGROUND,
                false => (EDGE_LEVEL * (1.0 + ramp)).min(255.0) as u8,
            }
        } else {
            match on_border && self.board.border() == BorderStyle::Uniform {
                true => BACKGROUND,
                false => (EDGE_LEVEL * (1.0 - ramp)).max(0.0) as u8,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::{EnhancedUnified, Pinhole};
    use rstest::rstest;

    const CELL: f64 = 0.1;

    fn board(border: BorderStyle) -> BoardDescriptor {
        BoardDescriptor::new(8, 6, CELL).unwrap().with_border(border)
    }

    /// Frontal camera looking at the board so that board point `(x, y)`
    /// appears at pixel `(400 x + 60, 400 y + 50)`.
    fn frontal() -> (Pinhole, Transform) {
        (
            Pinhole::new(400, 300, [400.0, 400.0, 200.0, 150.0]).unwrap(),
            Transform::new(-0.35, -0.25, 1.0, 0.0, 0.0, 0.0),
        )
    }

    fn generator(border: BorderStyle) -> BoardGenerator {
        let (camera, _) = frontal();
        BoardGenerator::new(&camera, board(border))
    }

    #[rstest]
    #[case(1, 1, true)]
    #[case(2, 2, true)]
    #[case(3, 1, true)]
    #[case(1, 2, false)]
    #[case(2, 1, false)]
    #[case(4, 3, false)]
    fn checkerboard_parity(#[case] cx: i32, #[case] cy: i32, #[case] light: bool) {
        let generator = generator(BorderStyle::Uniform);
        // Close to a cell edge so that light cells do not saturate.
        let x = (cx as f64 - 0.95) * CELL;
        let y = (cy as f64 - 0.5) * CELL;
        let value = generator.brightness(x, y, 0.05);
        assert_eq!(value > EDGE_LEVEL as u8, light, "value {value}");
        assert_ne!(value, BACKGROUND);
    }

    #[rstest]
    #[case(-0.1, 0.25)]
    #[case(-0.2, 0.25)]
    #[case(0.8, 0.25)]
    #[case(0.35, -0.1)]
    #[case(0.35, 0.65)]
    #[case(0.35, 1e3)]
    fn outside_board_is_background(#[case] x: f64, #[case] y: f64) {
        for border in [BorderStyle::Uniform, BorderStyle::Checkered] {
            assert_eq!(generator(border).brightness(x, y, 0.01), BACKGROUND);
        }
    }

    #[test]
    fn border_style() {
        // Cell (0, 1) is dark by parity and lies on the border.
        let (x, y) = (-0.5 * CELL, 0.5 * CELL);
        assert_eq!(
            generator(BorderStyle::Uniform).brightness(x, y, 0.01),
            BACKGROUND
        );
        assert_eq!(generator(BorderStyle::Checkered).brightness(x, y, 0.01), 0);

        // Cell (0, 0) is light and always background.
        let (x, y) = (-0.5 * CELL, -0.5 * CELL);
        assert_eq!(
            generator(BorderStyle::Checkered).brightness(x, y, 0.01),
            BACKGROUND
        );
    }

    #[test]
    fn ramp_is_sharper_for_smaller_smoothing() {
        let generator = generator(BorderStyle::Uniform);
        let (x, y) = (1.02 * CELL, 1.5 * CELL);
        let blurred = generator.brightness(x, y, 0.02);
        let sharp = generator.brightness(x, y, 0.005);
        assert!(sharp > blurred);
    }

    #[test]
    fn frontal_render() {
        let (camera, pose) = frontal();
        let image = BoardGenerator::new(&camera, board(BorderStyle::Uniform)).generate(&pose);

        assert_eq!(image.dimensions(), (400, 300));
        // Cell centers, (col, row) = (400 x + 60, 400 y + 50).
        assert_eq!(image.get(70, 80), Some(255));
        assert_eq!(image.get(110, 120), Some(255));
        assert_eq!(image.get(110, 80), Some(0));
        assert_eq!(image.get(70, 120), Some(0));
        // Outside the board.
        assert_eq!(image.get(0, 0), Some(BACKGROUND));
    }

    #[test]
    fn board_rotated_about_its_normal() {
        // Board point `(x, y)` appears at pixel `(300 - 400 y, 400 x + 10)`.
        let (camera, _) = frontal();
        let pose = Transform::new(0.25, -0.35, 1.0, 0.0, 0.0, FRAC_PI_2);
        let image = BoardGenerator::new(&camera, board(BorderStyle::Uniform)).generate(&pose);

        // Centers of cells (2, 2) and (3, 2).
        assert_eq!(image.get(70, 240), Some(255));
        assert_eq!(image.get(110, 240), Some(0));
        let dark = image.as_raw().iter().filter(|&&value| value == 0).count();
        assert!(dark > 5000, "{dark} dark pixels");
    }

    #[test]
    fn board_behind_camera_is_background() {
        let (camera, _) = frontal();
        let pose = Transform::new(-0.35, -0.25, -1.0, 0.0, 0.0, 0.0);
        let image = BoardGenerator::new(&camera, board(BorderStyle::Uniform)).generate(&pose);
        assert!(image.as_raw().iter().all(|&value| value == BACKGROUND));
    }

    #[test]
    fn out_of_view_value() {
        // A strongly distorted camera cannot reconstruct the image corners.
        let camera =
            EnhancedUnified::new(640, 480, [0.9, 1.0, 150.0, 150.0, 320.0, 240.0]).unwrap();
        let pose = Transform::new(-0.35, -0.25, 0.5, 0.0, 0.0, 0.0);
        let image = BoardGenerator::new(&camera, board(BorderStyle::Uniform))
            .with_out_of_view(0)
            .generate(&pose);
        assert_eq!(image.get(0, 0), Some(0));
        assert!(image.as_raw().iter().any(|&value| value == BACKGROUND));
    }

    #[test]
    fn rendering_is_deterministic() {
        let camera =
            EnhancedUnified::new(320, 240, [0.6, 1.1, 200.0, 200.0, 160.0, 120.0]).unwrap();
        let generator = BoardGenerator::new(&camera, board(BorderStyle::Checkered));
        let pose = Transform::new(-0.3, -0.2, 0.8, 0.2, -0.3, 0.1);

        let first = generator.generate(&pose);
        let second = generator.generate(&pose);
        assert_eq!(first, second);
        assert!(first.as_raw().iter().any(|&value| value < EDGE_LEVEL as u8));
    }
}
