//! Planar checkerboard calibration targets.

use crate::error::Error;
use nalgebra::Vector3;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

mod generator;

pub use generator::{BACKGROUND, BoardGenerator};

/// How the outermost ring of cells is drawn.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum BorderStyle {
    /// Every border cell is background, leaving a uniform white margin.
    #[default]
    Uniform,

    /// Only light border cells are background, dark border cells stay dark.
    ///
    /// This produces an X-junction at every `(i, j)` grid node with `i < nx`
    /// and `j < ny`.
    Checkered,
}

/// Geometry of a checkerboard lying in the `z = 0` plane of its own frame.
///
/// Cells are indexed by `cx = ceil(x / cell_size)` and `cy = ceil(y / cell_size)`.
/// The board spans `(-cell_size, nx * cell_size)` along x and
/// `(-cell_size, ny * cell_size)` along y, and cells with index `0`, `nx` or `ny`
/// form its border.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BoardDescriptor {
    nx: usize,
    ny: usize,
    cell_size: f64,
    border: BorderStyle,
}

impl BoardDescriptor {
    pub fn new(nx: usize, ny: usize, cell_size: f64) -> Result<Self, Error> {
        if nx < 2 || ny < 2 {
            return Err(Error::InvalidInput(format!(
                "board needs at least 2x2 cells but got {nx}x{ny}"
            )));
        }

        if !cell_size.is_finite() || cell_size <= 0.0 {
            return Err(Error::InvalidInput(format!(
                "cell size must be positive but got {cell_size}"
            )));
        }

        Ok(Self {
            nx,
            ny,
            cell_size,
            border: BorderStyle::default(),
        })
    }

    pub fn with_border(mut self, border: BorderStyle) -> Self {
        self.border = border;
        self
    }

    pub fn nx(&self) -> usize {
        self.nx
    }

    pub fn ny(&self) -> usize {
        self.ny
    }

    pub fn cell_size(&self) -> f64 {
        self.cell_size
    }

    pub fn border(&self) -> BorderStyle {
        self.border
    }

    /// Returns the X-junctions of the pattern in the board frame.
    ///
    /// Points are ordered row major (y major).
    pub fn corners(&self) -> Vec<Vector3<f64>> {
        let (xs, ys) = match self.border {
            BorderStyle::Checkered => (0..self.nx, 0..self.ny),
            BorderStyle::Uniform => (1..self.nx - 1, 1..self.ny - 1),
        };

        ys.flat_map(|j| {
            xs.clone().map(move |i| {
                Vector3::new(
                    i as f64 * self.cell_size,
                    j as f64 * self.cell_size,
                    0.0,
                )
            })
        })
        .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(BorderStyle::Checkered, 48)]
    #[case(BorderStyle::Uniform, 24)]
    fn corner_count(#[case] border: BorderStyle, #[case] count: usize) {
        let board = BoardDescriptor::new(8, 6, 0.1).unwrap().with_border(border);
        assert_eq!(board.corners().len(), count);
    }

    #[test]
    fn corners_are_row_major() {
        let board = BoardDescriptor::new(3, 2, 0.5)
            .unwrap()
            .with_border(BorderStyle::Checkered);
        let corners = board.corners();
        assert_eq!(corners[1], Vector3::new(0.5, 0.0, 0.0));
        assert_eq!(corners[3], Vector3::new(0.0, 0.5, 0.0));
    }

    #[rstest]
    #[case(1, 6, 0.1)]
    #[case(8, 0, 0.1)]
    #[case(8, 6, 0.0)]
    #[case(8, 6, f64::INFINITY)]
    fn rejects_invalid_board(#[case] nx: usize, #[case] ny: usize, #[case] cell_size: f64) {
        assert!(matches!(
            BoardDescriptor::new(nx, ny, cell_size),
            Err(Error::InvalidInput(_))
        ));
    }
}
