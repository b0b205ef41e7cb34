use crate::error::Error;

/// A single channel 8-bit image.
///
/// Pixels are stored row by row.
///
/// ```text
/// +--------+--------+-----+--------+
/// |      0 |      1 | ... |    w-1 |
/// +--------+--------+-----+--------+
/// |      w |    w+1 | ... |   2w-1 |
/// +--------+--------+-----+--------+
/// |    ... |
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MonoImage {
    width: usize,
    height: usize,
    data: Vec<u8>,
}

impl MonoImage {
    /// Creates an image where every pixel holds `fill`.
    pub fn new(width: usize, height: usize, fill: u8) -> Self {
        Self {
            width,
            height,
            data: vec![fill; width * height],
        }
    }

    /// Wraps a row major buffer of `width * height` bytes.
    pub fn from_raw(width: usize, height: usize, data: Vec<u8>) -> Result<Self, Error> {
        if data.len() != width * height {
            return Err(Error::InvalidInput(format!(
                "expected {} bytes for a {width}x{height} image but got {}",
                width * height,
                data.len()
            )));
        }

        Ok(Self {
            width,
            height,
            data,
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Returns `(width, height)`.
    pub fn dimensions(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    /// Returns the value at `(row, col)` or `None` outside the image.
    pub fn get(&self, row: usize, col: usize) -> Option<u8> {
        if row >= self.height || col >= self.width {
            return None;
        }
        self.data.get(row * self.width + col).copied()
    }

    pub fn as_raw(&self) -> &[u8] {
        &self.data
    }

    pub fn into_raw(self) -> Vec<u8> {
        self.data
    }

    pub(crate) fn as_raw_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }
}
