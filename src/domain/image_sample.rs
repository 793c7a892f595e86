// ============================================================
// Layer 3 — ImageSample Domain Type
// ============================================================
// A single grayscale image after preprocessing.
// Pixels are stored row-major as f32 in the raw 0..=255 range;
// the network performs its own (x - 128) / 128 normalisation.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageSample {
    /// File name the image was read from
    pub source: String,
    pub height: usize,
    pub width:  usize,
    /// Row-major pixel intensities, `height * width` values
    pub pixels: Vec<f32>,
}

impl ImageSample {
    pub fn new(source: impl Into<String>, height: usize, width: usize, pixels: Vec<f32>) -> Self {
        debug_assert_eq!(pixels.len(), height * width);
        Self { source: source.into(), height, width, pixels }
    }

    /// A uniformly white image, handy as a padding or smoke-test input.
    pub fn blank(source: impl Into<String>, height: usize, width: usize) -> Self {
        Self::new(source, height, width, vec![255.0; height * width])
    }

    /// (height, width) — samples are only batchable when these match.
    pub fn shape(&self) -> (usize, usize) {
        (self.height, self.width)
    }

    pub fn pixel(&self, row: usize, col: usize) -> f32 {
        self.pixels[row * self.width + col]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pixel_is_row_major() {
        let s = ImageSample::new("a.png", 2, 3, vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0]);
        assert_eq!(s.pixel(0, 2), 2.0);
        assert_eq!(s.pixel(1, 0), 3.0);
        assert_eq!(s.shape(), (2, 3));
    }

    #[test]
    fn test_blank_is_white() {
        let s = ImageSample::blank("blank", 4, 4);
        assert!(s.pixels.iter().all(|&p| p == 255.0));
    }
}
