// ============================================================
// Layer 4 — Image Preprocessor
// ============================================================
// Brings arbitrary images to the shape the CNN expects:
//
//   1. Convert to 8-bit grayscale
//   2. Resize to the target height, keeping aspect ratio
//   3. Cap the width at max_width (never below 1 column)
//   4. Optionally right-pad with white up to max_width so every
//      image in a corpus can share one batch
//
// Pixel values stay in 0..=255; normalisation happens inside
// the network.

use image::{imageops::FilterType, DynamicImage, GrayImage};

use crate::domain::image_sample::ImageSample;

const PAD_VALUE: f32 = 255.0;

#[derive(Debug, Clone)]
pub struct Preprocessor {
    pub height:    usize,
    pub max_width: usize,
    pub pad:       bool,
}

impl Preprocessor {
    pub fn new(height: usize, max_width: usize) -> Self {
        Self { height, max_width, pad: true }
    }

    pub fn with_pad(mut self, pad: bool) -> Self {
        self.pad = pad;
        self
    }

    /// Width after aspect-preserving resize, capped at max_width.
    pub fn target_width(&self, src_height: u32, src_width: u32) -> usize {
        if src_height == 0 {
            return 1;
        }
        let scaled = (src_width as f64 * self.height as f64 / src_height as f64).round() as usize;
        scaled.clamp(1, self.max_width.max(1))
    }

    pub fn process(&self, source: impl Into<String>, image: &DynamicImage) -> ImageSample {
        let gray  = image.to_luma8();
        let width = self.target_width(gray.height(), gray.width());

        let resized: GrayImage = if gray.dimensions() == (width as u32, self.height as u32) {
            gray
        } else {
            image::imageops::resize(&gray, width as u32, self.height as u32, FilterType::Triangle)
        };

        let out_width = if self.pad { self.max_width.max(width) } else { width };
        let mut pixels = Vec::with_capacity(self.height * out_width);
        for row in resized.rows() {
            pixels.extend(row.map(|p| p.0[0] as f32));
            pixels.extend(std::iter::repeat(PAD_VALUE).take(out_width - width));
        }

        ImageSample::new(source, self.height, out_width, pixels)
    }
}

impl Default for Preprocessor {
    fn default() -> Self {
        Self::new(32, 256)
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn gray(w: u32, h: u32, v: u8) -> DynamicImage {
        DynamicImage::ImageLuma8(GrayImage::from_pixel(w, h, Luma([v])))
    }

    #[test]
    fn test_resize_keeps_aspect_ratio() {
        let p = Preprocessor::new(32, 256).with_pad(false);
        let s = p.process("a", &gray(100, 64, 0));
        assert_eq!(s.shape(), (32, 50));
    }

    #[test]
    fn test_width_is_capped() {
        let p = Preprocessor::new(32, 40).with_pad(false);
        assert_eq!(p.target_width(32, 1000), 40);
        // a tall sliver still keeps one column
        assert_eq!(p.target_width(1000, 1), 1);
    }

    #[test]
    fn test_padding_fills_with_white() {
        let p = Preprocessor::new(4, 10);
        let s = p.process("a", &gray(4, 4, 0));
        assert_eq!(s.shape(), (4, 10));
        assert_eq!(s.pixel(0, 3), 0.0);
        assert_eq!(s.pixel(3, 4), 255.0);
        assert_eq!(s.pixel(2, 9), 255.0);
    }

    #[test]
    fn test_color_is_converted_to_gray() {
        let rgb = DynamicImage::ImageRgb8(image::RgbImage::from_pixel(8, 8, image::Rgb([200, 200, 200])));
        let s   = Preprocessor::new(8, 8).process("c", &rgb);
        assert!(s.pixels.iter().all(|&v| (v - 200.0).abs() < 1.0));
    }
}
