// ============================================================
// Layer 4 — Image Loader
// ============================================================
// Loads images with the `image` crate, from either a single
// file or every supported file in a directory (sorted by name,
// so output order is stable).
//
// A missing path yields an empty corpus and a warning; a file
// that fails to decode is skipped with a warning.

use anyhow::{Context, Result};
use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::data::preprocessor::Preprocessor;
use crate::domain::image_sample::ImageSample;
use crate::domain::traits::ImageSource;

const EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "bmp"];

pub struct ImageLoader {
    path:         PathBuf,
    preprocessor: Preprocessor,
}

impl ImageLoader {
    pub fn new(path: impl Into<PathBuf>, preprocessor: Preprocessor) -> Self {
        Self { path: path.into(), preprocessor }
    }

    /// Sorted list of the image files this loader would read.
    pub fn files(&self) -> Result<Vec<PathBuf>> {
        if self.path.is_file() {
            return Ok(vec![self.path.clone()]);
        }
        if !self.path.exists() {
            tracing::warn!(
                "Input path '{}' does not exist — returning empty corpus",
                self.path.display()
            );
            return Ok(Vec::new());
        }

        let mut files = Vec::new();
        for entry in fs::read_dir(&self.path)
            .with_context(|| format!("Cannot read directory '{}'", self.path.display()))?
        {
            let path = entry?.path();
            if path.is_file() && is_image(&path) {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }

    fn load_one(&self, path: &Path) -> Result<ImageSample> {
        let image = image::open(path)
            .with_context(|| format!("Cannot decode image '{}'", path.display()))?;
        let source = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("unknown")
            .to_string();
        Ok(self.preprocessor.process(source, &image))
    }
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

impl ImageSource for ImageLoader {
    fn load_all(&self) -> Result<Vec<ImageSample>> {
        let mut samples = Vec::new();
        for path in self.files()? {
            match self.load_one(&path) {
                Ok(sample) => {
                    tracing::debug!("Loaded: {} ({}x{})", sample.source, sample.height, sample.width);
                    samples.push(sample);
                }
                // one bad file should not sink the whole run
                Err(e) => tracing::warn!("Skipping '{}': {:#}", path.display(), e),
            }
        }
        tracing::info!("Loaded {} images from '{}'", samples.len(), self.path.display());
        Ok(samples)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma};

    #[test]
    fn test_loads_sorted_images_and_skips_others() {
        let dir = tempfile::tempdir().unwrap();
        GrayImage::from_pixel(20, 10, Luma([0])).save(dir.path().join("b.png")).unwrap();
        GrayImage::from_pixel(10, 10, Luma([0])).save(dir.path().join("a.png")).unwrap();
        fs::write(dir.path().join("notes.txt"), "not an image").unwrap();
        fs::write(dir.path().join("broken.png"), "not a png either").unwrap();

        let loader  = ImageLoader::new(dir.path(), Preprocessor::new(8, 32).with_pad(false));
        let samples = loader.load_all().unwrap();

        let names: Vec<&str> = samples.iter().map(|s| s.source.as_str()).collect();
        assert_eq!(names, vec!["a.png", "b.png"]);
        assert_eq!(samples[1].shape(), (8, 16));
    }

    #[test]
    fn test_single_file_path() {
        let dir  = tempfile::tempdir().unwrap();
        let file = dir.path().join("word.png");
        GrayImage::from_pixel(4, 4, Luma([9])).save(&file).unwrap();
        let samples = ImageLoader::new(&file, Preprocessor::new(4, 4)).load_all().unwrap();
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].pixel(0, 0), 9.0);
    }

    #[test]
    fn test_missing_directory_is_empty() {
        let loader = ImageLoader::new("/definitely/not/here", Preprocessor::default());
        assert!(loader.load_all().unwrap().is_empty());
    }
}
