// slicekit/src/processors/resizer.rs
use crate::core::{Image, ResizeAlgorithm, ResizeSpec, Result, SliceKitError, MAX_PIXELS};
use image::imageops::FilterType;

pub struct Resizer {
    max_dimension: u32,
    max_pixels: u64,
}

impl Resizer {
    pub fn new(max_dimension: u32) -> Self {
        Self {
            max_dimension,
            max_pixels: MAX_PIXELS,
        }
    }

    pub fn with_max_pixels(mut self, max_pixels: u64) -> Self {
        self.max_pixels = max_pixels;
        self
    }

    /// Scales `image` to `spec.width`, keeping the aspect ratio. DPI is carried over untouched.
    pub fn resize(&self, image: &Image, spec: &ResizeSpec) -> Result<Image> {
        spec.validate(self.max_dimension)?;

        let (width, height) = Self::calculate_dimensions(image.dimensions(), spec.width);
        self.check_target(width, height)?;

        if width == image.width() && height == image.height() {
            log::debug!("Image dimensions unchanged, skipping resize");
            return Ok(image.clone());
        }

        log::debug!(
            "Resizing image from {}x{} to {}x{} with {}",
            image.width(),
            image.height(),
            width,
            height,
            spec.algorithm
        );

        let filter = Self::filter_type(spec.algorithm);
        let pixels = image.pixels().resize_exact(width, height, filter);

        Ok(image.with_pixels(pixels))
    }

    /// Target size for a width-driven resize: height is rounded and never below one pixel.
    /// Heights beyond `u32::MAX` saturate; `resize` rejects them against its limits.
    pub fn calculate_dimensions((orig_width, orig_height): (u32, u32), width: u32) -> (u32, u32) {
        if width == 0 || width == orig_width || orig_width == 0 {
            return (orig_width, orig_height);
        }

        let ratio = width as f64 / orig_width as f64;
        let height = (orig_height as f64 * ratio).round().min(u32::MAX as f64) as u32;
        (width, height.max(1))
    }

    fn check_target(&self, width: u32, height: u32) -> Result<()> {
        if height > self.max_dimension {
            return Err(SliceKitError::MemoryLimitExceeded(format!(
                "Resized height {} exceeds maximum {}",
                height, self.max_dimension
            )));
        }

        let pixels = width as u64 * height as u64;
        if pixels > self.max_pixels {
            return Err(SliceKitError::MemoryLimitExceeded(format!(
                "Resized image {}x{} has {} pixels, limit is {}",
                width, height, pixels, self.max_pixels
            )));
        }
        Ok(())
    }

    fn filter_type(algorithm: ResizeAlgorithm) -> FilterType {
        match algorithm {
            ResizeAlgorithm::Nearest => FilterType::Nearest,
            ResizeAlgorithm::Bilinear => FilterType::Triangle,
            ResizeAlgorithm::Bicubic => FilterType::CatmullRom,
            ResizeAlgorithm::Lanczos3 => FilterType::Lanczos3,
        }
    }
}

impl Default for Resizer {
    fn default() -> Self {
        Self::new(100_000)
    }
}
