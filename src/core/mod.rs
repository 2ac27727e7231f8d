// slicekit/src/core/mod.rs
pub mod plan;
pub mod processor;

use image::{ColorType, DynamicImage, ImageFormat};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;

pub use plan::{CutPlan, MergeOrder, ResizeSpec, SliceNaming};
pub use processor::Pipeline;

/// Largest canvas the merger will build, in pixels.
pub const MAX_PIXELS: u64 = (1 << 31) - 1;

const MIB: u64 = 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResizeAlgorithm {
    Nearest,
    Bilinear,
    Bicubic,
    Lanczos3,
}

impl FromStr for ResizeAlgorithm {
    type Err = SliceKitError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "nearest" => Ok(Self::Nearest),
            "bilinear" | "fast" => Ok(Self::Bilinear),
            "bicubic" | "standard" => Ok(Self::Bicubic),
            "lanczos" | "lanczos3" | "high" => Ok(Self::Lanczos3),
            other => Err(SliceKitError::InvalidParameter(format!(
                "Unknown resize filter: {}",
                other
            ))),
        }
    }
}

impl fmt::Display for ResizeAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Nearest => "nearest",
            Self::Bilinear => "bilinear",
            Self::Bicubic => "bicubic",
            Self::Lanczos3 => "lanczos3",
        };
        f.write_str(name)
    }
}

/// JPEG quality presets. PNG output is always lossless.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quality {
    Lossless,
    High,
    Medium,
    Low,
    Custom(u8),
}

impl Quality {
    pub fn jpeg_quality(self) -> u8 {
        match self {
            Self::Lossless => 100,
            Self::High => 95,
            Self::Medium => 85,
            Self::Low => 70,
            Self::Custom(q) => q.clamp(1, 100),
        }
    }

    /// Whether chroma is stored at full resolution (4:4:4).
    pub fn full_chroma(self) -> bool {
        matches!(self, Self::Lossless | Self::High)
    }
}

impl Default for Quality {
    fn default() -> Self {
        Self::Medium
    }
}

impl FromStr for Quality {
    type Err = SliceKitError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "lossless" => Ok(Self::Lossless),
            "high" => Ok(Self::High),
            "medium" => Ok(Self::Medium),
            "low" => Ok(Self::Low),
            other => match other.parse::<u8>() {
                Ok(q) if (1..=100).contains(&q) => Ok(Self::Custom(q)),
                _ => Err(SliceKitError::InvalidParameter(format!(
                    "Quality must be lossless, high, medium, low or 1-100, got: {}",
                    s
                ))),
            },
        }
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Lossless => f.write_str("lossless"),
            Self::High => f.write_str("high"),
            Self::Medium => f.write_str("medium"),
            Self::Low => f.write_str("low"),
            Self::Custom(q) => write!(f, "{}", q),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Jpeg,
    Png,
}

impl OutputFormat {
    pub fn extension(self) -> &'static str {
        match self {
            Self::Jpeg => "jpg",
            Self::Png => "png",
        }
    }
}

/// Dots per inch along each axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dpi {
    pub x: u32,
    pub y: u32,
}

impl Dpi {
    pub const fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }

    pub fn from_pixels_per_meter(x: u32, y: u32) -> Self {
        Self {
            x: (x as f64 * 0.0254).round() as u32,
            y: (y as f64 * 0.0254).round() as u32,
        }
    }

    pub fn from_dots_per_cm(x: f64, y: f64) -> Self {
        Self {
            x: (x * 2.54).round() as u32,
            y: (y * 2.54).round() as u32,
        }
    }

    pub fn to_pixels_per_meter(self) -> (u32, u32) {
        (
            (self.x as f64 / 0.0254).round() as u32,
            (self.y as f64 / 0.0254).round() as u32,
        )
    }
}

impl fmt::Display for Dpi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{} dpi", self.x, self.y)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    Raster(ImageFormat),
    Psd,
}

impl fmt::Display for SourceFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Raster(format) => f.write_str(&crate::utils::image_format_to_string(*format)),
            Self::Psd => f.write_str("PSD"),
        }
    }
}

/// A decoded image plus the metadata the pipeline carries between steps.
///
/// Operations never mutate an `Image`; they return a new one.
#[derive(Debug, Clone)]
pub struct Image {
    pixels: DynamicImage,
    dpi: Option<Dpi>,
    source_format: Option<SourceFormat>,
}

impl Image {
    pub fn new(pixels: DynamicImage, dpi: Option<Dpi>, source_format: Option<SourceFormat>) -> Self {
        Self {
            pixels,
            dpi,
            source_format,
        }
    }

    pub fn from_pixels(pixels: DynamicImage) -> Self {
        Self::new(pixels, None, None)
    }

    /// New pixels, same metadata.
    pub fn with_pixels(&self, pixels: DynamicImage) -> Self {
        Self::new(pixels, self.dpi, self.source_format)
    }

    pub fn with_dpi(mut self, dpi: Option<Dpi>) -> Self {
        self.dpi = dpi;
        self
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width(), self.height())
    }

    pub fn color(&self) -> ColorType {
        self.pixels.color()
    }

    pub fn dpi(&self) -> Option<Dpi> {
        self.dpi
    }

    pub fn source_format(&self) -> Option<SourceFormat> {
        self.source_format
    }

    pub fn pixels(&self) -> &DynamicImage {
        &self.pixels
    }

    pub fn into_pixels(self) -> DynamicImage {
        self.pixels
    }
}

/// Cooperative cancellation flag, checked between files and between merge sources.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(SliceKitError::Cancelled)
        } else {
            Ok(())
        }
    }
}

#[derive(Debug, Clone)]
pub struct ImageMetadata {
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
    pub format: String,
    pub color: Option<ColorType>,
    pub dpi: Option<Dpi>,
    pub file_size: u64,
}

#[derive(Debug, Clone)]
pub struct ProcessConfig {
    pub quality: Quality,
    pub format: OutputFormat,
    pub optimize_png: bool,
    /// Embedded in resized output when the source carries no DPI.
    pub default_dpi: Option<Dpi>,
    pub max_dimension: u32,
    pub max_pixels: u64,
    /// Estimated RGBA bytes above which merges stream to disk.
    pub streaming_threshold: u64,
    pub max_psd_bytes: u64,
    /// JPEG has no alpha; transparent pixels are flattened onto this.
    pub background: [u8; 3],
}

impl Default for ProcessConfig {
    fn default() -> Self {
        Self {
            quality: Quality::Medium,
            format: OutputFormat::Jpeg,
            optimize_png: false,
            default_dpi: Some(Dpi::new(300, 300)),
            max_dimension: 100_000,
            max_pixels: MAX_PIXELS,
            streaming_threshold: 1000 * MIB,
            max_psd_bytes: 2048 * MIB,
            background: [255, 255, 255],
        }
    }
}

impl ProcessConfig {
    pub fn validate(&self) -> Result<()> {
        if let Quality::Custom(q) = self.quality {
            if q == 0 || q > 100 {
                return Err(SliceKitError::InvalidParameter(
                    "Quality must be between 1 and 100".to_string(),
                ));
            }
        }

        if self.max_dimension == 0 || self.max_dimension > 100_000 {
            return Err(SliceKitError::InvalidParameter(
                "Maximum dimension must be between 1 and 100,000 pixels".to_string(),
            ));
        }

        if self.max_pixels == 0 {
            return Err(SliceKitError::InvalidParameter(
                "Pixel limit must be positive".to_string(),
            ));
        }

        if let Some(dpi) = self.default_dpi {
            if dpi.x == 0 || dpi.y == 0 || dpi.x > u16::MAX as u32 || dpi.y > u16::MAX as u32 {
                return Err(SliceKitError::InvalidParameter(format!(
                    "Default DPI out of range: {}",
                    dpi
                )));
            }
        }

        Ok(())
    }
}

#[derive(Error, Debug)]
pub enum SliceKitError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Failed to decode {}: {reason}", .path.display())]
    Decode { path: PathBuf, reason: String },

    #[error("Encoding error: {0}")]
    Encode(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Invalid cut plan: {0}")]
    InvalidCutPlan(String),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Processing error: {0}")]
    ProcessingError(String),

    #[error("Memory limit exceeded: {0}")]
    MemoryLimitExceeded(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Configuration error: {0}")]
    Config(String),
}

impl SliceKitError {
    pub fn decode<E: fmt::Display>(path: impl Into<PathBuf>, e: E) -> Self {
        SliceKitError::Decode {
            path: path.into(),
            reason: e.to_string(),
        }
    }

    pub fn encode<E: fmt::Display>(e: E) -> Self {
        SliceKitError::Encode(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SliceKitError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quality_presets_map_to_jpeg_settings() {
        assert_eq!(Quality::Lossless.jpeg_quality(), 100);
        assert!(Quality::High.full_chroma());
        assert!(!Quality::Medium.full_chroma());
        assert_eq!(Quality::Low.jpeg_quality(), 70);
        assert_eq!("92".parse::<Quality>().unwrap(), Quality::Custom(92));
        assert!("0".parse::<Quality>().is_err());
        assert!("best".parse::<Quality>().is_err());
    }

    #[test]
    fn dpi_unit_conversions() {
        // 11811 px/m is the usual encoding of 300 dpi
        assert_eq!(Dpi::from_pixels_per_meter(11811, 11811), Dpi::new(300, 300));
        assert_eq!(Dpi::new(300, 300).to_pixels_per_meter(), (11811, 11811));
        assert_eq!(Dpi::from_dots_per_cm(28.35, 28.35), Dpi::new(72, 72));
    }

    #[test]
    fn default_config_is_valid() {
        assert!(ProcessConfig::default().validate().is_ok());

        let config = ProcessConfig {
            default_dpi: Some(Dpi::new(0, 300)),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn filter_names_parse() {
        assert_eq!("Lanczos".parse::<ResizeAlgorithm>().unwrap(), ResizeAlgorithm::Lanczos3);
        assert_eq!("standard".parse::<ResizeAlgorithm>().unwrap(), ResizeAlgorithm::Bicubic);
        assert!("sinc".parse::<ResizeAlgorithm>().is_err());
    }
}
