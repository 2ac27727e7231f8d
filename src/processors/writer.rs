// slicekit/src/processors/writer.rs
use crate::core::{Dpi, Image, OutputFormat, ProcessConfig, Quality, Result, SliceKitError};
use image::{DynamicImage, RgbImage, RgbaImage};
use jpeg_encoder::{ColorType as JpegColor, Density, Encoder as JpegEncoder, SamplingFactor};
use oxipng::{optimize_from_memory, Options};
use std::fs::File;
use std::io::{BufWriter, Cursor, Write};
use std::path::{Path, PathBuf};

/// Largest width or height a baseline JPEG can describe.
pub const JPEG_MAX_DIMENSION: u32 = u16::MAX as u32;

/// Encodes images as JPEG or PNG with embedded DPI.
pub struct ImageWriter {
    quality: Quality,
    format: OutputFormat,
    optimize_png: bool,
    background: [u8; 3],
}

impl ImageWriter {
    pub fn new(quality: Quality, format: OutputFormat) -> Self {
        Self {
            quality,
            format,
            optimize_png: false,
            background: [255, 255, 255],
        }
    }

    pub fn from_config(config: &ProcessConfig) -> Self {
        Self::new(config.quality, config.format)
            .with_png_optimization(config.optimize_png)
            .with_background(config.background)
    }

    pub fn with_png_optimization(mut self, optimize: bool) -> Self {
        self.optimize_png = optimize;
        self
    }

    pub fn with_background(mut self, background: [u8; 3]) -> Self {
        self.background = background;
        self
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    /// Writes `image` to `path` with the extension replaced by the output format's.
    /// Returns the path actually written.
    pub fn save(&self, image: &Image, path: &Path) -> Result<PathBuf> {
        let path = path.with_extension(self.format.extension());

        log::debug!(
            "Saving image to {} as {:?}, quality: {}",
            path.display(),
            self.format,
            self.quality
        );

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        match self.format {
            OutputFormat::Jpeg => self.save_jpeg(image, &path)?,
            OutputFormat::Png => self.save_png(image, &path)?,
        }

        self.log_save_result(&path)?;
        Ok(path)
    }

    fn save_jpeg(&self, image: &Image, path: &Path) -> Result<()> {
        let (width, height) = image.dimensions();
        if width > JPEG_MAX_DIMENSION || height > JPEG_MAX_DIMENSION {
            return Err(SliceKitError::UnsupportedFormat(format!(
                "JPEG cannot hold a {}x{} image (max {} per side), save as PNG instead",
                width, height, JPEG_MAX_DIMENSION
            )));
        }

        let rgb = self.flatten(image.pixels());
        let file = File::create(path)?;
        let mut encoder = JpegEncoder::new(BufWriter::new(file), self.quality.jpeg_quality());
        encoder.set_optimized_huffman_tables(true);
        if self.quality.full_chroma() {
            encoder.set_sampling_factor(SamplingFactor::R_4_4_4);
        }
        if let Some(dpi) = image.dpi() {
            encoder.set_density(Density::Inch {
                x: clamp_u16(dpi.x),
                y: clamp_u16(dpi.y),
            });
        }

        encoder
            .encode(rgb.as_raw(), width as u16, height as u16, JpegColor::Rgb)
            .map_err(SliceKitError::encode)
    }

    fn save_png(&self, image: &Image, path: &Path) -> Result<()> {
        let data = self.encode_png(image)?;

        let data = if self.optimize_png {
            optimize_from_memory(&data, &Options::default())
                .map_err(|e| SliceKitError::Encode(format!("PNG optimization failed: {}", e)))?
        } else {
            data
        };

        std::fs::write(path, data)?;
        Ok(())
    }

    /// In-memory PNG encoding, RGBA when the image has alpha and RGB otherwise.
    pub fn encode_png(&self, image: &Image) -> Result<Vec<u8>> {
        let (width, height) = image.dimensions();
        let mut buffer = Cursor::new(Vec::new());

        {
            let mut encoder = png_encoder(&mut buffer, width, height, image.dpi());
            if image.color().has_alpha() {
                encoder.set_color(png::ColorType::Rgba);
                let mut writer = encoder.write_header().map_err(SliceKitError::encode)?;
                writer
                    .write_image_data(image.pixels().to_rgba8().as_raw())
                    .map_err(SliceKitError::encode)?;
                writer.finish().map_err(SliceKitError::encode)?;
            } else {
                encoder.set_color(png::ColorType::Rgb);
                let mut writer = encoder.write_header().map_err(SliceKitError::encode)?;
                writer
                    .write_image_data(image.pixels().to_rgb8().as_raw())
                    .map_err(SliceKitError::encode)?;
                writer.finish().map_err(SliceKitError::encode)?;
            }
        }

        Ok(buffer.into_inner())
    }

    /// Drops alpha by compositing over the background colour.
    pub fn flatten(&self, pixels: &DynamicImage) -> RgbImage {
        if !pixels.color().has_alpha() {
            return pixels.to_rgb8();
        }

        let rgba: RgbaImage = pixels.to_rgba8();
        let [br, bg, bb] = self.background;
        let mut rgb = RgbImage::new(rgba.width(), rgba.height());

        for (src, dst) in rgba.pixels().zip(rgb.pixels_mut()) {
            let [r, g, b, a] = src.0;
            let alpha = a as u32;
            let blend = |fore: u8, back: u8| -> u8 {
                ((fore as u32 * alpha + back as u32 * (255 - alpha) + 127) / 255) as u8
            };
            dst.0 = [blend(r, br), blend(g, bg), blend(b, bb)];
        }

        rgb
    }

    fn log_save_result(&self, path: &Path) -> Result<()> {
        let file_size = std::fs::metadata(path)?.len();
        log::info!("Saved image: {} ({} bytes)", path.display(), file_size);
        Ok(())
    }
}

/// Row-by-row PNG output for canvases too large to hold in memory.
pub struct PngStreamWriter {
    path: PathBuf,
    stream: png::StreamWriter<'static, BufWriter<File>>,
    row_bytes: usize,
    rows_left: u32,
}

impl PngStreamWriter {
    /// Opens an RGBA8 PNG of the given size.
    pub fn create(path: &Path, width: u32, height: u32, dpi: Option<Dpi>) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let file = BufWriter::new(File::create(path)?);
        let mut encoder = png_encoder(file, width, height, dpi);
        encoder.set_color(png::ColorType::Rgba);

        let stream = encoder
            .write_header()
            .and_then(|writer| writer.into_stream_writer())
            .map_err(SliceKitError::encode)?;

        Ok(Self {
            path: path.to_path_buf(),
            stream,
            row_bytes: width as usize * 4,
            rows_left: height,
        })
    }

    pub fn write_row(&mut self, row: &[u8]) -> Result<()> {
        if row.len() != self.row_bytes {
            return Err(SliceKitError::ProcessingError(format!(
                "Row has {} bytes, expected {}",
                row.len(),
                self.row_bytes
            )));
        }
        if self.rows_left == 0 {
            return Err(SliceKitError::ProcessingError(
                "More rows than the image height".to_string(),
            ));
        }

        self.stream.write_all(row)?;
        self.rows_left -= 1;
        Ok(())
    }

    pub fn finish(self) -> Result<PathBuf> {
        if self.rows_left != 0 {
            return Err(SliceKitError::ProcessingError(format!(
                "{} rows missing from {}",
                self.rows_left,
                self.path.display()
            )));
        }

        self.stream.finish().map_err(SliceKitError::encode)?;
        log::info!("Saved streamed image: {}", self.path.display());
        Ok(self.path)
    }
}

fn png_encoder<W: Write>(writer: W, width: u32, height: u32, dpi: Option<Dpi>) -> png::Encoder<'static, W> {
    let mut encoder = png::Encoder::new(writer, width, height);
    encoder.set_depth(png::BitDepth::Eight);
    if let Some(dpi) = dpi {
        let (xppu, yppu) = dpi.to_pixels_per_meter();
        encoder.set_pixel_dims(Some(png::PixelDimensions {
            xppu,
            yppu,
            unit: png::Unit::Meter,
        }));
    }
    encoder
}

fn clamp_u16(value: u32) -> u16 {
    value.min(u16::MAX as u32) as u16
}
