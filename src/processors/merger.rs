// slicekit/src/processors/merger.rs
use crate::core::{
    CancelToken, Dpi, Image, MergeOrder, OutputFormat, ProcessConfig, Result, SliceKitError,
};
use crate::processors::loader::Loader;
use crate::processors::writer::{ImageWriter, PngStreamWriter};
use image::{imageops, DynamicImage, RgbaImage};
use std::path::{Path, PathBuf};

/// Position of one source on the merged canvas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Canvas size and the placement of every source, top to bottom.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeLayout {
    pub width: u32,
    pub height: u32,
    pub placements: Vec<Placement>,
}

impl MergeLayout {
    pub fn plan(sizes: &[(u32, u32)], max_pixels: u64) -> Result<Self> {
        if sizes.is_empty() {
            return Err(SliceKitError::InvalidParameter(
                "Nothing to merge".to_string(),
            ));
        }

        let width = sizes.iter().map(|&(w, _)| w).max().unwrap_or(0);
        let total_height: u64 = sizes.iter().map(|&(_, h)| h as u64).sum();

        if width == 0 || total_height == 0 {
            return Err(SliceKitError::InvalidParameter(
                "Cannot merge empty images".to_string(),
            ));
        }

        let pixels = width as u64 * total_height;
        if pixels > max_pixels || total_height > u32::MAX as u64 {
            return Err(SliceKitError::MemoryLimitExceeded(format!(
                "Merged image would be {}x{} = {} pixels (limit {})",
                width, total_height, pixels, max_pixels
            )));
        }

        let mut y = 0;
        let placements = sizes
            .iter()
            .map(|&(w, h)| {
                let placement = Placement {
                    x: (width - w) / 2,
                    y,
                    width: w,
                    height: h,
                };
                y += h;
                placement
            })
            .collect();

        Ok(Self {
            width,
            height: total_height as u32,
            placements,
        })
    }

    pub fn pixel_count(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// Size of an RGBA8 canvas for this layout.
    pub fn estimated_bytes(&self) -> u64 {
        self.pixel_count() * 4
    }
}

/// Stacks images vertically, centering narrower ones on a transparent background.
pub struct Merger {
    max_pixels: u64,
    streaming_threshold: u64,
    cancel: CancelToken,
}

impl Merger {
    pub fn new() -> Self {
        Self::from_config(&ProcessConfig::default())
    }

    pub fn from_config(config: &ProcessConfig) -> Self {
        Self {
            max_pixels: config.max_pixels,
            streaming_threshold: config.streaming_threshold,
            cancel: CancelToken::new(),
        }
    }

    pub fn with_streaming_threshold(mut self, bytes: u64) -> Self {
        self.streaming_threshold = bytes;
        self
    }

    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Merges images that are already in memory. The result carries the first image's DPI.
    pub fn merge(&self, images: &[Image]) -> Result<Image> {
        let sizes: Vec<(u32, u32)> = images.iter().map(Image::dimensions).collect();
        let layout = MergeLayout::plan(&sizes, self.max_pixels)?;

        let mut canvas = RgbaImage::new(layout.width, layout.height);
        for (image, placement) in images.iter().zip(&layout.placements) {
            self.cancel.check()?;
            paste(&mut canvas, image, placement);
        }

        let dpi = images.first().and_then(Image::dpi);
        Ok(Image::new(DynamicImage::ImageRgba8(canvas), dpi, None))
    }

    /// Merges the files in `order` into `output`, loading one source at a time.
    ///
    /// Large canvases are streamed row by row into a PNG; JPEG output that would need
    /// streaming is rejected.
    pub fn merge_files(
        &self,
        order: &MergeOrder,
        loader: &Loader,
        writer: &ImageWriter,
        output: &Path,
    ) -> Result<PathBuf> {
        let mut sizes = Vec::with_capacity(order.len());
        let mut dpi = None;
        for (index, path) in order.paths().iter().enumerate() {
            self.cancel.check()?;
            let info = loader.probe(path)?;
            if index == 0 {
                dpi = info.dpi;
            }
            sizes.push((info.width, info.height));
        }

        let layout = MergeLayout::plan(&sizes, self.max_pixels)?;
        log::info!(
            "Merging {} images into {}x{}",
            order.len(),
            layout.width,
            layout.height
        );

        if layout.estimated_bytes() > self.streaming_threshold {
            if writer.format() == OutputFormat::Jpeg {
                return Err(SliceKitError::MemoryLimitExceeded(format!(
                    "A {}x{} merge needs about {} MiB; save it as PNG to stream it to disk",
                    layout.width,
                    layout.height,
                    layout.estimated_bytes() / (1024 * 1024)
                )));
            }
            return self.compose_streaming(order, loader, &layout, dpi, output);
        }

        self.compose_in_memory(order, loader, writer, &layout, dpi, output)
    }

    fn compose_in_memory(
        &self,
        order: &MergeOrder,
        loader: &Loader,
        writer: &ImageWriter,
        layout: &MergeLayout,
        dpi: Option<Dpi>,
        output: &Path,
    ) -> Result<PathBuf> {
        let mut canvas = RgbaImage::new(layout.width, layout.height);

        for (index, (path, placement)) in order.paths().iter().zip(&layout.placements).enumerate() {
            self.cancel.check()?;
            let image = load_placed(loader, path, placement)?;
            paste(&mut canvas, &image, placement);
            log::debug!("Placed {}/{}: {}", index + 1, order.len(), path.display());
        }

        let merged = Image::new(DynamicImage::ImageRgba8(canvas), dpi, None);
        writer.save(&merged, output)
    }

    fn compose_streaming(
        &self,
        order: &MergeOrder,
        loader: &Loader,
        layout: &MergeLayout,
        dpi: Option<Dpi>,
        output: &Path,
    ) -> Result<PathBuf> {
        let output = output.with_extension(OutputFormat::Png.extension());
        log::info!("Streaming merge to {}", output.display());

        let mut stream = PngStreamWriter::create(&output, layout.width, layout.height, dpi)?;
        let row_bytes = layout.width as usize * 4;
        let mut row = vec![0u8; row_bytes];

        for (index, (path, placement)) in order.paths().iter().zip(&layout.placements).enumerate() {
            self.cancel.check()?;
            let source = load_placed(loader, path, placement)?.into_pixels().into_rgba8();

            let start = placement.x as usize * 4;
            let end = start + placement.width as usize * 4;
            row.fill(0);

            for src_row in source.as_raw().chunks_exact(placement.width as usize * 4) {
                row[start..end].copy_from_slice(src_row);
                stream.write_row(&row)?;
            }
            log::debug!("Streamed {}/{}: {}", index + 1, order.len(), path.display());
        }

        stream.finish()
    }
}

impl Default for Merger {
    fn default() -> Self {
        Self::new()
    }
}

fn paste(canvas: &mut RgbaImage, image: &Image, placement: &Placement) {
    let rgba = image.pixels().to_rgba8();
    imageops::replace(canvas, &rgba, placement.x as i64, placement.y as i64);
}

fn load_placed(loader: &Loader, path: &Path, placement: &Placement) -> Result<Image> {
    let image = loader.load(path)?;
    if image.dimensions() != (placement.width, placement.height) {
        return Err(SliceKitError::ProcessingError(format!(
            "{} changed size while merging ({}x{}, expected {}x{})",
            path.display(),
            image.width(),
            image.height(),
            placement.width,
            placement.height
        )));
    }
    Ok(image)
}
