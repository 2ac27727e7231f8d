// slicekit/src/core/processor.rs
use super::{
    CancelToken, CutPlan, Image, ImageMetadata, MergeOrder, ProcessConfig, ResizeSpec, Result,
    SliceKitError, SliceNaming,
};
use crate::processors::{ImageWriter, Loader, Merger, Resizer, Slicer};
use crate::utils::reserve_file_path;
use std::path::{Path, PathBuf};

/// Single-file entry point for the split, merge and resize operations.
pub struct Pipeline {
    config: ProcessConfig,
    loader: Loader,
    slicer: Slicer,
    resizer: Resizer,
    writer: ImageWriter,
    cancel: CancelToken,
}

impl Pipeline {
    pub fn new(config: ProcessConfig) -> Result<Self> {
        config.validate()?;

        let loader = Loader::new()
            .with_max_dimensions(config.max_dimension, config.max_dimension)
            .with_max_psd_bytes(config.max_psd_bytes);
        let resizer = Resizer::new(config.max_dimension).with_max_pixels(config.max_pixels);
        let writer = ImageWriter::from_config(&config);

        Ok(Self {
            config,
            loader,
            slicer: Slicer::new(),
            resizer,
            writer,
            cancel: CancelToken::new(),
        })
    }

    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn config(&self) -> &ProcessConfig {
        &self.config
    }

    pub fn load<P: AsRef<Path>>(&self, path: P) -> Result<Image> {
        self.loader.load(path.as_ref())
    }

    /// Cuts `input` according to `plan` and writes one file per slice into `output_dir`.
    pub fn split_file<P: AsRef<Path>>(
        &self,
        input: P,
        plan: &CutPlan,
        naming: &SliceNaming,
        output_dir: P,
    ) -> Result<Vec<PathBuf>> {
        let input = input.as_ref();
        let output_dir = output_dir.as_ref();

        plan.validate()?;
        let image = self.loader.load(input)?;
        plan.segments(image.height())?;
        self.prepare_output_dir(output_dir)?;

        let mut written = Vec::new();

        let count = self.slicer.for_each_slice(&image, plan, |index, slice| {
            let name = naming.file_name(input, index, self.writer.format());
            let path = self.writer.save(&slice, &output_dir.join(name)).map_err(|e| {
                SliceKitError::ProcessingError(format!("Slice {} of {}: {}", index + 1, input.display(), e))
            })?;
            written.push(path);
            Ok(())
        })?;

        log::info!(
            "Split {} into {} slices in {}",
            input.display(),
            count,
            output_dir.display()
        );

        Ok(written)
    }

    /// Stacks the files of `order` into a single image at `output`.
    pub fn merge_files<P: AsRef<Path>>(&self, order: &MergeOrder, output: P) -> Result<PathBuf> {
        let output = output.as_ref();
        if let Some(parent) = output.parent() {
            if !parent.as_os_str().is_empty() {
                self.prepare_output_dir(parent)?;
            }
        }

        Merger::from_config(&self.config)
            .with_cancel_token(self.cancel.clone())
            .merge_files(order, &self.loader, &self.writer, output)
    }

    /// Resizes `input` to `spec.width` and writes it into `output_dir` without
    /// overwriting existing files.
    pub fn resize_file<P: AsRef<Path>>(
        &self,
        input: P,
        spec: &ResizeSpec,
        output_dir: P,
        add_suffix: bool,
    ) -> Result<PathBuf> {
        let input = input.as_ref();
        let output_dir = output_dir.as_ref();

        spec.validate(self.config.max_dimension)?;
        self.prepare_output_dir(output_dir)?;

        let image = self.loader.load(input)?;
        let resized = self.resizer.resize(&image, spec)?;
        let resized = match resized.dpi() {
            Some(_) => resized,
            None => resized.with_dpi(self.config.default_dpi),
        };

        let stem = input
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("image");
        let stem = if add_suffix {
            format!("{}_{}px", stem, spec.width)
        } else {
            stem.to_string()
        };

        let target = reserve_file_path(output_dir, &stem, self.writer.format().extension())?;
        self.writer.save(&resized, &target).map_err(|e| {
            if let Err(cleanup) = std::fs::remove_file(&target) {
                log::debug!("Could not remove {}: {}", target.display(), cleanup);
            }
            e
        })
    }

    pub fn get_metadata<P: AsRef<Path>>(&self, path: P) -> Result<ImageMetadata> {
        self.loader.probe(path.as_ref())
    }

    fn prepare_output_dir(&self, dir: &Path) -> Result<()> {
        if dir.exists() && !dir.is_dir() {
            return Err(SliceKitError::InvalidParameter(format!(
                "Output path exists but is not a directory: {}",
                dir.display()
            )));
        }
        std::fs::create_dir_all(dir)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Dpi, OutputFormat};
    use image::{Rgb, RgbImage};

    fn write_strip(dir: &Path, name: &str, width: u32, height: u32) -> PathBuf {
        let path = dir.join(name);
        RgbImage::from_fn(width, height, |x, y| Rgb([(x * 3) as u8, (y % 256) as u8, 40]))
            .save(&path)
            .unwrap();
        path
    }

    fn png_pipeline() -> Pipeline {
        Pipeline::new(ProcessConfig {
            format: OutputFormat::Png,
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn split_writes_numbered_slices() {
        let tmp = tempfile::tempdir().unwrap();
        let input = write_strip(tmp.path(), "ep01.png", 20, 90);
        let out = tmp.path().join("slices");

        let written = png_pipeline()
            .split_file(&input, &CutPlan::Interval(40), &SliceNaming::default(), &out)
            .unwrap();

        let names: Vec<String> = written
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["ep01_000.png", "ep01_001.png", "ep01_002.png"]);
    }

    #[test]
    fn invalid_plan_is_rejected_before_output() {
        let tmp = tempfile::tempdir().unwrap();
        let input = write_strip(tmp.path(), "ep01.png", 20, 90);
        let out = tmp.path().join("never");

        assert!(png_pipeline()
            .split_file(&input, &CutPlan::Interval(0), &SliceNaming::default(), &out)
            .is_err());
        assert!(!out.exists());
    }

    #[test]
    fn failed_split_leaves_no_output_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let input = write_strip(tmp.path(), "ep01.png", 20, 90);
        let corrupt = tmp.path().join("bad.png");
        std::fs::write(&corrupt, b"not a png").unwrap();
        let out = tmp.path().join("slices");
        let pipeline = png_pipeline();

        let beyond = CutPlan::Offsets(vec![40, 500]);
        assert!(matches!(
            pipeline.split_file(&input, &beyond, &SliceNaming::default(), &out),
            Err(SliceKitError::InvalidCutPlan(_))
        ));
        assert!(!out.exists());

        assert!(pipeline
            .split_file(&corrupt, &CutPlan::Interval(10), &SliceNaming::default(), &out)
            .is_err());
        assert!(!out.exists());
    }

    #[test]
    fn resize_applies_default_dpi_and_never_overwrites() {
        let tmp = tempfile::tempdir().unwrap();
        let input = write_strip(tmp.path(), "page.png", 80, 200);
        let out = tmp.path().join("resized");
        let pipeline = png_pipeline();

        let first = pipeline
            .resize_file(&input, &ResizeSpec::new(40), &out, true)
            .unwrap();
        let second = pipeline
            .resize_file(&input, &ResizeSpec::new(40), &out, true)
            .unwrap();

        assert_eq!(first.file_name().unwrap(), "page_40px.png");
        assert_eq!(second.file_name().unwrap(), "page_40px_001.png");

        let info = pipeline.get_metadata(&first).unwrap();
        assert_eq!((info.width, info.height), (40, 100));
        assert_eq!(info.dpi, Some(Dpi::new(300, 300)));
    }
}
