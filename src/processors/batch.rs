// slicekit/src/processors/batch.rs
use crate::core::{
    CancelToken, CutPlan, MergeOrder, Pipeline, ProcessConfig, ResizeSpec, Result, SliceKitError,
    SliceNaming,
};
use crate::utils::is_supported_format;
use indicatif::{ParallelProgressIterator, ProgressBar, ProgressStyle};
use rayon::prelude::*;
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use walkdir::WalkDir;

/// What to do with every file of a batch.
#[derive(Debug, Clone)]
pub enum BatchOperation {
    Split { plan: CutPlan, naming: SliceNaming },
    Resize { spec: ResizeSpec, add_suffix: bool },
    /// Stack all readable files into `output_dir/output_name`.
    Merge { output_name: String, allow_duplicates: bool },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileStatus {
    Pending,
    Success { outputs: Vec<PathBuf> },
    Failed { reason: String },
}

#[derive(Debug, Clone)]
pub struct FileEntry {
    pub path: PathBuf,
    pub status: FileStatus,
}

/// The files of one batch run and how each of them fared.
#[derive(Debug, Clone)]
pub struct BatchJob {
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    pub entries: Vec<FileEntry>,
}

impl BatchJob {
    /// Collects the supported images under `input_dir`, sorted by lower-cased file name.
    pub fn scan(input_dir: &Path, output_dir: &Path, recursive: bool) -> Result<Self> {
        validate_paths(input_dir, output_dir)?;

        let walker = if recursive {
            WalkDir::new(input_dir)
        } else {
            WalkDir::new(input_dir).max_depth(1)
        };

        let mut paths: Vec<PathBuf> = walker
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .filter(|entry| is_supported_format(entry.path()))
            .filter(|entry| !entry.path().starts_with(output_dir))
            .map(|entry| entry.into_path())
            .collect();

        paths.sort_by_key(|p| {
            p.file_name()
                .map(|n| n.to_string_lossy().to_lowercase())
                .unwrap_or_default()
        });

        Ok(Self::from_files(input_dir, output_dir, paths))
    }

    pub fn from_files(input_dir: &Path, output_dir: &Path, files: Vec<PathBuf>) -> Self {
        Self {
            input_dir: input_dir.to_path_buf(),
            output_dir: output_dir.to_path_buf(),
            entries: files
                .into_iter()
                .map(|path| FileEntry {
                    path,
                    status: FileStatus::Pending,
                })
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn failed(&self) -> impl Iterator<Item = &FileEntry> {
        self.entries
            .iter()
            .filter(|e| matches!(e.status, FileStatus::Failed { .. }))
    }

    pub fn pending(&self) -> impl Iterator<Item = &FileEntry> {
        self.entries
            .iter()
            .filter(|e| e.status == FileStatus::Pending)
    }

    fn summarize(&self, elapsed: Duration, cancelled: bool) -> BatchSummary {
        let mut summary = BatchSummary {
            total: self.entries.len(),
            elapsed,
            cancelled,
            ..Default::default()
        };

        // Merged entries share one output file.
        let mut written = HashSet::new();
        for entry in &self.entries {
            match &entry.status {
                FileStatus::Pending => summary.pending += 1,
                FileStatus::Success { outputs } => {
                    summary.succeeded += 1;
                    written.extend(outputs.iter());
                }
                FileStatus::Failed { .. } => summary.failed += 1,
            }
        }
        summary.outputs = written.len();

        summary
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BatchSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub pending: usize,
    pub outputs: usize,
    pub elapsed: Duration,
    pub cancelled: bool,
}

impl fmt::Display for BatchSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} of {} files processed, {} failed, {} files written in {:.1}s",
            self.succeeded,
            self.total,
            self.failed,
            self.outputs,
            self.elapsed.as_secs_f64()
        )?;
        if self.cancelled {
            write!(f, " (cancelled, {} not started)", self.pending)?;
        }
        Ok(())
    }
}

pub struct BatchRunner {
    pipeline: Pipeline,
    thread_pool: Option<rayon::ThreadPool>,
    cancel: CancelToken,
    show_progress: bool,
}

impl BatchRunner {
    /// `threads <= 1` processes files one after another on the calling thread.
    pub fn new(config: ProcessConfig, threads: usize) -> Result<Self> {
        let cancel = CancelToken::new();
        let pipeline = Pipeline::new(config)?.with_cancel_token(cancel.clone());

        let thread_pool = if threads > 1 {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(threads)
                .build()
                .map_err(|e| {
                    SliceKitError::ProcessingError(format!("Failed to create thread pool: {}", e))
                })?;
            Some(pool)
        } else {
            None
        };

        Ok(Self {
            pipeline,
            thread_pool,
            cancel,
            show_progress: false,
        })
    }

    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    /// Handle for stopping the run from another thread. Files already started finish.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn run(&self, job: &mut BatchJob, operation: &BatchOperation) -> Result<BatchSummary> {
        self.validate_operation(operation)?;

        if job.is_empty() {
            log::warn!("No image files found in {}", job.input_dir.display());
            return Ok(job.summarize(Duration::ZERO, false));
        }

        std::fs::create_dir_all(&job.output_dir)?;

        log::info!(
            "Processing {} images from {}",
            job.len(),
            job.input_dir.display()
        );

        let started = Instant::now();
        match operation {
            BatchOperation::Merge {
                output_name,
                allow_duplicates,
            } => self.run_merge(job, output_name, *allow_duplicates),
            _ => self.run_per_file(job, operation),
        }

        let summary = job.summarize(started.elapsed(), self.cancel.is_cancelled());
        for entry in job.failed() {
            if let FileStatus::Failed { reason } = &entry.status {
                log::warn!("Failed: {}: {}", entry.path.display(), reason);
            }
        }
        log::info!("{}", summary);

        Ok(summary)
    }

    fn run_per_file(&self, job: &mut BatchJob, operation: &BatchOperation) {
        let pb = self.create_progress_bar(job.len());
        let output_dir = job.output_dir.clone();
        let operations = per_file_operations(job, operation);

        match &self.thread_pool {
            Some(pool) => pool.install(|| {
                job.entries
                    .par_iter_mut()
                    .zip(operations.par_iter())
                    .progress_with(pb.clone())
                    .for_each(|(entry, op)| self.process_entry(entry, op, &output_dir));
            }),
            None => {
                for (entry, op) in job.entries.iter_mut().zip(&operations) {
                    if self.cancel.is_cancelled() {
                        log::info!("Batch cancelled");
                        break;
                    }
                    self.process_entry(entry, op, &output_dir);
                    pb.inc(1);
                }
            }
        }

        pb.finish_and_clear();
    }

    fn process_entry(&self, entry: &mut FileEntry, operation: &BatchOperation, output_dir: &Path) {
        if self.cancel.is_cancelled() {
            return;
        }

        let input = entry.path.as_path();
        let result = match operation {
            BatchOperation::Split { plan, naming } => {
                self.pipeline.split_file(input, plan, naming, output_dir)
            }
            BatchOperation::Resize { spec, add_suffix } => self
                .pipeline
                .resize_file(input, spec, output_dir, *add_suffix)
                .map(|path| vec![path]),
            BatchOperation::Merge { .. } => Err(SliceKitError::ProcessingError(
                "Merge is not a per-file operation".to_string(),
            )),
        };

        entry.status = match result {
            Ok(outputs) => FileStatus::Success { outputs },
            Err(SliceKitError::Cancelled) => FileStatus::Pending,
            Err(e) => {
                log::debug!("{} failed: {}", input.display(), e);
                FileStatus::Failed {
                    reason: e.to_string(),
                }
            }
        };
    }

    fn run_merge(&self, job: &mut BatchJob, output_name: &str, allow_duplicates: bool) {
        let mut readable = Vec::new();
        for (index, entry) in job.entries.iter_mut().enumerate() {
            if self.cancel.is_cancelled() {
                return;
            }
            match self.pipeline.get_metadata(&entry.path) {
                Ok(_) => readable.push(index),
                Err(e) => {
                    entry.status = FileStatus::Failed {
                        reason: e.to_string(),
                    }
                }
            }
        }

        if readable.is_empty() {
            log::warn!("No readable images to merge in {}", job.input_dir.display());
            return;
        }

        let paths: Vec<PathBuf> = readable
            .iter()
            .map(|&i| job.entries[i].path.clone())
            .collect();
        let order = if allow_duplicates {
            MergeOrder::with_duplicates(paths)
        } else {
            MergeOrder::new(paths)
        };

        let output = job.output_dir.join(output_name);
        let result = order.and_then(|order| self.pipeline.merge_files(&order, &output));

        let status = match result {
            Ok(path) => FileStatus::Success {
                outputs: vec![path],
            },
            Err(SliceKitError::Cancelled) => FileStatus::Pending,
            Err(e) => FileStatus::Failed {
                reason: e.to_string(),
            },
        };

        for &i in &readable {
            job.entries[i].status = status.clone();
        }
    }

    fn validate_operation(&self, operation: &BatchOperation) -> Result<()> {
        match operation {
            BatchOperation::Split { plan, .. } => plan.validate(),
            BatchOperation::Resize { spec, .. } => {
                spec.validate(self.pipeline.config().max_dimension)
            }
            BatchOperation::Merge { output_name, .. } => {
                if output_name.trim().is_empty() {
                    Err(SliceKitError::InvalidParameter(
                        "Merge output name is empty".to_string(),
                    ))
                } else {
                    Ok(())
                }
            }
        }
    }

    fn create_progress_bar(&self, total: usize) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }

        let pb = ProgressBar::new(total as u64);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}")
        {
            pb.set_style(style.progress_chars("#>-"));
        }
        pb
    }
}

/// One operation per entry. Splits sharing an output directory get distinct base names,
/// so `ep.png` and `ep.bmp` (or `a/ep.png` and `b/ep.png`) do not overwrite each other.
fn per_file_operations(job: &BatchJob, operation: &BatchOperation) -> Vec<BatchOperation> {
    let BatchOperation::Split { plan, naming } = operation else {
        return vec![operation.clone(); job.len()];
    };

    let bases: Vec<String> = job.entries.iter().map(|e| naming.base_for(&e.path)).collect();
    let original: HashSet<&str> = bases.iter().map(String::as_str).collect();
    let mut assigned: HashSet<String> = HashSet::new();

    job.entries
        .iter()
        .zip(&bases)
        .map(|(entry, base)| {
            if assigned.insert(base.clone()) {
                return operation.clone();
            }

            let renamed = (1..)
                .map(|i| format!("{}_{:03}", base, i))
                .find(|c| !assigned.contains(c) && !original.contains(c.as_str()))
                .unwrap_or_else(|| base.clone());
            log::warn!(
                "{} shares the slice name {}, writing it as {}",
                entry.path.display(),
                base,
                renamed
            );
            assigned.insert(renamed.clone());

            BatchOperation::Split {
                plan: plan.clone(),
                naming: naming.with_base(renamed),
            }
        })
        .collect()
}

pub fn validate_paths(input_dir: &Path, output_dir: &Path) -> Result<()> {
    if !input_dir.exists() {
        return Err(SliceKitError::InvalidParameter(format!(
            "Input directory does not exist: {}",
            input_dir.display()
        )));
    }

    if !input_dir.is_dir() {
        return Err(SliceKitError::InvalidParameter(format!(
            "Input path is not a directory: {}",
            input_dir.display()
        )));
    }

    if output_dir.exists() && !output_dir.is_dir() {
        return Err(SliceKitError::InvalidParameter(format!(
            "Output path exists but is not a directory: {}",
            output_dir.display()
        )));
    }

    if input_dir == output_dir {
        return Err(SliceKitError::InvalidParameter(
            "Input and output directories cannot be the same".to_string(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::OutputFormat;
    use image::{Rgb, RgbImage};

    fn fixture_dir() -> tempfile::TempDir {
        let tmp = tempfile::tempdir().unwrap();
        for (name, height) in [("b.png", 30), ("A.png", 20), ("c.png", 40)] {
            RgbImage::from_pixel(10, height, Rgb([1, 2, 3]))
                .save(tmp.path().join(name))
                .unwrap();
        }
        std::fs::write(tmp.path().join("notes.txt"), b"skip me").unwrap();
        tmp
    }

    fn png_config() -> ProcessConfig {
        ProcessConfig {
            format: OutputFormat::Png,
            ..Default::default()
        }
    }

    #[test]
    fn scan_sorts_case_insensitively_and_skips_other_files() {
        let tmp = fixture_dir();
        let out = tmp.path().join("out");
        let job = BatchJob::scan(tmp.path(), &out, false).unwrap();

        let names: Vec<String> = job
            .entries
            .iter()
            .map(|e| e.path.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["A.png", "b.png", "c.png"]);
    }

    #[test]
    fn same_input_and_output_is_rejected() {
        let tmp = fixture_dir();
        assert!(BatchJob::scan(tmp.path(), tmp.path(), false).is_err());
    }

    #[test]
    fn invalid_operation_is_rejected_up_front() {
        let tmp = fixture_dir();
        let mut job = BatchJob::scan(tmp.path(), &tmp.path().join("out"), false).unwrap();
        let runner = BatchRunner::new(png_config(), 1).unwrap();

        let op = BatchOperation::Resize {
            spec: ResizeSpec::new(0),
            add_suffix: true,
        };
        assert!(runner.run(&mut job, &op).is_err());
        assert_eq!(job.pending().count(), 3);
    }

    #[test]
    fn cancelled_batch_leaves_files_pending() {
        let tmp = fixture_dir();
        let mut job = BatchJob::scan(tmp.path(), &tmp.path().join("out"), false).unwrap();
        let runner = BatchRunner::new(png_config(), 1).unwrap();
        runner.cancel_token().cancel();

        let op = BatchOperation::Resize {
            spec: ResizeSpec::new(5),
            add_suffix: false,
        };
        let summary = runner.run(&mut job, &op).unwrap();
        assert!(summary.cancelled);
        assert_eq!(summary.pending, 3);
        assert_eq!(summary.succeeded, 0);
    }

    #[test]
    fn merge_batch_stacks_in_name_order() {
        let tmp = fixture_dir();
        let out = tmp.path().join("out");
        let mut job = BatchJob::scan(tmp.path(), &out, false).unwrap();
        let runner = BatchRunner::new(png_config(), 1).unwrap();

        let op = BatchOperation::Merge {
            output_name: "merged".to_string(),
            allow_duplicates: false,
        };
        let summary = runner.run(&mut job, &op).unwrap();
        assert_eq!(summary.succeeded, 3);

        let merged = image::open(out.join("merged.png")).unwrap();
        assert_eq!((merged.width(), merged.height()), (10, 90));
    }

    #[test]
    fn split_of_same_named_sources_keeps_every_slice() {
        let tmp = tempfile::tempdir().unwrap();
        RgbImage::from_pixel(8, 20, Rgb([200, 0, 0]))
            .save(tmp.path().join("ep.png"))
            .unwrap();
        RgbImage::from_pixel(8, 20, Rgb([0, 0, 200]))
            .save(tmp.path().join("ep.bmp"))
            .unwrap();
        std::fs::create_dir(tmp.path().join("sub")).unwrap();
        RgbImage::from_pixel(8, 20, Rgb([0, 200, 0]))
            .save(tmp.path().join("sub").join("ep.png"))
            .unwrap();

        let out = tmp.path().join("out");
        let mut job = BatchJob::scan(tmp.path(), &out, true).unwrap();
        assert_eq!(job.len(), 3);
        let runner = BatchRunner::new(png_config(), 1).unwrap();

        let op = BatchOperation::Split {
            plan: CutPlan::Interval(10),
            naming: SliceNaming::default(),
        };
        let summary = runner.run(&mut job, &op).unwrap();
        assert_eq!(summary.succeeded, 3);
        assert_eq!(summary.outputs, 6);

        let on_disk = std::fs::read_dir(&out).unwrap().count();
        assert_eq!(on_disk, 6);
        for name in ["ep_000.png", "ep_001_000.png", "ep_002_001.png"] {
            assert!(out.join(name).exists(), "{} missing", name);
        }
    }

    #[test]
    fn parallel_resize_of_same_stem_keeps_both_outputs() {
        let tmp = tempfile::tempdir().unwrap();
        RgbImage::from_pixel(80, 20, Rgb([200, 0, 0]))
            .save(tmp.path().join("a.png"))
            .unwrap();
        RgbImage::from_pixel(80, 20, Rgb([0, 0, 200]))
            .save(tmp.path().join("a.bmp"))
            .unwrap();

        let out = tmp.path().join("out");
        let mut job = BatchJob::scan(tmp.path(), &out, false).unwrap();
        let runner = BatchRunner::new(png_config(), 2).unwrap();

        let op = BatchOperation::Resize {
            spec: ResizeSpec::new(40),
            add_suffix: true,
        };
        let summary = runner.run(&mut job, &op).unwrap();
        assert_eq!(summary.succeeded, 2);
        assert_eq!(summary.outputs, 2);
        assert!(out.join("a_40px.png").exists());
        assert!(out.join("a_40px_001.png").exists());
    }

    #[test]
    fn merge_batch_counts_one_written_file() {
        let tmp = fixture_dir();
        let out = tmp.path().join("out");
        let mut job = BatchJob::scan(tmp.path(), &out, false).unwrap();
        let runner = BatchRunner::new(png_config(), 1).unwrap();

        let op = BatchOperation::Merge {
            output_name: "merged.png".to_string(),
            allow_duplicates: false,
        };
        let summary = runner.run(&mut job, &op).unwrap();
        assert_eq!(summary.succeeded, 3);
        assert_eq!(summary.outputs, 1);
        assert_eq!(std::fs::read_dir(&out).unwrap().count(), 1);
    }

    #[test]
    fn parallel_split_matches_sequential_result() {
        let tmp = fixture_dir();
        let out = tmp.path().join("out");
        let mut job = BatchJob::scan(tmp.path(), &out, false).unwrap();
        let runner = BatchRunner::new(png_config(), 3).unwrap();

        let op = BatchOperation::Split {
            plan: CutPlan::Interval(10),
            naming: SliceNaming::default(),
        };
        let summary = runner.run(&mut job, &op).unwrap();
        assert_eq!(summary.succeeded, 3);
        assert_eq!(summary.outputs, 2 + 3 + 4);
    }
}
