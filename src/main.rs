use anyhow::{bail, Context};
use clap::Parser;
use log::LevelFilter;
use slicekit::config::{Settings, DEFAULT_CONFIG_FILE};
use slicekit::utils::{calculate_aspect_ratio, format_dimensions, format_file_size, unique_dir};
use slicekit::{
    BatchJob, BatchOperation, BatchRunner, BatchSummary, Cli, Commands, CutPlan, FileStatus,
    MergeOrder, OutputFormat, OutputOptions, Pipeline, ProcessConfig, ResizeSpec, SliceNaming,
};
use std::path::{Path, PathBuf};

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logger
    env_logger::Builder::new()
        .filter_level(if cli.verbose {
            LevelFilter::Debug
        } else {
            LevelFilter::Info
        })
        .init();

    let settings_path = cli
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
    let mut settings = match &cli.config {
        Some(path) => Settings::load(path),
        None => Settings::default(),
    };

    match cli.command {
        Commands::Split {
            input,
            at,
            interval,
            count,
            output,
            name,
            digits,
            tag_version,
            output_options,
        } => {
            let plan = match (at, interval, count) {
                (Some(list), _, _) => CutPlan::parse_offsets(&list)?,
                (None, Some(n), _) => CutPlan::Interval(n),
                (None, None, Some(n)) => CutPlan::Count(n),
                (None, None, None) => bail!("one of --at, --interval or --count is required"),
            };
            if let Some(digits) = digits {
                settings.slice_digits = digits;
            }
            let naming = SliceNaming {
                base_name: name,
                digits: settings.slice_digits,
                version: tag_version,
            };
            let config = build_config(&mut settings, &output_options)?;
            let output = output.unwrap_or_else(|| default_output(&input, "slices"));
            remember_dirs(&mut settings, &input, &output);

            process_split(&input, &output, plan, naming, config, &output_options)?;
        }
        Commands::Merge {
            inputs,
            output,
            allow_duplicates,
            output_options,
        } => {
            let config = build_config(&mut settings, &output_options)?;
            if let Some(first) = inputs.first() {
                remember_dirs(&mut settings, first, &output);
            }

            process_merge(inputs, &output, allow_duplicates, config, &output_options)?;
        }
        Commands::Resize {
            input,
            width,
            output,
            filter,
            no_suffix,
            output_options,
        } => {
            if let Some(width) = width {
                settings.resize_width = width;
            }
            if let Some(filter) = filter {
                settings.resize_filter = slicekit::ResizeAlgorithm::from(filter).to_string();
            }
            let spec = ResizeSpec::new(settings.resize_width).with_algorithm(settings.resize_filter());
            let config = build_config(&mut settings, &output_options)?;
            let output = output.unwrap_or_else(|| default_output(&input, "resized"));
            remember_dirs(&mut settings, &input, &output);

            process_resize(&input, &output, spec, !no_suffix, config, &output_options)?;
        }
        Commands::Info { input } => {
            process_info(&input)?;
        }
    }

    if cli.save_config {
        settings
            .save(&settings_path)
            .with_context(|| format!("saving settings to {}", settings_path.display()))?;
        println!("Settings saved to: {}", settings_path.display());
    }

    Ok(())
}

/// Merges command-line output options over the stored settings.
fn build_config(settings: &mut Settings, options: &OutputOptions) -> anyhow::Result<ProcessConfig> {
    if let Some(quality) = options.quality() {
        settings.quality = quality?.to_string();
    }
    if options.png {
        settings.save_as_png = true;
    }
    if options.optimize_png {
        settings.optimize_png = true;
    }

    let config = settings.process_config();
    config.validate()?;
    Ok(config)
}

fn remember_dirs(settings: &mut Settings, input: &Path, output: &Path) {
    settings.last_input_dir = input.display().to_string();
    settings.last_output_dir = output.display().to_string();
}

/// A fresh `name`, `name_001`, ... directory next to the input file, or inside an input directory.
fn default_output(input: &Path, name: &str) -> PathBuf {
    let base = if input.is_dir() {
        input.join(name)
    } else {
        input.parent().unwrap_or(Path::new(".")).join(name)
    };
    unique_dir(&base)
}

fn process_split(
    input: &Path,
    output: &Path,
    plan: CutPlan,
    naming: SliceNaming,
    config: ProcessConfig,
    options: &OutputOptions,
) -> anyhow::Result<()> {
    if input.is_dir() {
        let operation = BatchOperation::Split { plan, naming };
        return run_batch(input, output, &operation, config, options);
    }

    let pipeline = Pipeline::new(config)?;
    let written = pipeline
        .split_file(input, &plan, &naming, output)
        .with_context(|| format!("splitting {}", input.display()))?;

    println!("Split into {} slices in: {}", written.len(), output.display());
    Ok(())
}

fn process_merge(
    inputs: Vec<PathBuf>,
    output: &Path,
    allow_duplicates: bool,
    config: ProcessConfig,
    options: &OutputOptions,
) -> anyhow::Result<()> {
    if let [dir] = inputs.as_slice() {
        if dir.is_dir() {
            let output_dir = match output.parent() {
                Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
                _ => PathBuf::from("."),
            };
            let output_name = output
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .context("merge output needs a file name")?;
            let operation = BatchOperation::Merge {
                output_name,
                allow_duplicates,
            };
            return run_batch(dir, &output_dir, &operation, config, options);
        }
    }

    let order = if allow_duplicates {
        MergeOrder::with_duplicates(inputs)?
    } else {
        MergeOrder::new(inputs)?
    };

    let pipeline = Pipeline::new(config)?;
    let written = pipeline.merge_files(&order, output)?;

    println!("Merged {} images into: {}", order.len(), written.display());
    Ok(())
}

fn process_resize(
    input: &Path,
    output: &Path,
    spec: ResizeSpec,
    add_suffix: bool,
    config: ProcessConfig,
    options: &OutputOptions,
) -> anyhow::Result<()> {
    if input.is_dir() {
        let operation = BatchOperation::Resize { spec, add_suffix };
        return run_batch(input, output, &operation, config, options);
    }

    let pipeline = Pipeline::new(config)?;
    let written = pipeline
        .resize_file(input, &spec, output, add_suffix)
        .with_context(|| format!("resizing {}", input.display()))?;

    println!("Resized image saved to: {}", written.display());
    Ok(())
}

fn run_batch(
    input_dir: &Path,
    output_dir: &Path,
    operation: &BatchOperation,
    config: ProcessConfig,
    options: &OutputOptions,
) -> anyhow::Result<()> {
    let mut job = BatchJob::scan(input_dir, output_dir, options.recursive)?;
    let runner = BatchRunner::new(config, options.threads)?.with_progress(options.progress);
    let summary = runner.run(&mut job, operation)?;

    print_summary(&job, &summary, output_dir);

    if summary.failed > 0 {
        bail!("{} of {} files failed", summary.failed, summary.total);
    }
    Ok(())
}

fn print_summary(job: &BatchJob, summary: &BatchSummary, output_dir: &Path) {
    println!("Batch processing complete. {}", summary);
    println!("Output directory: {}", output_dir.display());

    for entry in &job.entries {
        if let FileStatus::Failed { reason } = &entry.status {
            println!("  FAILED {}: {}", entry.path.display(), reason);
        }
    }
}

fn process_info(input: &Path) -> anyhow::Result<()> {
    let pipeline = Pipeline::new(ProcessConfig {
        format: OutputFormat::Png,
        ..Default::default()
    })?;
    let info = pipeline
        .get_metadata(input)
        .with_context(|| format!("reading {}", input.display()))?;
    let aspect_ratio = calculate_aspect_ratio(info.width, info.height);

    println!("=== Image Information ===");
    println!("File: {}", input.display());
    println!("Size: {}", format_file_size(info.file_size));
    println!("Dimensions: {} pixels", format_dimensions(info.width, info.height));
    println!("Aspect Ratio: {:.3}", aspect_ratio);
    println!("Format: {}", info.format);
    if let Some(color) = info.color {
        println!("Color: {:?}", color);
    }
    match info.dpi {
        Some(dpi) => println!("Resolution: {}", dpi),
        None => println!("Resolution: not set"),
    }

    Ok(())
}
