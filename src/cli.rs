// slicekit/src/cli.rs
use crate::core::{Quality, ResizeAlgorithm};
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "slicekit", version, about = "Slice, merge and resize tall images")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Settings file providing defaults for unspecified options
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Write the effective options back to the settings file
    #[arg(long, global = true)]
    pub save_config: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Cut an image (or every image in a directory) into horizontal slices
    Split {
        /// Image file or directory
        input: PathBuf,

        /// Comma separated cut positions in pixels, e.g. "1200,2400"
        #[arg(long, value_name = "LIST", conflicts_with_all = ["interval", "count"])]
        at: Option<String>,

        /// Cut every N pixels
        #[arg(long, value_name = "N", conflicts_with = "count")]
        interval: Option<u32>,

        /// Make N evenly spaced cuts
        #[arg(long, value_name = "N")]
        count: Option<u32>,

        /// Output directory (default: a new "slices" directory next to the input)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Base name for slice files (default: input file name)
        #[arg(long)]
        name: Option<String>,

        /// Zero padding of the slice number
        #[arg(long)]
        digits: Option<usize>,

        /// Version tag added as _vNNN to the slice names
        #[arg(long = "tag-version", default_value_t = 0)]
        tag_version: u32,

        #[command(flatten)]
        output_options: OutputOptions,
    },

    /// Stack images vertically into one, centering narrower ones
    Merge {
        /// Images in merge order, or a single directory
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Output file
        #[arg(short, long)]
        output: PathBuf,

        /// Allow the same file to appear more than once
        #[arg(long)]
        allow_duplicates: bool,

        #[command(flatten)]
        output_options: OutputOptions,
    },

    /// Resize images to a target width, keeping aspect ratio and DPI
    Resize {
        /// Image file or directory
        input: PathBuf,

        /// Target width in pixels
        #[arg(short, long)]
        width: Option<u32>,

        /// Output directory (default: a new "resized" directory next to the input)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Resampling filter
        #[arg(long, value_enum)]
        filter: Option<Algorithm>,

        /// Do not append _<width>px to output names
        #[arg(long)]
        no_suffix: bool,

        #[command(flatten)]
        output_options: OutputOptions,
    },

    /// Show image information
    Info {
        /// Image file
        input: PathBuf,
    },
}

#[derive(Args, Debug, Clone, Default)]
pub struct OutputOptions {
    /// JPEG quality: lossless, high, medium, low or 1-100
    #[arg(short, long)]
    pub quality: Option<String>,

    /// Save as PNG instead of JPEG
    #[arg(long)]
    pub png: bool,

    /// Run PNG output through oxipng
    #[arg(long)]
    pub optimize_png: bool,

    /// Worker threads for directory input (1 = sequential)
    #[arg(short = 'j', long, default_value_t = 1)]
    pub threads: usize,

    /// Descend into subdirectories for directory input
    #[arg(short, long)]
    pub recursive: bool,

    /// Show a progress bar for directory input
    #[arg(long)]
    pub progress: bool,
}

impl OutputOptions {
    pub fn quality(&self) -> Option<Result<Quality, crate::core::SliceKitError>> {
        self.quality.as_deref().map(str::parse)
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum Algorithm {
    Nearest,
    Bilinear,
    Bicubic,
    Lanczos3,
}

impl From<Algorithm> for ResizeAlgorithm {
    fn from(algo: Algorithm) -> Self {
        match algo {
            Algorithm::Nearest => ResizeAlgorithm::Nearest,
            Algorithm::Bilinear => ResizeAlgorithm::Bilinear,
            Algorithm::Bicubic => ResizeAlgorithm::Bicubic,
            Algorithm::Lanczos3 => ResizeAlgorithm::Lanczos3,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn split_arguments_parse() {
        let cli = Cli::parse_from(["slicekit", "split", "ep.png", "--interval", "1200", "--png"]);
        match cli.command {
            Commands::Split {
                interval,
                output_options,
                ..
            } => {
                assert_eq!(interval, Some(1200));
                assert!(output_options.png);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn cut_policies_are_exclusive() {
        let result = Cli::try_parse_from(["slicekit", "split", "ep.png", "--at", "10", "--count", "3"]);
        assert!(result.is_err());
    }
}
