mod cli;
pub mod config;
mod core;
mod processors;
pub mod utils;

pub use cli::{Algorithm, Cli, Commands, OutputOptions};
pub use config::Settings;
pub use crate::core::{
    CancelToken, CutPlan, Dpi, Image, ImageMetadata, MergeOrder, OutputFormat,
    Pipeline, ProcessConfig, Quality, ResizeAlgorithm, ResizeSpec, Result, SliceKitError,
    SliceNaming, SourceFormat, MAX_PIXELS,
};
pub use processors::{
    BatchJob, BatchOperation, BatchRunner, BatchSummary, DpiReader, FileEntry, FileStatus,
    ImageWriter, Loader, MergeLayout, Merger, Placement, PngStreamWriter, Resizer, Slicer,
    JPEG_MAX_DIMENSION,
};
pub use utils::{
    calculate_aspect_ratio, format_dimensions, format_file_size, is_supported_format,
    sanitize_filename, unique_dir,
};

pub mod prelude {
    pub use crate::{
        BatchJob, BatchOperation, BatchRunner, CutPlan, Image, ImageWriter, Loader, MergeOrder,
        Merger, Pipeline, ProcessConfig, ResizeAlgorithm, ResizeSpec, Resizer, SliceNaming, Slicer,
    };
}

// Re-export commonly used types
pub use image::DynamicImage;
