// slicekit/src/processors/mod.rs
mod batch;
mod loader;
mod merger;
mod metadata;
mod resizer;
mod slicer;
mod writer;

pub use batch::{BatchJob, BatchOperation, BatchRunner, BatchSummary, FileEntry, FileStatus};
pub use loader::Loader;
pub use merger::{MergeLayout, Merger, Placement};
pub use metadata::DpiReader;
pub use resizer::Resizer;
pub use slicer::Slicer;
pub use writer::{ImageWriter, PngStreamWriter, JPEG_MAX_DIMENSION};

