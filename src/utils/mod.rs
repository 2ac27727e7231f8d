// slicekit/src/utils/mod.rs
use std::fs::OpenOptions;
use std::io;
use std::path::{Path, PathBuf};

pub const SUPPORTED_EXTENSIONS: [&str; 10] = [
    "png", "jpg", "jpeg", "webp", "bmp", "gif", "tif", "tiff", "psd", "psb",
];

/// Returns `base` if it does not exist yet, otherwise `base_001`, `base_002`, ...
pub fn unique_dir(base: &Path) -> PathBuf {
    if !base.exists() {
        return base.to_path_buf();
    }

    let name = base
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    (1..)
        .map(|i| base.with_file_name(format!("{}_{:03}", name, i)))
        .find(|candidate| !candidate.exists())
        .unwrap_or_else(|| base.to_path_buf())
}

/// Claims `dir/stem.ext`, or `stem_001.ext`, `stem_002.ext`, ... by creating the first free
/// name as an empty file. Concurrent callers never receive the same path.
pub fn reserve_file_path(dir: &Path, stem: &str, extension: &str) -> io::Result<PathBuf> {
    let candidates = std::iter::once(dir.join(format!("{}.{}", stem, extension)))
        .chain((1..).map(|i| dir.join(format!("{}_{:03}.{}", stem, i, extension))));

    for candidate in candidates {
        match OpenOptions::new().write(true).create_new(true).open(&candidate) {
            Ok(_) => return Ok(candidate),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(e),
        }
    }

    Err(io::Error::new(
        io::ErrorKind::AlreadyExists,
        format!("no free name for {} in {}", stem, dir.display()),
    ))
}

pub fn format_file_size(bytes: u64) -> String {
    const UNITS: [&str; 6] = ["B", "KB", "MB", "GB", "TB", "PB"];

    if bytes == 0 {
        return "0 B".to_string();
    }

    let base = 1024_f64;
    let bytes_f64 = bytes as f64;
    let exponent = ((bytes_f64.log10() / base.log10()).floor() as i32).min(UNITS.len() as i32 - 1);
    let size = bytes_f64 / base.powi(exponent);

    format!("{:.1} {}", size, UNITS[exponent as usize])
}

/// `1234, 56789` -> `1,234×56,789`
pub fn format_dimensions(width: u32, height: u32) -> String {
    format!("{}×{}", group_thousands(width as u64), group_thousands(height as u64))
}

pub fn group_thousands(value: u64) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

pub fn calculate_aspect_ratio(width: u32, height: u32) -> f32 {
    if height == 0 {
        0.0
    } else {
        width as f32 / height as f32
    }
}

pub fn is_supported_format(path: &Path) -> bool {
    get_file_extension(path)
        .map(|ext| SUPPORTED_EXTENSIONS.contains(&ext.as_str()))
        .unwrap_or(false)
}

pub fn is_layered_document(path: &Path) -> bool {
    matches!(get_file_extension(path).as_deref(), Some("psd") | Some("psb"))
}

/// Replaces characters that are invalid in file names and trims stray separators.
pub fn sanitize_filename(filename: &str) -> String {
    let invalid_chars = ['/', '\\', ':', '*', '?', '"', '<', '>', '|', ' '];
    let replaced: String = filename
        .chars()
        .map(|c| if invalid_chars.contains(&c) { '_' } else { c })
        .collect();

    replaced.trim_matches(|c| c == ' ' || c == '.' || c == '_').to_string()
}

pub fn get_file_extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|s| s.to_lowercase())
}

pub fn image_format_to_string(format: image::ImageFormat) -> String {
    match format {
        image::ImageFormat::Jpeg => "JPEG",
        image::ImageFormat::Png => "PNG",
        image::ImageFormat::Gif => "GIF",
        image::ImageFormat::WebP => "WebP",
        image::ImageFormat::Tiff => "TIFF",
        image::ImageFormat::Bmp => "BMP",
        _ => "Unknown",
    }
    .to_string()
}
