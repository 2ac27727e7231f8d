// slicekit/src/processors/loader.rs
use crate::core::{Image, ImageMetadata, Result, SliceKitError, SourceFormat};
use crate::processors::metadata::DpiReader;
use crate::utils::{image_format_to_string, is_layered_document};
use image::{ColorType, DynamicImage, ImageDecoder, ImageReader, RgbaImage};
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Signature, version, reserved bytes, channels, height, width, depth, color mode.
const PSD_HEADER_LEN: usize = 26;

#[derive(Clone)]
pub struct Loader {
    max_dimensions: Option<(u32, u32)>,
    max_psd_bytes: u64,
}

impl Loader {
    pub fn new() -> Self {
        Self {
            max_dimensions: Some((100_000, 100_000)),
            max_psd_bytes: 2048 * 1024 * 1024,
        }
    }

    pub fn with_max_dimensions(mut self, width: u32, height: u32) -> Self {
        self.max_dimensions = Some((width, height));
        self
    }

    pub fn with_max_psd_bytes(mut self, bytes: u64) -> Self {
        self.max_psd_bytes = bytes;
        self
    }

    pub fn load(&self, path: &Path) -> Result<Image> {
        log::debug!("Loading image from: {}", path.display());

        self.validate_path(path)?;

        let image = if is_layered_document(path) {
            self.load_layered(path)?
        } else {
            self.load_raster(path)?
        };

        self.check_dimensions(path, image.width(), image.height())?;

        log::info!(
            "Loaded image: {}x{} pixels, color: {:?}, {}",
            image.width(),
            image.height(),
            image.color(),
            image
                .dpi()
                .map(|d| d.to_string())
                .unwrap_or_else(|| "no dpi".to_string())
        );

        Ok(image)
    }

    fn load_raster(&self, path: &Path) -> Result<Image> {
        let mut reader = ImageReader::open(path)?
            .with_guessed_format()
            .map_err(|e| SliceKitError::decode(path, e))?;

        let format = reader.format().ok_or_else(|| {
            SliceKitError::decode(path, "unrecognised image format")
        })?;

        // Dimensions are checked separately; tall strips easily exceed the default allocation cap.
        reader.no_limits();

        let pixels = reader
            .decode()
            .map_err(|e| SliceKitError::decode(path, e))?;
        let dpi = DpiReader::new().read_dpi(path, Some(format));

        Ok(Image::new(pixels, dpi, Some(SourceFormat::Raster(format))))
    }

    fn load_layered(&self, path: &Path) -> Result<Image> {
        let file_size = path.metadata()?.len();
        if file_size > self.max_psd_bytes {
            return Err(SliceKitError::MemoryLimitExceeded(format!(
                "{} is {} bytes, limit is {}",
                path.display(),
                file_size,
                self.max_psd_bytes
            )));
        }

        let (width, height) = read_psd_dimensions(path)?;
        self.check_dimensions(path, width, height)?;

        let bytes = std::fs::read(path)?;
        // The psd parser indexes section lengths unchecked and panics on truncated files.
        let parsed = std::panic::catch_unwind(|| {
            psd::Psd::from_bytes(&bytes).map(|document| {
                (document.width(), document.height(), document.rgba())
            })
        });
        let (width, height, rgba) = match parsed {
            Ok(Ok(decoded)) => decoded,
            Ok(Err(e)) => return Err(SliceKitError::decode(path, e)),
            Err(_) => return Err(SliceKitError::decode(path, "truncated or malformed document")),
        };

        let composite = RgbaImage::from_raw(width, height, rgba).ok_or_else(|| {
            SliceKitError::decode(path, "composite layer has the wrong size")
        })?;

        Ok(Image::new(
            DynamicImage::ImageRgba8(composite),
            None,
            Some(SourceFormat::Psd),
        ))
    }

    /// Header-only inspection: dimensions, format, color and DPI without decoding pixels.
    pub fn probe(&self, path: &Path) -> Result<ImageMetadata> {
        self.validate_path(path)?;
        let file_size = path.metadata()?.len();

        if is_layered_document(path) {
            let (width, height) = read_psd_dimensions(path)?;
            return Ok(ImageMetadata {
                path: path.to_path_buf(),
                width,
                height,
                format: "PSD".to_string(),
                color: Some(ColorType::Rgba8),
                dpi: None,
                file_size,
            });
        }

        let reader = ImageReader::open(path)?
            .with_guessed_format()
            .map_err(|e| SliceKitError::decode(path, e))?;
        let format = reader
            .format()
            .ok_or_else(|| SliceKitError::decode(path, "unrecognised image format"))?;
        let decoder = reader
            .into_decoder()
            .map_err(|e| SliceKitError::decode(path, e))?;
        let (width, height) = decoder.dimensions();
        let color = decoder.color_type();

        Ok(ImageMetadata {
            path: path.to_path_buf(),
            width,
            height,
            format: image_format_to_string(format),
            color: Some(color),
            dpi: DpiReader::new().read_dpi(path, Some(format)),
            file_size,
        })
    }

    fn check_dimensions(&self, path: &Path, width: u32, height: u32) -> Result<()> {
        if width == 0 || height == 0 {
            return Err(SliceKitError::decode(path, "image has no pixels"));
        }

        if let Some((max_w, max_h)) = self.max_dimensions {
            if width > max_w || height > max_h {
                return Err(SliceKitError::MemoryLimitExceeded(format!(
                    "Image dimensions {}x{} exceed maximum {}x{}",
                    width, height, max_w, max_h
                )));
            }
        }
        Ok(())
    }

    fn validate_path(&self, path: &Path) -> Result<()> {
        if !path.exists() {
            return Err(SliceKitError::InvalidParameter(format!(
                "File does not exist: {}",
                path.display()
            )));
        }

        if !path.is_file() {
            return Err(SliceKitError::InvalidParameter(format!(
                "Not a file: {}",
                path.display()
            )));
        }

        let metadata = path.metadata()?;
        if metadata.len() == 0 {
            return Err(SliceKitError::decode(path, "file is empty"));
        }

        Ok(())
    }
}

/// Width and height from a PSD/PSB file header, big-endian at bytes 14..22.
fn read_psd_dimensions(path: &Path) -> Result<(u32, u32)> {
    let mut header = [0u8; PSD_HEADER_LEN];
    File::open(path)?
        .read_exact(&mut header)
        .map_err(|e| SliceKitError::decode(path, e))?;

    if &header[0..4] != b"8BPS" {
        return Err(SliceKitError::decode(path, "missing 8BPS signature"));
    }
    let version = u16::from_be_bytes([header[4], header[5]]);
    if version != 1 && version != 2 {
        return Err(SliceKitError::decode(
            path,
            format!("unknown document version {}", version),
        ));
    }

    let height = u32::from_be_bytes([header[14], header[15], header[16], header[17]]);
    let width = u32::from_be_bytes([header[18], header[19], header[20], header[21]]);
    Ok((width, height))
}

impl Default for Loader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    #[test]
    fn loads_png_and_probes_header() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("strip.png");
        RgbImage::from_pixel(12, 40, Rgb([10, 20, 30])).save(&path).unwrap();

        let loader = Loader::new();
        let image = loader.load(&path).unwrap();
        assert_eq!(image.dimensions(), (12, 40));
        assert_eq!(
            image.source_format(),
            Some(SourceFormat::Raster(image::ImageFormat::Png))
        );

        let info = loader.probe(&path).unwrap();
        assert_eq!((info.width, info.height), (12, 40));
        assert_eq!(info.format, "PNG");
    }

    #[test]
    fn corrupt_file_is_a_decode_error_with_path() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("broken.png");
        std::fs::write(&path, b"this is not a png").unwrap();

        match Loader::new().load(&path) {
            Err(SliceKitError::Decode { path: p, .. }) => assert_eq!(p, path),
            other => panic!("expected decode error, got {:?}", other.map(|i| i.dimensions())),
        }
    }

    /// Flat 8-bit RGB document, raw (uncompressed) image data, no layers.
    fn tiny_psd(width: u32, height: u32, rgb: [u8; 3]) -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(b"8BPS");
        bytes.extend_from_slice(&1u16.to_be_bytes());
        bytes.extend_from_slice(&[0; 6]);
        bytes.extend_from_slice(&3u16.to_be_bytes());
        bytes.extend_from_slice(&height.to_be_bytes());
        bytes.extend_from_slice(&width.to_be_bytes());
        bytes.extend_from_slice(&8u16.to_be_bytes());
        bytes.extend_from_slice(&3u16.to_be_bytes());
        // color mode data, image resources, layer and mask info
        for _ in 0..3 {
            bytes.extend_from_slice(&0u32.to_be_bytes());
        }
        bytes.extend_from_slice(&0u16.to_be_bytes());
        for value in rgb {
            bytes.extend(std::iter::repeat(value).take((width * height) as usize));
        }
        bytes
    }

    #[test]
    fn layered_document_dimensions_come_from_header() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("cover.psd");
        let mut bytes = tiny_psd(6, 9, [1, 2, 3]);
        // Color mode section claims 1000 bytes that are not there.
        bytes.truncate(PSD_HEADER_LEN);
        bytes.extend_from_slice(&1000u32.to_be_bytes());
        std::fs::write(&path, bytes).unwrap();

        let loader = Loader::new();
        let info = loader.probe(&path).unwrap();
        assert_eq!((info.width, info.height), (6, 9));
        assert_eq!(info.format, "PSD");

        assert!(matches!(loader.load(&path), Err(SliceKitError::Decode { .. })));
    }

    #[test]
    fn layered_document_loads_composite() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("cover.psd");
        std::fs::write(&path, tiny_psd(4, 3, [10, 20, 30])).unwrap();

        let image = Loader::new().load(&path).unwrap();
        assert_eq!(image.dimensions(), (4, 3));
        assert_eq!(image.source_format(), Some(SourceFormat::Psd));
        assert_eq!(image.pixels().to_rgba8().get_pixel(2, 1).0, [10, 20, 30, 255]);
    }

    #[test]
    fn unparseable_layered_documents_are_decode_errors() {
        let tmp = tempfile::tempdir().unwrap();
        let loader = Loader::new();

        for name in ["broken.psd", "broken.psb"] {
            let path = tmp.path().join(name);
            std::fs::write(&path, vec![b'x'; 64]).unwrap();
            assert!(matches!(loader.load(&path), Err(SliceKitError::Decode { .. })));
            assert!(matches!(loader.probe(&path), Err(SliceKitError::Decode { .. })));
        }
    }

    #[test]
    fn layered_document_size_limit_is_enforced() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("cover.psd");
        std::fs::write(&path, tiny_psd(4, 3, [0, 0, 0])).unwrap();

        let loader = Loader::new().with_max_psd_bytes(1);
        assert!(matches!(
            loader.load(&path),
            Err(SliceKitError::MemoryLimitExceeded(_))
        ));
    }

    #[test]
    fn dimension_limit_is_enforced() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("tall.png");
        RgbImage::new(4, 64).save(&path).unwrap();

        let loader = Loader::new().with_max_dimensions(100, 32);
        assert!(matches!(
            loader.load(&path),
            Err(SliceKitError::MemoryLimitExceeded(_))
        ));
    }
}
