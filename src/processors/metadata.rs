// slicekit/src/processors/metadata.rs
use crate::core::{Dpi, Result, SliceKitError};
use exif::{Exif, In, Reader, Tag, Value};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

const JFIF_HEADER_LEN: usize = 18;

/// Reads print resolution from the containers that carry it.
pub struct DpiReader;

impl DpiReader {
    pub fn new() -> Self {
        Self
    }

    /// Resolution stored in the file, if any. Missing or unreadable metadata is not an error.
    pub fn read_dpi(&self, path: &Path, format: Option<image::ImageFormat>) -> Option<Dpi> {
        let dpi = match format {
            Some(image::ImageFormat::Png) => self.read_png(path),
            Some(image::ImageFormat::Jpeg) => self.read_jfif(path),
            _ => None,
        };

        let dpi = dpi.or_else(|| match self.read_exif(path) {
            Ok(Some(exif)) => self.dpi_from_exif(&exif),
            Ok(None) => None,
            Err(e) => {
                log::debug!("{}", e);
                None
            }
        });

        match dpi {
            Some(dpi) if dpi.x > 0 && dpi.y > 0 => {
                log::debug!("Found {} in {}", dpi, path.display());
                Some(dpi)
            }
            _ => None,
        }
    }

    fn read_png(&self, path: &Path) -> Option<Dpi> {
        let file = File::open(path).ok()?;
        let decoder = png::Decoder::new(BufReader::new(file));
        let reader = decoder.read_info().ok()?;
        let dims = reader.info().pixel_dims?;

        match dims.unit {
            png::Unit::Meter => Some(Dpi::from_pixels_per_meter(dims.xppu, dims.yppu)),
            png::Unit::Unspecified => None,
        }
    }

    fn read_jfif(&self, path: &Path) -> Option<Dpi> {
        let mut header = [0u8; JFIF_HEADER_LEN];
        File::open(path).ok()?.read_exact(&mut header).ok()?;
        parse_jfif_density(&header)
    }

    pub fn read_exif(&self, path: &Path) -> Result<Option<Exif>> {
        let file = File::open(path)?;
        let mut bufreader = BufReader::new(&file);

        match Reader::new().read_from_container(&mut bufreader) {
            Ok(exif) => Ok(Some(exif)),
            Err(exif::Error::NotFound(_)) => Ok(None),
            Err(e) => Err(SliceKitError::ProcessingError(format!(
                "EXIF read error in {}: {}",
                path.display(),
                e
            ))),
        }
    }

    pub fn dpi_from_exif(&self, exif: &Exif) -> Option<Dpi> {
        let x = rational_field(exif, Tag::XResolution)?;
        let y = rational_field(exif, Tag::YResolution).unwrap_or(x);
        let unit = exif
            .get_field(Tag::ResolutionUnit, In::PRIMARY)
            .and_then(|f| f.value.get_uint(0))
            .unwrap_or(2);

        match unit {
            2 => Some(Dpi::new(x.round() as u32, y.round() as u32)),
            3 => Some(Dpi::from_dots_per_cm(x, y)),
            _ => None,
        }
    }
}

impl Default for DpiReader {
    fn default() -> Self {
        Self::new()
    }
}

fn rational_field(exif: &Exif, tag: Tag) -> Option<f64> {
    match exif.get_field(tag, In::PRIMARY).map(|f| &f.value) {
        Some(Value::Rational(values)) if !values.is_empty() && values[0].denom != 0 => {
            Some(values[0].to_f64())
        }
        _ => None,
    }
}

/// Density from a JFIF APP0 segment directly after SOI.
fn parse_jfif_density(header: &[u8]) -> Option<Dpi> {
    if header.len() < JFIF_HEADER_LEN
        || header[0..4] != [0xFF, 0xD8, 0xFF, 0xE0]
        || &header[6..11] != b"JFIF\0"
    {
        return None;
    }

    let x = u16::from_be_bytes([header[14], header[15]]);
    let y = u16::from_be_bytes([header[16], header[17]]);

    match header[13] {
        1 => Some(Dpi::new(x as u32, y as u32)),
        2 => Some(Dpi::from_dots_per_cm(x as f64, y as f64)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn jfif(unit: u8, x: u16, y: u16) -> Vec<u8> {
        let mut header = vec![0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10];
        header.extend_from_slice(b"JFIF\0");
        header.extend_from_slice(&[1, 1, unit]);
        header.extend_from_slice(&x.to_be_bytes());
        header.extend_from_slice(&y.to_be_bytes());
        header
    }

    #[test]
    fn jfif_density_in_inches() {
        assert_eq!(parse_jfif_density(&jfif(1, 300, 150)), Some(Dpi::new(300, 150)));
    }

    #[test]
    fn jfif_density_in_centimeters() {
        assert_eq!(parse_jfif_density(&jfif(2, 118, 118)), Some(Dpi::new(300, 300)));
    }

    #[test]
    fn jfif_aspect_only_has_no_dpi() {
        assert_eq!(parse_jfif_density(&jfif(0, 1, 1)), None);
        assert_eq!(parse_jfif_density(b"not a jpeg at all!"), None);
    }
}
