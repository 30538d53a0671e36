// src/engine/validate.rs
//
// Input guards applied before any pixel is decoded: byte size, sniffed MIME type
// against the allow-list, and header dimensions against the configured box.

use super::decoder::SourceFormat;
use super::{MAX_DIMENSION, MAX_PIXELS};
use crate::codecs::ico;
use crate::config::PipelineConfig;
use crate::error::{PixpipeError, Result};
use image::ImageReader;
use std::io::Cursor;
use tracing::debug;

/// MIME types accepted as pipeline input.
pub const ALLOWED_MIME_TYPES: [&str; 9] = [
    "image/jpeg",
    "image/png",
    "image/webp",
    "image/gif",
    "image/bmp",
    "image/heic",
    "image/heif",
    "image/x-icon",
    "image/vnd.microsoft.icon",
];

/// ISO-BMFF brands that identify HEIC/HEIF content.
const HEIC_BRANDS: [&[u8; 4]; 10] = [
    b"heic", b"heix", b"hevc", b"heim", b"heis", b"hevm", b"hevs", b"mif1", b"msf1", b"heif",
];

/// Only this much of the input is inspected for an `ftyp` box.
const SNIFF_LEN: usize = 512;

/// Check image dimensions against the global limits.
/// Returns an error if the image is too large (potential decompression bomb).
pub fn check_dimensions(width: u32, height: u32) -> Result<()> {
    InputGuard::default().enforce_pixels(width, height)
}

/// Limits applied to one input.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct InputGuard {
    pub max_bytes: u64,
    pub max_dimension: u32,
    pub max_pixels: u64,
}

impl Default for InputGuard {
    fn default() -> Self {
        Self {
            max_bytes: super::MAX_FILE_SIZE,
            max_dimension: MAX_DIMENSION,
            max_pixels: MAX_PIXELS,
        }
    }
}

impl From<&PipelineConfig> for InputGuard {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            max_bytes: config.max_file_size,
            max_dimension: config.max_dimension,
            max_pixels: config.max_pixels,
        }
    }
}

impl InputGuard {
    pub fn enforce_source_len(&self, len: usize) -> Result<()> {
        let len_u64 = len as u64;
        if len_u64 > self.max_bytes {
            return Err(PixpipeError::file_too_large(len_u64, self.max_bytes));
        }
        Ok(())
    }

    pub fn enforce_pixels(&self, width: u32, height: u32) -> Result<()> {
        if width > self.max_dimension || height > self.max_dimension {
            return Err(PixpipeError::dimension_exceeds_limit(
                width.max(height),
                self.max_dimension,
            ));
        }
        let pixels = width as u64 * height as u64;
        if pixels > self.max_pixels {
            return Err(PixpipeError::pixel_count_exceeds_limit(
                pixels,
                self.max_pixels,
            ));
        }
        Ok(())
    }

    /// Sniff the input and map it onto a decodable source format.
    pub fn enforce_mime(&self, bytes: &[u8]) -> Result<SourceFormat> {
        let mime = sniff_mime(bytes);
        if !ALLOWED_MIME_TYPES.contains(&mime) {
            return Err(PixpipeError::unsupported_mime(mime));
        }
        SourceFormat::from_mime(mime).ok_or_else(|| PixpipeError::unsupported_mime(mime))
    }

    /// Dimensions from the container header, when they can be read without decoding.
    pub fn enforce_header_dimensions(&self, bytes: &[u8], format: SourceFormat) -> Result<()> {
        let dims = match format {
            SourceFormat::Ico => {
                let count = ico::validate_header(bytes)?;
                let entries = ico::scan_directory(bytes, count)?;
                ico::select_best_entry(&entries).map(|e| (e.width, e.height))
            }
            // Transcoded first; checked after decode
            SourceFormat::Heic => None,
            _ => ImageReader::new(Cursor::new(bytes))
                .with_guessed_format()
                .ok()
                .and_then(|reader| reader.into_dimensions().ok()),
        };
        match dims {
            Some((w, h)) => self.enforce_pixels(w, h),
            None => Ok(()),
        }
    }
}

/// MIME type of `bytes` from magic numbers. Unknown content is `application/octet-stream`.
pub fn sniff_mime(bytes: &[u8]) -> &'static str {
    if let Some(mime) = sniff_heic(bytes) {
        return mime;
    }
    if bytes.starts_with(&ico::ICO_SIGNATURE) {
        return "image/x-icon";
    }
    if bytes.starts_with(b"%PDF-") {
        return "application/pdf";
    }
    match image::guess_format(bytes) {
        Ok(format) => format.to_mime_type(),
        Err(_) => "application/octet-stream",
    }
}

fn sniff_heic(bytes: &[u8]) -> Option<&'static str> {
    if bytes.len() < 12 || &bytes[4..8] != b"ftyp" {
        return None;
    }
    let box_len = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize;
    let end = box_len.min(bytes.len()).min(SNIFF_LEN);

    // major brand at 8, minor version at 12, compatible brands from 16
    let major = std::iter::once(8usize);
    let compatible = (16..end).step_by(4);
    for at in major.chain(compatible) {
        if at + 4 > end.max(12) {
            break;
        }
        let brand = &bytes[at..at + 4];
        if HEIC_BRANDS.iter().any(|b| b.as_slice() == brand) {
            return Some(match brand {
                b"mif1" | b"msf1" | b"heif" => "image/heif",
                _ => "image/heic",
            });
        }
    }
    None
}

/// Run every input guard: size, MIME allow-list, header dimensions.
pub fn validate_input(bytes: &[u8], config: &PipelineConfig) -> Result<SourceFormat> {
    let guard = InputGuard::from(config);
    guard.enforce_source_len(bytes.len())?;
    let format = guard.enforce_mime(bytes)?;
    guard.enforce_header_dimensions(bytes, format)?;
    debug!(format = format.as_str(), len = bytes.len(), "input accepted");
    Ok(format)
}
