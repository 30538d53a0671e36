// src/codecs/bmp.rs
//
// BMP: uncompressed 24-bit, no alpha, no quality concept.

use super::{CodecCapabilities, FormatCodec};
use crate::engine::common::run_with_panic_policy;
use crate::engine::{check_dimensions, PixelBuffer};
use crate::error::{PixpipeError, Result};
use crate::ops::{OutputFormat, Quality};
use image::codecs::bmp::BmpEncoder;
use image::{ExtendedColorType, ImageEncoder, ImageFormat};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BmpCodec {
    /// Colour transparent pixels are composited onto
    pub background: [u8; 3],
}

impl BmpCodec {
    pub fn new(background: [u8; 3]) -> Self {
        Self { background }
    }
}

impl Default for BmpCodec {
    fn default() -> Self {
        Self::new(crate::config::WHITE)
    }
}

impl FormatCodec for BmpCodec {
    fn format(&self) -> OutputFormat {
        OutputFormat::Bmp
    }

    fn capabilities(&self) -> CodecCapabilities {
        CodecCapabilities::LOSSLESS
    }

    /// `quality` is accepted for interface uniformity and ignored.
    fn encode(&self, buffer: &PixelBuffer, _quality: Quality) -> Result<Vec<u8>> {
        run_with_panic_policy("encode:bmp", || {
            let (w, h) = buffer.dimensions();
            let rgb = buffer.to_rgb_flattened(self.background);
            let mut output = Vec::with_capacity(rgb.len() + 54 + h as usize * 4);
            BmpEncoder::new(&mut output)
                .write_image(&rgb, w, h, ExtendedColorType::Rgb8)
                .map_err(|e| PixpipeError::encode_failed("bmp", e))?;
            Ok(output)
        })
    }

    fn decode(&self, data: &[u8]) -> Result<PixelBuffer> {
        run_with_panic_policy("decode:bmp", || {
            let img = image::load_from_memory_with_format(data, ImageFormat::Bmp)
                .map_err(|e| PixpipeError::decode_failed("bmp", e))?;
            check_dimensions(img.width(), img.height())?;
            Ok(PixelBuffer::from_dynamic(img))
        })
    }
}
