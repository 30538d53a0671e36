// src/codecs/gif.rs
//
// GIF: single frame, palette of 2-256 entries derived from quality
// (colors = clamp(round(quality * 256 / 100), 2, 256)), one transparent index.
// The quantized frame has at most 256 distinct RGBA values, so the gif encoder
// keeps the palette exactly instead of running its own NeuQuant pass.

use super::palette::{self, MAX_COLORS, MIN_COLORS};
use super::{CodecCapabilities, FormatCodec};
use crate::engine::common::run_with_panic_policy;
use crate::engine::{check_dimensions, PixelBuffer};
use crate::error::{PixpipeError, Result};
use crate::ops::{OutputFormat, Quality};
use image::codecs::gif::GifEncoder;
use image::{ExtendedColorType, ImageFormat};

/// Palette size for a normalized quality.
pub fn palette_size_for(quality: Quality) -> u16 {
    let colors = (quality.value() as u32 * 256 + 50) / 100;
    (colors as u16).clamp(MIN_COLORS, MAX_COLORS)
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GifCodec {
    /// Explicit palette size; `None` derives it from quality
    pub colors: Option<u16>,
    /// Floyd-Steinberg error diffusion
    pub dither: bool,
}

impl Default for GifCodec {
    fn default() -> Self {
        Self {
            colors: None,
            dither: true,
        }
    }
}

impl GifCodec {
    pub fn palette_size(&self, quality: Quality) -> u16 {
        self.colors
            .map(|c| c.clamp(MIN_COLORS, MAX_COLORS))
            .unwrap_or_else(|| palette_size_for(quality))
    }
}

impl FormatCodec for GifCodec {
    fn format(&self) -> OutputFormat {
        OutputFormat::Gif
    }

    fn capabilities(&self) -> CodecCapabilities {
        CodecCapabilities::TRANSPARENCY
            | CodecCapabilities::LOSSY
            | CodecCapabilities::QUALITY
            | CodecCapabilities::PALETTE
    }

    fn encode(&self, buffer: &PixelBuffer, quality: Quality) -> Result<Vec<u8>> {
        run_with_panic_policy("encode:gif", || {
            let (w, h) = buffer.dimensions();
            if w > u16::MAX as u32 || h > u16::MAX as u32 {
                return Err(PixpipeError::dimension_exceeds_limit(
                    w.max(h),
                    u16::MAX as u32,
                ));
            }

            let indexed = palette::quantize(buffer, self.palette_size(quality), self.dither);
            let frame = indexed.to_rgba();

            let mut output = Vec::new();
            {
                // Trailer is written when the encoder drops
                let mut encoder = GifEncoder::new_with_speed(&mut output, 10);
                encoder
                    .encode(frame.as_bytes(), w, h, ExtendedColorType::Rgba8)
                    .map_err(|e| PixpipeError::encode_failed("gif", e))?;
            }
            Ok(output)
        })
    }

    fn decode(&self, data: &[u8]) -> Result<PixelBuffer> {
        run_with_panic_policy("decode:gif", || {
            // First frame only
            let img = image::load_from_memory_with_format(data, ImageFormat::Gif)
                .map_err(|e| PixpipeError::decode_failed("gif", e))?;
            check_dimensions(img.width(), img.height())?;
            Ok(PixelBuffer::from_dynamic(img))
        })
    }
}
