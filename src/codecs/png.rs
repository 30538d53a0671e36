// src/codecs/png.rs
//
// PNG: always lossless. Quality selects compression effort, not fidelity:
// level = round(quality * 9 / 100). Encode with the image crate, recompress with
// oxipng when asked to optimize, decode with zune-png.

use super::{CodecCapabilities, FormatCodec};
use crate::engine::common::run_with_panic_policy;
use crate::engine::{check_dimensions, PixelBuffer, PixelFormat};
use crate::error::{PixpipeError, Result};
use crate::ops::{OutputFormat, Quality};
use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::{DynamicImage, ExtendedColorType, GrayAlphaImage, GrayImage, ImageEncoder};
use zune_core::colorspace::ColorSpace;
use zune_core::bytestream::ZCursor;
use zune_core::options::DecoderOptions;
use zune_png::PngDecoder;

/// PNG file signature.
pub const PNG_SIGNATURE: [u8; 8] = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];

/// Compression effort 0-9 for a normalized quality.
pub fn compression_level_for(quality: Quality) -> u8 {
    ((quality.value() as u32 * 9 + 50) / 100) as u8
}

fn compression_type(level: u8) -> CompressionType {
    match level {
        0..=2 => CompressionType::Fast,
        3..=6 => CompressionType::Default,
        _ => CompressionType::Best,
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PngCodec {
    /// Explicit 0-9 level; `None` derives it from quality
    pub compression_level: Option<u8>,
    /// Run oxipng over the encoded stream
    pub optimize: bool,
    /// Drop ancillary chunks when optimizing
    pub strip_metadata: bool,
}

impl Default for PngCodec {
    fn default() -> Self {
        Self {
            compression_level: None,
            optimize: false,
            strip_metadata: true,
        }
    }
}

impl PngCodec {
    pub fn level(&self, quality: Quality) -> u8 {
        self.compression_level
            .map(|l| l.min(9))
            .unwrap_or_else(|| compression_level_for(quality))
    }
}

impl FormatCodec for PngCodec {
    fn format(&self) -> OutputFormat {
        OutputFormat::Png
    }

    fn capabilities(&self) -> CodecCapabilities {
        CodecCapabilities::TRANSPARENCY | CodecCapabilities::LOSSLESS | CodecCapabilities::QUALITY
    }

    fn encode(&self, buffer: &PixelBuffer, quality: Quality) -> Result<Vec<u8>> {
        run_with_panic_policy("encode:png", || {
            let level = self.level(quality);
            let (w, h) = buffer.dimensions();
            let color = match buffer.format() {
                PixelFormat::Rgb8 => ExtendedColorType::Rgb8,
                PixelFormat::Rgba8 => ExtendedColorType::Rgba8,
            };

            let mut buf = Vec::new();
            PngEncoder::new_with_quality(&mut buf, compression_type(level), FilterType::Adaptive)
                .write_image(buffer.as_bytes(), w, h, color)
                .map_err(|e| PixpipeError::encode_failed("png", e))?;

            if !self.optimize {
                return Ok(buf);
            }

            // oxipng presets top out at 6
            let preset = (level as u32 * 6 / 9).min(6) as u8;
            let mut options = oxipng::Options::from_preset(preset);
            options.strip = if self.strip_metadata {
                oxipng::StripChunks::Safe
            } else {
                oxipng::StripChunks::None
            };
            oxipng::optimize_from_memory(&buf, &options)
                .map_err(|e| PixpipeError::encode_failed("png", e))
        })
    }

    fn decode(&self, data: &[u8]) -> Result<PixelBuffer> {
        run_with_panic_policy("decode:png", || {
            let options = DecoderOptions::default().png_set_strip_to_8bit(true);
            let mut decoder = PngDecoder::new_with_options(ZCursor::new(data), options);
            decoder
                .decode_headers()
                .map_err(|e| PixpipeError::decode_failed("png", e.to_string()))?;
            let (width, height) = decoder
                .info()
                .map(|info| (info.width as u32, info.height as u32))
                .ok_or_else(|| PixpipeError::decode_failed("png", "missing header info"))?;
            check_dimensions(width, height)?;

            let pixels = decoder
                .decode()
                .map_err(|e| PixpipeError::decode_failed("png", e.to_string()))?;
            let buf = match pixels {
                zune_core::result::DecodingResult::U8(v) => v,
                _ => {
                    return Err(PixpipeError::decode_failed(
                        "png",
                        "unexpected non-U8 pixel buffer",
                    ))
                }
            };

            let colorspace = decoder
                .colorspace()
                .ok_or_else(|| PixpipeError::decode_failed("png", "missing colorspace"))?;

            let malformed = || PixpipeError::decode_failed("png", "pixel data does not match header");
            let buffer = match colorspace {
                ColorSpace::RGBA => PixelBuffer::from_rgba(width, height, buf)?,
                ColorSpace::RGB => PixelBuffer::from_rgb(width, height, buf)?.into_rgba(),
                ColorSpace::Luma => GrayImage::from_raw(width, height, buf)
                    .map(|img| PixelBuffer::from_dynamic(DynamicImage::ImageLuma8(img)))
                    .ok_or_else(malformed)?,
                ColorSpace::LumaA => GrayAlphaImage::from_raw(width, height, buf)
                    .map(|img| PixelBuffer::from_dynamic(DynamicImage::ImageLumaA8(img)))
                    .ok_or_else(malformed)?,
                other => {
                    return Err(PixpipeError::decode_failed(
                        "png",
                        format!("unsupported colorspace {other:?}"),
                    ))
                }
            };
            Ok(buffer)
        })
    }
}
