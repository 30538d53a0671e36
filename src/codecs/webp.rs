// src/codecs/webp.rs
//
// WebP via libwebp. Quality 100 (or the explicit lossless flag) selects lossless;
// everything else is lossy at the given quality. Opaque images are sent without
// an alpha plane.

use super::{CodecCapabilities, FormatCodec};
use crate::engine::common::run_with_panic_policy;
use crate::engine::{check_dimensions, PixelBuffer, PixelFormat};
use crate::error::{PixpipeError, Result};
use crate::ops::{OutputFormat, Quality};
use webp::{BitstreamFeatures, Decoder as WebPDecoder, Encoder as WebPEncoder, WebPConfig};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WebPCodec {
    /// Force lossless regardless of quality
    pub lossless: bool,
    /// Keep RGB under fully transparent pixels
    pub exact: bool,
    /// libwebp effort 0 (fast) - 6 (slow, smaller)
    pub method: i32,
}

impl Default for WebPCodec {
    fn default() -> Self {
        Self {
            lossless: false,
            exact: false,
            method: 4,
        }
    }
}

impl WebPCodec {
    pub fn is_lossless(&self, quality: Quality) -> bool {
        self.lossless || quality.is_max()
    }
}

impl FormatCodec for WebPCodec {
    fn format(&self) -> OutputFormat {
        OutputFormat::WebP
    }

    fn capabilities(&self) -> CodecCapabilities {
        CodecCapabilities::TRANSPARENCY
            | CodecCapabilities::LOSSY
            | CodecCapabilities::LOSSLESS
            | CodecCapabilities::QUALITY
    }

    fn encode(&self, buffer: &PixelBuffer, quality: Quality) -> Result<Vec<u8>> {
        run_with_panic_policy("encode:webp", || {
            let (w, h) = buffer.dimensions();

            // Drop the alpha plane when nothing uses it
            let rgb;
            let encoder = match buffer.format() {
                PixelFormat::Rgba8 if buffer.has_transparency() => {
                    WebPEncoder::from_rgba(buffer.as_bytes(), w, h)
                }
                PixelFormat::Rgba8 => {
                    rgb = buffer.to_rgb_flattened([0, 0, 0]);
                    WebPEncoder::from_rgb(&rgb, w, h)
                }
                PixelFormat::Rgb8 => WebPEncoder::from_rgb(buffer.as_bytes(), w, h),
            };

            let mut config = WebPConfig::new()
                .map_err(|_| PixpipeError::encode_failed("webp", "failed to create WebPConfig"))?;
            if self.is_lossless(quality) {
                config.lossless = 1;
                config.quality = 100.0;
            } else {
                config.lossless = 0;
                config.quality = quality.value() as f32;
            }
            config.method = self.method.clamp(0, 6);
            config.exact = i32::from(self.exact);

            let mem = encoder
                .encode_advanced(&config)
                .map_err(|e| PixpipeError::encode_failed("webp", format!("{e:?}")))?;
            Ok(mem.to_vec())
        })
    }

    fn decode(&self, data: &[u8]) -> Result<PixelBuffer> {
        run_with_panic_policy("decode:webp", || {
            // Parse header first to avoid allocating huge buffers on malformed files
            let features = BitstreamFeatures::new(data).ok_or_else(|| {
                PixpipeError::decode_failed("webp", "failed to read bitstream features")
            })?;
            check_dimensions(features.width(), features.height())?;

            if features.has_animation() {
                // Simple libwebp decoder has no animation support; first frame via image crate
                let img = image::load_from_memory_with_format(data, image::ImageFormat::WebP)
                    .map_err(|e| PixpipeError::decode_failed("webp", e))?;
                return Ok(PixelBuffer::from_dynamic(img));
            }

            let decoded = WebPDecoder::new(data)
                .decode()
                .ok_or_else(|| PixpipeError::decode_failed("webp", "libwebp decode failed"))?;
            Ok(PixelBuffer::from_dynamic(decoded.to_image()))
        })
    }
}
