// src/codecs/jpeg.rs
//
// JPEG via mozjpeg (libjpeg-turbo). No alpha: transparency is flattened onto the
// background colour before the scanlines reach the encoder.

use super::{CodecCapabilities, FormatCodec};
use crate::engine::common::run_with_panic_policy;
use crate::engine::{check_dimensions, PixelBuffer};
use crate::error::{PixpipeError, Result};
use crate::ops::{OutputFormat, Quality};
use mozjpeg::{ColorSpace, Compress, Decompress};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JpegCodec {
    /// Colour transparent pixels are composited onto
    pub background: [u8; 3],
    /// Progressive scan order
    pub progressive: bool,
    /// Optimized Huffman tables (smaller output, slower encode)
    pub optimize_coding: bool,
}

impl JpegCodec {
    pub fn new(background: [u8; 3]) -> Self {
        Self {
            background,
            progressive: false,
            optimize_coding: true,
        }
    }
}

impl Default for JpegCodec {
    fn default() -> Self {
        Self::new(crate::config::WHITE)
    }
}

impl FormatCodec for JpegCodec {
    fn format(&self) -> OutputFormat {
        OutputFormat::Jpeg
    }

    fn capabilities(&self) -> CodecCapabilities {
        CodecCapabilities::LOSSY | CodecCapabilities::QUALITY
    }

    fn encode(&self, buffer: &PixelBuffer, quality: Quality) -> Result<Vec<u8>> {
        run_with_panic_policy("encode:jpeg", || {
            let (w, h) = buffer.dimensions();
            let rgb = buffer.to_rgb_flattened(self.background);

            let mut comp = Compress::new(ColorSpace::JCS_RGB);
            comp.set_size(w as usize, h as usize);
            comp.set_color_space(ColorSpace::JCS_YCbCr);
            // mozjpeg's native scale is already 1-100
            comp.set_quality(quality.value() as f32);
            comp.set_chroma_sampling_pixel_sizes((2, 2), (2, 2));
            if self.progressive {
                comp.set_progressive_mode();
            }
            comp.set_optimize_coding(self.optimize_coding);

            let estimated_size = (w as usize * h as usize * 3 / 10).max(4096);
            let mut output = Vec::with_capacity(estimated_size);
            {
                let mut writer = comp
                    .start_compress(&mut output)
                    .map_err(|e| PixpipeError::encode_failed("jpeg", e))?;

                let stride = w as usize * 3;
                for row in rgb.chunks(stride) {
                    writer
                        .write_scanlines(row)
                        .map_err(|e| PixpipeError::encode_failed("jpeg", e))?;
                }

                writer
                    .finish()
                    .map_err(|e| PixpipeError::encode_failed("jpeg", e))?;
            }
            Ok(output)
        })
    }

    fn decode(&self, data: &[u8]) -> Result<PixelBuffer> {
        run_with_panic_policy("decode:jpeg", || {
            if !data.windows(2).any(|pair| pair == [0xFF, 0xD9]) {
                return Err(PixpipeError::decode_failed(
                    "jpeg",
                    "missing JPEG EOI marker",
                ));
            }

            let mut decompress = Decompress::new_mem(data)
                .and_then(|d| d.rgb())
                .map_err(|e| PixpipeError::decode_failed("jpeg", e))?;

            let width = u32::try_from(decompress.width()).unwrap_or(u32::MAX);
            let height = u32::try_from(decompress.height()).unwrap_or(u32::MAX);
            check_dimensions(width, height)?;

            let pixels: Vec<[u8; 3]> = decompress
                .read_scanlines()
                .map_err(|e| PixpipeError::decode_failed("jpeg", e))?;
            let flat: Vec<u8> = pixels.into_iter().flatten().collect();

            Ok(PixelBuffer::from_rgb(width, height, flat)?.into_rgba())
        })
    }
}
