// src/engine/convert.rs
//
// ConversionManager: codec selection plus the preprocessing every encode goes
// through. Alpha is flattened here for codecs that cannot carry it, so no
// encoder ever sees alpha it would have to drop on its own.

use super::buffer::PixelBuffer;
use crate::codecs::{palette, Codec, CodecRegistry, FormatCodec};
use crate::error::Result;
use crate::ops::{ConversionOptions, OutputFormat, Quality};
use tracing::debug;

/// A buffer ready for its terminal encode, with the codec that will encode it.
///
/// Consumed by serialization; it is not reused afterwards.
#[derive(Clone, Debug)]
pub struct ProcessedImage {
    pub buffer: PixelBuffer,
    pub format: OutputFormat,
    pub quality: Quality,
    pub codec: Codec,
}

impl ProcessedImage {
    pub fn dimensions(&self) -> (u32, u32) {
        self.buffer.dimensions()
    }

    /// Terminal encode.
    pub fn serialize(self) -> Result<Vec<u8>> {
        self.codec.encode(&self.buffer, self.quality)
    }
}

/// Applies the uniform quality knob and transparency handling across codecs.
#[derive(Clone, Copy, Debug)]
pub struct ConversionManager<'r> {
    registry: &'r CodecRegistry,
}

impl<'r> ConversionManager<'r> {
    pub fn new(registry: &'r CodecRegistry) -> Self {
        Self { registry }
    }

    /// Select and tune the codec, then preprocess `buffer` for it.
    pub fn prepare(&self, buffer: PixelBuffer, options: &ConversionOptions) -> Result<ProcessedImage> {
        let codec = self.registry.configured(options)?;
        let buffer = self.preprocess(buffer, options, &codec);
        Ok(ProcessedImage {
            buffer,
            format: options.format,
            quality: options.quality,
            codec,
        })
    }

    /// Prepare and encode in one step.
    pub fn convert(&self, buffer: PixelBuffer, options: &ConversionOptions) -> Result<Vec<u8>> {
        self.prepare(buffer, options)?.serialize()
    }

    fn preprocess(
        &self,
        buffer: PixelBuffer,
        options: &ConversionOptions,
        codec: &Codec,
    ) -> PixelBuffer {
        let mut buffer = buffer;

        if options.format == OutputFormat::Png && options.png.quantize_colors {
            let colors = options.png.max_colors;
            buffer = palette::quantize(&buffer, colors, false).to_rgba();
            debug!(colors, "png colours quantized");
        }

        if !codec.supports_transparency() && buffer.has_transparency() {
            debug!(format = options.format.as_str(), "flattening alpha");
            buffer = buffer.flatten_onto(self.registry.background());
        }

        buffer
    }
}
