// src/engine/optimize.rs
//
// Optional re-optimization pass. The converted image is encoded once more under
// per-level defaults and decoded back, so the terminal serialize step can stay
// the same whether or not the pass ran.

use super::buffer::PixelBuffer;
use super::convert::ProcessedImage;
use crate::codecs::{Codec, FormatCodec};
use crate::error::Result;
use crate::ops::{OutputFormat, Quality, QualityLevel};
use tracing::debug;

/// Samples per axis for the complexity estimate.
const COMPLEXITY_SAMPLES: u32 = 100;

/// Encoder defaults for one quality level.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OptimizeSettings {
    pub quality: Quality,
    /// JPEG only
    pub progressive: bool,
    /// PNG only
    pub compression_level: Option<u8>,
    pub strip_metadata: bool,
    /// Pick quality from image content (JPEG/WebP)
    pub auto_quality: bool,
}

impl OptimizeSettings {
    pub fn for_level(format: OutputFormat, level: QualityLevel) -> Self {
        let mut settings = Self {
            quality: level.quality(),
            progressive: false,
            compression_level: None,
            strip_metadata: true,
            auto_quality: false,
        };
        match format {
            OutputFormat::Jpeg => {
                settings.progressive = true;
                settings.auto_quality = true;
            }
            OutputFormat::Png => settings.compression_level = Some(9),
            OutputFormat::WebP => settings.auto_quality = true,
            OutputFormat::Gif | OutputFormat::Bmp => {}
        }
        // Metadata is kept from high upwards
        if matches!(level, QualityLevel::High | QualityLevel::Lossless) {
            settings.strip_metadata = false;
        }
        // Auto quality would turn a lossless WebP request into a lossy one
        if level == QualityLevel::Lossless {
            settings.auto_quality = false;
        }
        settings
    }

    /// Apply these settings to a copy of `codec`.
    fn tune(&self, codec: &Codec) -> Codec {
        match codec {
            Codec::Jpeg(c) => {
                let mut c = c.clone();
                c.progressive = self.progressive;
                Codec::Jpeg(c)
            }
            Codec::Png(c) => {
                let mut c = c.clone();
                c.compression_level = self.compression_level.or(c.compression_level);
                c.strip_metadata = self.strip_metadata;
                c.optimize = true;
                Codec::Png(c)
            }
            other => other.clone(),
        }
    }
}

/// Mean neighbour colour difference over a sample grid, in 0..=1.
pub fn estimate_complexity(buffer: &PixelBuffer) -> f64 {
    let (width, height) = buffer.dimensions();
    if width == 0 || height == 0 {
        return 0.0;
    }

    let mut variance = 0.0;
    let mut last = buffer.pixel(0, 0).unwrap_or_default();
    for i in 0..COMPLEXITY_SAMPLES {
        let x = (i as u64 * width as u64 / COMPLEXITY_SAMPLES as u64) as u32;
        for j in 0..COMPLEXITY_SAMPLES {
            let y = (j as u64 * height as u64 / COMPLEXITY_SAMPLES as u64) as u32;
            let current = buffer.pixel(x, y).unwrap_or_default();
            let diff: u32 = (0..3).map(|c| last[c].abs_diff(current[c]) as u32).sum();
            variance += diff as f64 / (255.0 * 3.0);
            last = current;
        }
    }
    variance / (COMPLEXITY_SAMPLES * COMPLEXITY_SAMPLES) as f64
}

/// Content-driven quality, never above `ceiling`.
pub fn auto_quality(buffer: &PixelBuffer, ceiling: Quality) -> Quality {
    let complexity = estimate_complexity(buffer);
    let picked = if complexity < 0.3 {
        70
    } else if complexity < 0.6 {
        80
    } else {
        90
    };
    let quality = Quality::new(picked).min(ceiling);
    debug!(complexity, quality = quality.value(), "auto quality");
    quality
}

/// Encode `image` under its level's defaults and decode the result back.
///
/// The effective quality is the level's quality capped by the requested one
/// (and lowered further by auto quality), so the pass never raises quality
/// above what the caller asked for. BMP has no encoder knobs and is returned
/// unchanged.
pub fn optimize_round_trip(image: ProcessedImage) -> Result<ProcessedImage> {
    if image.format == OutputFormat::Bmp {
        return Ok(image);
    }

    let level = image.quality.level();
    let settings = OptimizeSettings::for_level(image.format, level);
    let ceiling = settings.quality.min(image.quality);
    let quality = if settings.auto_quality {
        auto_quality(&image.buffer, ceiling)
    } else {
        ceiling
    };
    let codec = settings.tune(&image.codec);

    let encoded = codec.encode(&image.buffer, quality)?;
    let buffer = codec.decode(&encoded)?;
    debug!(
        format = image.format.as_str(),
        level = level.as_str(),
        requested = image.quality.value(),
        quality = quality.value(),
        bytes = encoded.len(),
        "optimize round trip"
    );

    Ok(ProcessedImage {
        buffer,
        format: image.format,
        quality,
        codec,
    })
}
