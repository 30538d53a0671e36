// src/codecs/mod.rs
//
// Output codecs. One type per format behind the FormatCodec trait, a tagged
// union for static dispatch, and an immutable registry built once at startup.
// Adding a format means adding a variant here; call sites go through the registry.

pub mod bmp;
pub mod gif;
pub mod ico;
pub mod jpeg;
pub mod palette;
pub mod png;
pub mod webp;

pub use self::bmp::BmpCodec;
pub use self::gif::GifCodec;
pub use self::jpeg::JpegCodec;
pub use self::png::PngCodec;
pub use self::webp::WebPCodec;

use crate::engine::PixelBuffer;
use crate::error::{PixpipeError, Result};
use crate::ops::{ConversionOptions, OutputFormat, Quality};
use bitflags::bitflags;

bitflags! {
    /// What a codec can represent.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct CodecCapabilities: u8 {
        /// Encodes an alpha channel or transparent index
        const TRANSPARENCY = 1 << 0;
        /// Has a lossy mode
        const LOSSY = 1 << 1;
        /// Has a lossless mode
        const LOSSLESS = 1 << 2;
        /// The normalized quality knob changes the output
        const QUALITY = 1 << 3;
        /// Output is palette-indexed
        const PALETTE = 1 << 4;
    }
}

/// Format-specific encode/decode behind a uniform 1-100 quality knob.
pub trait FormatCodec: Send + Sync {
    fn format(&self) -> OutputFormat;

    fn capabilities(&self) -> CodecCapabilities;

    fn supports_transparency(&self) -> bool {
        self.capabilities().contains(CodecCapabilities::TRANSPARENCY)
    }

    /// Encode `buffer`. Codecs without alpha flatten it themselves.
    fn encode(&self, buffer: &PixelBuffer, quality: Quality) -> Result<Vec<u8>>;

    /// Decode to a canonical RGBA buffer.
    fn decode(&self, data: &[u8]) -> Result<PixelBuffer>;
}

/// Tagged union over the supported output codecs.
#[derive(Clone, Debug, PartialEq)]
pub enum Codec {
    Jpeg(JpegCodec),
    Png(PngCodec),
    WebP(WebPCodec),
    Gif(GifCodec),
    Bmp(BmpCodec),
}

impl Codec {
    /// Default-configured codec for `format`, flattening onto `background`.
    pub fn for_format(format: OutputFormat, background: [u8; 3]) -> Self {
        match format {
            OutputFormat::Jpeg => Codec::Jpeg(JpegCodec::new(background)),
            OutputFormat::Png => Codec::Png(PngCodec::default()),
            OutputFormat::WebP => Codec::WebP(WebPCodec::default()),
            OutputFormat::Gif => Codec::Gif(GifCodec::default()),
            OutputFormat::Bmp => Codec::Bmp(BmpCodec::new(background)),
        }
    }

    /// Copy of this codec with the per-format sub-options of `options` applied.
    pub fn with_options(&self, options: &ConversionOptions) -> Self {
        match self {
            Codec::Jpeg(c) => Codec::Jpeg(JpegCodec {
                progressive: options.progressive,
                ..c.clone()
            }),
            Codec::Png(c) => Codec::Png(PngCodec {
                compression_level: options.png.compression_level,
                strip_metadata: options.strip_metadata,
                ..c.clone()
            }),
            Codec::WebP(c) => Codec::WebP(WebPCodec {
                lossless: options.webp.lossless,
                exact: options.webp.exact,
                ..c.clone()
            }),
            Codec::Gif(_) => Codec::Gif(GifCodec {
                colors: options.gif.colors,
                dither: options.gif.dither,
            }),
            Codec::Bmp(c) => Codec::Bmp(c.clone()),
        }
    }

    fn inner(&self) -> &dyn FormatCodec {
        match self {
            Codec::Jpeg(c) => c,
            Codec::Png(c) => c,
            Codec::WebP(c) => c,
            Codec::Gif(c) => c,
            Codec::Bmp(c) => c,
        }
    }
}

impl FormatCodec for Codec {
    fn format(&self) -> OutputFormat {
        self.inner().format()
    }

    fn capabilities(&self) -> CodecCapabilities {
        self.inner().capabilities()
    }

    fn encode(&self, buffer: &PixelBuffer, quality: Quality) -> Result<Vec<u8>> {
        if buffer.is_empty() {
            return Err(PixpipeError::empty_image(buffer.width(), buffer.height()));
        }
        self.inner().encode(buffer, quality)
    }

    fn decode(&self, data: &[u8]) -> Result<PixelBuffer> {
        self.inner().decode(data)
    }
}

/// Immutable format -> codec table. Built once and shared by reference.
#[derive(Clone, Debug)]
pub struct CodecRegistry {
    codecs: Vec<Codec>,
    background: [u8; 3],
}

impl CodecRegistry {
    /// Registry with no codecs; populate with [`CodecRegistry::with_codec`].
    pub fn empty(background: [u8; 3]) -> Self {
        Self {
            codecs: Vec::new(),
            background,
        }
    }

    /// All five output formats with default settings.
    pub fn standard(background: [u8; 3]) -> Self {
        OutputFormat::ALL
            .iter()
            .fold(Self::empty(background), |registry, &format| {
                registry.with_codec(Codec::for_format(format, background))
            })
    }

    /// Register `codec`, replacing any codec for the same format.
    pub fn with_codec(mut self, codec: Codec) -> Self {
        let format = codec.format();
        self.codecs.retain(|c| c.format() != format);
        self.codecs.push(codec);
        self
    }

    pub fn background(&self) -> [u8; 3] {
        self.background
    }

    pub fn formats(&self) -> impl Iterator<Item = OutputFormat> + '_ {
        self.codecs.iter().map(|c| c.format())
    }

    pub fn get(&self, format: OutputFormat) -> Result<&Codec> {
        self.codecs
            .iter()
            .find(|c| c.format() == format)
            .ok_or_else(|| PixpipeError::unsupported_format(format.as_str()))
    }

    /// Registered codec for `options.format`, tuned by the request's sub-options.
    pub fn configured(&self, options: &ConversionOptions) -> Result<Codec> {
        Ok(self.get(options.format)?.with_options(options))
    }
}

impl Default for CodecRegistry {
    fn default() -> Self {
        Self::standard(crate::config::WHITE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::{ConversionOptions, GifOptions};

    #[test]
    fn test_standard_registry_has_all_formats() {
        let registry = CodecRegistry::default();
        let mut formats: Vec<_> = registry.formats().collect();
        formats.sort_by_key(|f| f.as_str());
        assert_eq!(formats.len(), 5);
        for format in OutputFormat::ALL {
            assert_eq!(registry.get(format).unwrap().format(), format);
        }
    }

    #[test]
    fn test_missing_codec_is_invalid_format() {
        let registry = CodecRegistry::empty(crate::config::WHITE)
            .with_codec(Codec::for_format(OutputFormat::Png, crate::config::WHITE));
        let err = registry.get(OutputFormat::Gif).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::InvalidFormat);
    }

    #[test]
    fn test_transparency_capabilities() {
        let registry = CodecRegistry::default();
        let alpha: Vec<_> = OutputFormat::ALL
            .iter()
            .filter(|f| registry.get(**f).unwrap().supports_transparency())
            .copied()
            .collect();
        assert_eq!(
            alpha,
            vec![OutputFormat::Png, OutputFormat::WebP, OutputFormat::Gif]
        );
        assert!(!registry
            .get(OutputFormat::Bmp)
            .unwrap()
            .capabilities()
            .contains(CodecCapabilities::QUALITY));
    }

    #[test]
    fn test_configured_applies_sub_options() {
        let registry = CodecRegistry::default();
        let mut options = ConversionOptions::defaults_for(OutputFormat::Gif);
        options.gif = GifOptions {
            colors: Some(16),
            dither: false,
        };
        match registry.configured(&options).unwrap() {
            Codec::Gif(gif) => {
                assert_eq!(gif.colors, Some(16));
                assert!(!gif.dither);
            }
            other => panic!("unexpected codec {other:?}"),
        }
    }

    #[test]
    fn test_encode_rejects_empty_buffer() {
        let codec = Codec::for_format(OutputFormat::Png, crate::config::WHITE);
        let empty = PixelBuffer::from_rgba(0, 3, Vec::new()).unwrap();
        let err = codec.encode(&empty, Quality::DEFAULT).unwrap_err();
        assert!(matches!(err, PixpipeError::EmptyImage { .. }));
    }
}
