// src/engine/decoder.rs
//
// Source format dispatch. Every accepted input ends up as an RGBA PixelBuffer:
// the five codec formats decode through their codec, ICO through the container
// reader, HEIC through the external transcoder and then the JPEG codec.

use super::buffer::PixelBuffer;
use super::validate::sniff_mime;
use crate::codecs::{ico, Codec, FormatCodec};
use crate::config::WHITE;
use crate::error::{PixpipeError, Result};
use crate::external::HeicTranscoder;
use crate::ops::OutputFormat;
use tracing::debug;

/// Input formats the pipeline can decode.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SourceFormat {
    Jpeg,
    Png,
    WebP,
    Gif,
    Bmp,
    Ico,
    Heic,
}

impl SourceFormat {
    pub fn from_mime(mime: &str) -> Option<Self> {
        match mime {
            "image/jpeg" => Some(SourceFormat::Jpeg),
            "image/png" => Some(SourceFormat::Png),
            "image/webp" => Some(SourceFormat::WebP),
            "image/gif" => Some(SourceFormat::Gif),
            "image/bmp" => Some(SourceFormat::Bmp),
            "image/x-icon" | "image/vnd.microsoft.icon" => Some(SourceFormat::Ico),
            "image/heic" | "image/heif" => Some(SourceFormat::Heic),
            _ => None,
        }
    }

    pub fn mime(&self) -> &'static str {
        match self {
            SourceFormat::Jpeg => "image/jpeg",
            SourceFormat::Png => "image/png",
            SourceFormat::WebP => "image/webp",
            SourceFormat::Gif => "image/gif",
            SourceFormat::Bmp => "image/bmp",
            SourceFormat::Ico => "image/x-icon",
            SourceFormat::Heic => "image/heic",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceFormat::Jpeg => "jpeg",
            SourceFormat::Png => "png",
            SourceFormat::WebP => "webp",
            SourceFormat::Gif => "gif",
            SourceFormat::Bmp => "bmp",
            SourceFormat::Ico => "ico",
            SourceFormat::Heic => "heic",
        }
    }

    /// Output codec able to decode this source, if there is one.
    fn codec_format(&self) -> Option<OutputFormat> {
        match self {
            SourceFormat::Jpeg => Some(OutputFormat::Jpeg),
            SourceFormat::Png => Some(OutputFormat::Png),
            SourceFormat::WebP => Some(OutputFormat::WebP),
            SourceFormat::Gif => Some(OutputFormat::Gif),
            SourceFormat::Bmp => Some(OutputFormat::Bmp),
            SourceFormat::Ico | SourceFormat::Heic => None,
        }
    }
}

/// Detect the source format from magic bytes.
pub fn detect_format(bytes: &[u8]) -> Option<SourceFormat> {
    SourceFormat::from_mime(sniff_mime(bytes))
}

/// Decode `bytes` as `format`.
///
/// HEIC needs a transcoder; without one it is rejected as an unsupported type.
pub fn decode_image(
    bytes: &[u8],
    format: SourceFormat,
    heic: Option<&dyn HeicTranscoder>,
) -> Result<PixelBuffer> {
    if bytes.is_empty() {
        return Err(PixpipeError::decode_failed(format.as_str(), "empty input"));
    }

    let buffer = match format {
        SourceFormat::Ico => ico::decode_ico(bytes)?,
        SourceFormat::Heic => {
            let transcoder = heic.ok_or_else(|| PixpipeError::unsupported_mime(format.mime()))?;
            let jpeg = transcoder.transcode(bytes)?;
            debug!(heic = bytes.len(), jpeg = jpeg.len(), "heic transcoded");
            Codec::for_format(OutputFormat::Jpeg, WHITE).decode(&jpeg)?
        }
        other => match other.codec_format() {
            Some(output) => Codec::for_format(output, WHITE).decode(bytes)?,
            None => return Err(PixpipeError::unsupported_format(other.as_str())),
        },
    };

    debug!(
        format = format.as_str(),
        width = buffer.width(),
        height = buffer.height(),
        "decoded"
    );
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codecs::ico::test_support::{bgra_payload, build_ico};
    use crate::error::ErrorKind;
    use crate::ops::Quality;

    struct FixedTranscoder(Vec<u8>);

    impl HeicTranscoder for FixedTranscoder {
        fn transcode(&self, _heic: &[u8]) -> Result<Vec<u8>> {
            Ok(self.0.clone())
        }
    }

    fn heic_bytes() -> Vec<u8> {
        let mut data = vec![0, 0, 0, 16];
        data.extend_from_slice(b"ftypheic\0\0\0\0");
        data
    }

    #[test]
    fn test_detect_format() {
        let png = Codec::for_format(OutputFormat::Png, WHITE)
            .encode(&PixelBuffer::filled(2, 2, [0, 0, 0, 255]), Quality::DEFAULT)
            .unwrap();
        assert_eq!(detect_format(&png), Some(SourceFormat::Png));
        assert_eq!(detect_format(&heic_bytes()), Some(SourceFormat::Heic));
        assert_eq!(detect_format(b"not an image"), None);
    }

    #[test]
    fn test_mime_round_trip() {
        for format in [
            SourceFormat::Jpeg,
            SourceFormat::Png,
            SourceFormat::WebP,
            SourceFormat::Gif,
            SourceFormat::Bmp,
            SourceFormat::Ico,
            SourceFormat::Heic,
        ] {
            assert_eq!(SourceFormat::from_mime(format.mime()), Some(format));
        }
        assert_eq!(
            SourceFormat::from_mime("image/vnd.microsoft.icon"),
            Some(SourceFormat::Ico)
        );
    }

    #[test]
    fn test_decode_each_codec_format() {
        let buffer = PixelBuffer::filled(6, 4, [10, 200, 30, 255]);
        for output in OutputFormat::ALL {
            let bytes = Codec::for_format(output, WHITE)
                .encode(&buffer, Quality::MAX)
                .unwrap();
            let format = detect_format(&bytes).unwrap();
            let decoded = decode_image(&bytes, format, None).unwrap();
            assert_eq!(decoded.dimensions(), (6, 4), "{output}");
        }
    }

    #[test]
    fn test_decode_ico() {
        let ico = build_ico(&[(2, 2, 32, bgra_payload(2, 2, [0, 0, 255, 255]))]);
        let decoded = decode_image(&ico, SourceFormat::Ico, None).unwrap();
        assert_eq!(decoded.pixel(0, 0), Some([255, 0, 0, 255]));
    }

    #[test]
    fn test_heic_without_transcoder_is_rejected() {
        let err = decode_image(&heic_bytes(), SourceFormat::Heic, None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidMime);
    }

    #[test]
    fn test_heic_goes_through_transcoder() {
        let jpeg = Codec::for_format(OutputFormat::Jpeg, WHITE)
            .encode(&PixelBuffer::filled(5, 3, [0, 0, 0, 255]), Quality::MAX)
            .unwrap();
        let transcoder = FixedTranscoder(jpeg);
        let decoded = decode_image(&heic_bytes(), SourceFormat::Heic, Some(&transcoder)).unwrap();
        assert_eq!(decoded.dimensions(), (5, 3));
    }

    #[test]
    fn test_empty_input() {
        let err = decode_image(&[], SourceFormat::Png, None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ProcessingFailed);
    }
}
