// src/engine/pipeline.rs
//
// Pipeline orchestrator. Fixed stage order:
//
//   validate -> decode -> [background removal] -> [resize] -> convert -> [optimize] -> encode
//
// Every stage failure is tagged with its Stage and aborts the run; no partial
// output is returned and nothing is retried here.

use super::buffer::PixelBuffer;
use super::convert::{ConversionManager, ProcessedImage};
use super::decoder::decode_image;
use super::optimize::optimize_round_trip;
use super::resize::ResizeEngine;
use super::validate::{validate_input, InputGuard};
use crate::codecs::CodecRegistry;
use crate::config::PipelineConfig;
use crate::error::{PixpipeError, Result, Stage};
use crate::external::{
    BackgroundRemover, CommandBackgroundRemover, CommandHeicTranscoder, HeicTranscoder,
};
use crate::ops::{OutputFormat, ProcessOptions, Quality};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, info_span};

/// Terminal output of a pipeline run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncodedImage {
    pub bytes: Vec<u8>,
    pub format: OutputFormat,
    /// `image/<format>`
    pub content_type: String,
    /// `processed.<format>`
    pub filename: String,
    pub width: u32,
    pub height: u32,
    /// Quality the final encode ran at; never above the requested one
    pub quality: Quality,
}

impl EncodedImage {
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Shared, immutable pipeline. Cheap to clone; each `process` call is independent.
#[derive(Clone)]
pub struct Pipeline {
    config: Arc<PipelineConfig>,
    registry: Arc<CodecRegistry>,
    resizer: ResizeEngine,
    background_remover: Option<Arc<dyn BackgroundRemover>>,
    heic: Option<Arc<dyn HeicTranscoder>>,
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("config", &self.config)
            .field("formats", &self.registry.formats().collect::<Vec<_>>())
            .field("background_remover", &self.background_remover.is_some())
            .field("heic", &self.heic.is_some())
            .finish()
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new(PipelineConfig::default())
    }
}

impl Pipeline {
    /// Pipeline with the standard codecs and no collaborators.
    pub fn new(config: PipelineConfig) -> Self {
        let registry = CodecRegistry::standard(config.background);
        let resizer = ResizeEngine::new(config.max_dimension);
        Self {
            config: Arc::new(config),
            registry: Arc::new(registry),
            resizer,
            background_remover: None,
            heic: None,
        }
    }

    /// Attach the command-backed collaborators described by the config.
    pub fn with_command_collaborators(self) -> Self {
        let remover = CommandBackgroundRemover::new(self.config.background_removal.clone());
        self.with_background_remover(Arc::new(remover))
            .with_heic_transcoder(Arc::new(CommandHeicTranscoder::default()))
    }

    pub fn with_registry(mut self, registry: CodecRegistry) -> Self {
        self.registry = Arc::new(registry);
        self
    }

    pub fn with_background_remover(mut self, remover: Arc<dyn BackgroundRemover>) -> Self {
        self.background_remover = Some(remover);
        self
    }

    pub fn with_heic_transcoder(mut self, transcoder: Arc<dyn HeicTranscoder>) -> Self {
        self.heic = Some(transcoder);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn registry(&self) -> &CodecRegistry {
        &self.registry
    }

    /// Request options seeded from the configured default format and quality.
    pub fn default_options(&self) -> ProcessOptions {
        ProcessOptions::new(self.config.default_format).with_quality(self.config.default_quality)
    }

    /// Parse a requested output format; blank input falls back to the configured default.
    pub fn parse_format(&self, raw: &str) -> Result<OutputFormat> {
        OutputFormat::parse_or(raw, self.config.default_format)
    }

    /// Run every stage on encoded input bytes.
    pub fn process(&self, bytes: &[u8], options: &ProcessOptions) -> Result<EncodedImage> {
        let span = info_span!(
            "pipeline",
            input_len = bytes.len(),
            format = options.format.as_str(),
            quality = options.quality.value()
        );
        let _enter = span.enter();

        let source = validate_input(bytes, &self.config).map_err(|e| e.at_stage(Stage::Validate))?;
        let buffer = decode_image(bytes, source, self.heic.as_deref())
            .and_then(|buffer| {
                InputGuard::from(self.config.as_ref())
                    .enforce_pixels(buffer.width(), buffer.height())?;
                Ok(buffer)
            })
            .map_err(|e| e.at_stage(Stage::Decode))?;
        debug!(source = source.as_str(), "stage: decode done");

        let processed = self.process_buffer(buffer, options)?;
        let encoded = self.encode(processed)?;
        info!(
            format = encoded.format.as_str(),
            width = encoded.width,
            height = encoded.height,
            bytes = encoded.len(),
            "pipeline finished"
        );
        Ok(encoded)
    }

    /// Stages between decode and the terminal encode, on an already decoded buffer.
    pub fn process_buffer(
        &self,
        buffer: PixelBuffer,
        options: &ProcessOptions,
    ) -> Result<ProcessedImage> {
        let mut buffer = buffer;

        if options.remove_background {
            let remover = self.background_remover.as_ref().ok_or_else(|| {
                PixpipeError::background_removal_failed("no background remover configured")
                    .at_stage(Stage::BackgroundRemoval)
            })?;
            buffer = remover
                .remove(buffer)
                .map_err(|e| e.at_stage(Stage::BackgroundRemoval))?;
            debug!("stage: background removal done");
        }

        if !options.resize.is_passthrough() {
            let spec = &options.resize;
            buffer = self
                .config
                .check_requested(spec.width, spec.height)
                .and_then(|()| self.resizer.resize(buffer, spec))
                .map_err(|e| e.at_stage(Stage::Resize))?;
            debug!(
                mode = spec.mode.as_str(),
                width = buffer.width(),
                height = buffer.height(),
                "stage: resize done"
            );
        }

        let conversion = options.conversion();
        let mut processed = ConversionManager::new(&self.registry)
            .prepare(buffer, &conversion)
            .map_err(|e| e.at_stage(Stage::Convert))?;
        debug!(format = conversion.format.as_str(), "stage: convert done");

        if options.optimize {
            processed = optimize_round_trip(processed).map_err(|e| e.at_stage(Stage::Optimize))?;
            debug!(quality = processed.quality.value(), "stage: optimize done");
        }

        Ok(processed)
    }

    /// Terminal encode of a processed image.
    pub fn encode(&self, processed: ProcessedImage) -> Result<EncodedImage> {
        let format = processed.format;
        let quality = processed.quality;
        let (width, height) = processed.dimensions();
        let bytes = processed
            .serialize()
            .map_err(|e| e.at_stage(Stage::Encode))?;
        Ok(EncodedImage {
            bytes,
            format,
            content_type: format.content_type(),
            filename: format.suggested_filename(),
            width,
            height,
            quality,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codecs::{Codec, FormatCodec};
    use crate::config::WHITE;
    use crate::error::ErrorKind;
    use crate::ops::{Quality, ResizeSpec};

    struct ClearCorner;

    impl BackgroundRemover for ClearCorner {
        fn remove(&self, buffer: PixelBuffer) -> Result<PixelBuffer> {
            let (w, h) = buffer.dimensions();
            let mut data = buffer.into_rgba().into_raw();
            data[3] = 0;
            PixelBuffer::from_rgba(w, h, data)
        }
    }

    struct Broken;

    impl BackgroundRemover for Broken {
        fn remove(&self, _buffer: PixelBuffer) -> Result<PixelBuffer> {
            Err(PixpipeError::background_removal_failed("exit status 1"))
        }
    }

    fn png_input(width: u32, height: u32) -> Vec<u8> {
        Codec::for_format(OutputFormat::Png, WHITE)
            .encode(&PixelBuffer::filled(width, height, [30, 60, 90, 255]), Quality::MAX)
            .unwrap()
    }

    #[test]
    fn test_end_to_end_resize_and_convert() {
        let pipeline = Pipeline::default();
        let options =
            ProcessOptions::new(OutputFormat::WebP).with_resize(ResizeSpec::fit(50, 0));
        let out = pipeline.process(&png_input(100, 40), &options).unwrap();
        assert_eq!((out.width, out.height), (50, 20));
        assert_eq!(out.content_type, "image/webp");
        assert_eq!(out.filename, "processed.webp");
        assert_eq!(&out.bytes[8..12], b"WEBP");
    }

    #[test]
    fn test_background_removal_keeps_alpha_in_png() {
        let pipeline = Pipeline::default().with_background_remover(Arc::new(ClearCorner));
        let options = ProcessOptions::new(OutputFormat::Png).with_background_removal(true);
        let out = pipeline.process(&png_input(4, 4), &options).unwrap();
        let decoded = Codec::for_format(OutputFormat::Png, WHITE)
            .decode(&out.bytes)
            .unwrap();
        assert_eq!(decoded.pixel(0, 0).map(|p| p[3]), Some(0));
        assert_eq!(decoded.pixel(1, 0), Some([30, 60, 90, 255]));
    }

    #[test]
    fn test_background_failure_aborts() {
        let pipeline = Pipeline::default().with_background_remover(Arc::new(Broken));
        let options = ProcessOptions::default().with_background_removal(true);
        let err = pipeline.process(&png_input(4, 4), &options).unwrap_err();
        assert_eq!(err.stage(), Some(Stage::BackgroundRemoval));
        assert_eq!(err.kind(), ErrorKind::BackgroundRemovalFailed);
    }

    #[test]
    fn test_background_removal_without_collaborator() {
        let options = ProcessOptions::default().with_background_removal(true);
        let err = Pipeline::default()
            .process(&png_input(4, 4), &options)
            .unwrap_err();
        assert_eq!(err.stage(), Some(Stage::BackgroundRemoval));
    }

    #[test]
    fn test_oversized_request_is_resize_stage_error() {
        let options = ProcessOptions::default().with_resize(ResizeSpec::stretch(9000, 10));
        let err = Pipeline::default()
            .process(&png_input(4, 4), &options)
            .unwrap_err();
        assert_eq!(err.stage(), Some(Stage::Resize));
        assert_eq!(err.kind(), ErrorKind::InvalidSize);
    }

    #[test]
    fn test_validation_errors_are_tagged() {
        let err = Pipeline::default()
            .process(b"definitely not an image", &ProcessOptions::default())
            .unwrap_err();
        assert_eq!(err.stage(), Some(Stage::Validate));
        assert_eq!(err.kind(), ErrorKind::InvalidMime);
    }

    #[test]
    fn test_corrupt_input_is_decode_error() {
        let mut bytes = png_input(8, 8);
        bytes.truncate(40);
        let err = Pipeline::default()
            .process(&bytes, &ProcessOptions::default())
            .unwrap_err();
        assert_eq!(err.stage(), Some(Stage::Decode));
        assert!(!err.is_client_error());
    }

    #[test]
    fn test_defaults_come_from_config() {
        let config = PipelineConfig::from_lookup(|key| match key {
            "PIXPIPE_DEFAULT_FORMAT" => Some("webp".to_string()),
            "PIXPIPE_DEFAULT_QUALITY" => Some("40".to_string()),
            _ => None,
        });
        let pipeline = Pipeline::new(config);
        let options = pipeline.default_options();
        assert_eq!(options.format, OutputFormat::WebP);
        assert_eq!(options.quality.value(), 40);
        assert_eq!(pipeline.parse_format("  ").unwrap(), OutputFormat::WebP);
        assert_eq!(pipeline.parse_format("gif").unwrap(), OutputFormat::Gif);

        let out = pipeline.process(&png_input(8, 8), &options).unwrap();
        assert_eq!(out.format, OutputFormat::WebP);
        assert_eq!(out.quality.value(), 40);
    }

    #[test]
    fn test_optimize_round_trip_runs() {
        let options = ProcessOptions::new(OutputFormat::Jpeg)
            .with_quality(Quality::new(55))
            .with_optimize(true);
        let out = Pipeline::default()
            .process(&png_input(20, 20), &options)
            .unwrap();
        assert_eq!(&out.bytes[0..2], &[0xFF, 0xD8]);
        assert_eq!((out.width, out.height), (20, 20));
    }
}
