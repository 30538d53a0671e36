// lib.rs
//
// pixpipe: an image processing pipeline
//
// Pipeline stages, in order:
// - validate and decode (JPEG, PNG, WebP, GIF, BMP, ICO, HEIC via transcoder)
// - optional background removal through an external collaborator
// - resize: aspect fit, fill (center crop) or stretch, Lanczos3
// - conversion to the target format with a uniform 1-100 quality knob
// - optional re-optimization round trip, then the terminal encode
//
// No global registration: the codec registry and configuration are built once
// and owned by the `Pipeline`.

// Memory allocator optimization - jemalloc for better performance
// Note: jemalloc is not supported on Windows/MSVC, so we exclude it on that platform
#[cfg(all(feature = "jemalloc", not(target_env = "msvc")))]
#[global_allocator]
static ALLOC: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

pub mod codecs;
pub mod config;
pub mod engine;
pub mod error;
pub mod external;
pub mod ops;

pub use codecs::{Codec, CodecCapabilities, CodecRegistry, FormatCodec};
pub use config::PipelineConfig;
pub use engine::{
    decode_image, detect_format, process_batch, validate_input, BatchItem, ConversionManager,
    EncodedImage, PixelBuffer, PixelFormat, Pipeline, ProcessedImage, ResizeEngine, SourceFormat,
};
pub use error::{ErrorClass, ErrorKind, PixpipeError, Result, Stage};
pub use external::{BackgroundRemover, DocumentConverter, HeicTranscoder};
pub use ops::{
    ConversionOptions, OutputFormat, ProcessOptions, Quality, QualityLevel, ResizeMode,
    ResizeSpec,
};

