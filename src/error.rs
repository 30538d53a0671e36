// src/error.rs
//
// Unified error handling for pixpipe
// Uses thiserror for simple, type-safe error handling
//
// Error Taxonomy:
// - InvalidFormat: malformed/unsupported input structure, bad enum value
// - InvalidSize: dimension or byte-size bounds violated
// - InvalidMime: sniffed type not on the allow-list
// - ProcessingFailed: a stage failed for a structurally valid input
// - BackgroundRemovalFailed: the background-removal collaborator failed
// - ResizeFailed: the resampler rejected the geometry
//
// Every kind is terminal for the current request. Nothing is retried here.

use std::borrow::Cow;
use std::fmt;
use thiserror::Error;

/// Boxed underlying cause attached to codec and collaborator failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Taxonomy kind of a failure, independent of the concrete variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidFormat,
    InvalidSize,
    InvalidMime,
    ProcessingFailed,
    BackgroundRemovalFailed,
    ResizeFailed,
}

impl ErrorKind {
    /// Stable upper-case code, suitable for wire responses.
    pub fn code(&self) -> &'static str {
        match self {
            ErrorKind::InvalidFormat => "INVALID_FORMAT",
            ErrorKind::InvalidSize => "INVALID_SIZE",
            ErrorKind::InvalidMime => "INVALID_MIME",
            ErrorKind::ProcessingFailed => "PROCESSING_FAILED",
            ErrorKind::BackgroundRemovalFailed => "BACKGROUND_REMOVAL_FAILED",
            ErrorKind::ResizeFailed => "RESIZE_FAILED",
        }
    }

    /// Which side of the boundary is at fault.
    pub fn class(&self) -> ErrorClass {
        match self {
            ErrorKind::InvalidFormat | ErrorKind::InvalidSize | ErrorKind::InvalidMime => {
                ErrorClass::Client
            }
            ErrorKind::ProcessingFailed
            | ErrorKind::BackgroundRemovalFailed
            | ErrorKind::ResizeFailed => ErrorClass::Server,
        }
    }
}

/// Client errors are caused by the request (malformed input), server errors by
/// a codec or subprocess failing on structurally valid input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Client,
    Server,
}

/// Pipeline stage that raised an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Validate,
    Decode,
    BackgroundRemoval,
    Resize,
    Convert,
    Optimize,
    Encode,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Validate => "validate",
            Stage::Decode => "decode",
            Stage::BackgroundRemoval => "background-removal",
            Stage::Resize => "resize",
            Stage::Convert => "convert",
            Stage::Optimize => "optimize",
            Stage::Encode => "encode",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// pixpipe error types
#[derive(Debug, Error)]
pub enum PixpipeError {
    // Structural / enum errors
    #[error("Unsupported image format: {format}")]
    UnsupportedFormat { format: Cow<'static, str> },

    #[error("Invalid resize mode: '{value}'. Expected fit, fill, or stretch")]
    InvalidResizeMode { value: Cow<'static, str> },

    #[error("Invalid ICO file: {reason}")]
    InvalidIco { reason: Cow<'static, str> },

    #[error("Unsupported ICO bit depth: {bits}")]
    UnsupportedBitDepth { bits: u16 },

    #[error("Input image is empty ({width}x{height})")]
    EmptyImage { width: u32, height: u32 },

    #[error("Pixel buffer length {actual} does not match {width}x{height} ({expected} bytes expected)")]
    CorruptedBuffer {
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },

    #[error("Invalid value for {name}: {value}. {reason}")]
    InvalidArgument {
        name: Cow<'static, str>,
        value: Cow<'static, str>,
        reason: Cow<'static, str>,
    },

    // Size Limit Errors
    #[error("Image dimension {dimension} exceeds maximum {max}")]
    DimensionExceedsLimit { dimension: u32, max: u32 },

    #[error("Image pixel count {pixels} exceeds maximum {max}")]
    PixelCountExceedsLimit { pixels: u64, max: u64 },

    #[error("Dimension {name} cannot be negative (got {value})")]
    NegativeDimension { name: &'static str, value: i64 },

    #[error("Input size {size} bytes exceeds maximum {max} bytes")]
    FileTooLarge { size: u64, max: u64 },

    // MIME Errors
    #[error("Unsupported file type: {detected}")]
    UnsupportedMime { detected: Cow<'static, str> },

    // Codec Errors
    #[error("Failed to decode {format}: {source}")]
    DecodeFailed {
        format: Cow<'static, str>,
        #[source]
        source: BoxError,
    },

    #[error("Failed to encode as {format}: {source}")]
    EncodeFailed {
        format: Cow<'static, str>,
        #[source]
        source: BoxError,
    },

    #[error("Resize failed ({source_width}x{source_height} -> {target_width}x{target_height}): {message}")]
    ResizeFailed {
        source_width: u32,
        source_height: u32,
        target_width: u32,
        target_height: u32,
        message: Cow<'static, str>,
    },

    // Collaborator Errors
    #[error("Background removal failed: {source}")]
    BackgroundRemovalFailed {
        #[source]
        source: BoxError,
    },

    #[error("Document conversion {input_ext} -> {output_ext} failed: {source}")]
    DocumentConversionFailed {
        input_ext: Cow<'static, str>,
        output_ext: Cow<'static, str>,
        #[source]
        source: BoxError,
    },

    #[error("External command '{program}' timed out after {timeout_ms}ms")]
    CommandTimedOut {
        program: Cow<'static, str>,
        timeout_ms: u64,
    },

    // Internal Errors
    #[error("Internal error: {message}")]
    InternalPanic { message: Cow<'static, str> },

    // Stage wrapper
    #[error("{stage} stage failed: {source}")]
    StageFailed {
        stage: Stage,
        #[source]
        source: Box<PixpipeError>,
    },
}

// Constructor Helpers
impl PixpipeError {
    pub fn unsupported_format(format: impl Into<Cow<'static, str>>) -> Self {
        Self::UnsupportedFormat {
            format: format.into(),
        }
    }

    pub fn invalid_resize_mode(value: impl Into<Cow<'static, str>>) -> Self {
        Self::InvalidResizeMode {
            value: value.into(),
        }
    }

    pub fn invalid_ico(reason: impl Into<Cow<'static, str>>) -> Self {
        Self::InvalidIco {
            reason: reason.into(),
        }
    }

    pub fn unsupported_bit_depth(bits: u16) -> Self {
        Self::UnsupportedBitDepth { bits }
    }

    pub fn empty_image(width: u32, height: u32) -> Self {
        Self::EmptyImage { width, height }
    }

    pub fn corrupted_buffer(width: u32, height: u32, expected: usize, actual: usize) -> Self {
        Self::CorruptedBuffer {
            width,
            height,
            expected,
            actual,
        }
    }

    pub fn invalid_argument(
        name: impl Into<Cow<'static, str>>,
        value: impl Into<Cow<'static, str>>,
        reason: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self::InvalidArgument {
            name: name.into(),
            value: value.into(),
            reason: reason.into(),
        }
    }

    pub fn dimension_exceeds_limit(dimension: u32, max: u32) -> Self {
        Self::DimensionExceedsLimit { dimension, max }
    }

    pub fn pixel_count_exceeds_limit(pixels: u64, max: u64) -> Self {
        Self::PixelCountExceedsLimit { pixels, max }
    }

    pub fn negative_dimension(name: &'static str, value: i64) -> Self {
        Self::NegativeDimension { name, value }
    }

    pub fn file_too_large(size: u64, max: u64) -> Self {
        Self::FileTooLarge { size, max }
    }

    pub fn unsupported_mime(detected: impl Into<Cow<'static, str>>) -> Self {
        Self::UnsupportedMime {
            detected: detected.into(),
        }
    }

    pub fn decode_failed(format: impl Into<Cow<'static, str>>, source: impl Into<BoxError>) -> Self {
        Self::DecodeFailed {
            format: format.into(),
            source: source.into(),
        }
    }

    pub fn encode_failed(format: impl Into<Cow<'static, str>>, source: impl Into<BoxError>) -> Self {
        Self::EncodeFailed {
            format: format.into(),
            source: source.into(),
        }
    }

    pub fn resize_failed(
        source_dims: (u32, u32),
        target_dims: (u32, u32),
        message: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self::ResizeFailed {
            source_width: source_dims.0,
            source_height: source_dims.1,
            target_width: target_dims.0,
            target_height: target_dims.1,
            message: message.into(),
        }
    }

    pub fn background_removal_failed(source: impl Into<BoxError>) -> Self {
        Self::BackgroundRemovalFailed {
            source: source.into(),
        }
    }

    pub fn document_conversion_failed(
        input_ext: impl Into<Cow<'static, str>>,
        output_ext: impl Into<Cow<'static, str>>,
        source: impl Into<BoxError>,
    ) -> Self {
        Self::DocumentConversionFailed {
            input_ext: input_ext.into(),
            output_ext: output_ext.into(),
            source: source.into(),
        }
    }

    pub fn command_timed_out(program: impl Into<Cow<'static, str>>, timeout_ms: u64) -> Self {
        Self::CommandTimedOut {
            program: program.into(),
            timeout_ms,
        }
    }

    pub fn internal_panic(message: impl Into<Cow<'static, str>>) -> Self {
        Self::InternalPanic {
            message: message.into(),
        }
    }

    /// Tag this error with the pipeline stage that produced it.
    /// Already-tagged errors keep their original stage.
    pub fn at_stage(self, stage: Stage) -> Self {
        match self {
            Self::StageFailed { .. } => self,
            other => Self::StageFailed {
                stage,
                source: Box::new(other),
            },
        }
    }

    /// Stage that raised this error, if it went through the pipeline.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Self::StageFailed { stage, .. } => Some(*stage),
            _ => None,
        }
    }

    /// The error with any stage wrapper removed.
    pub fn root(&self) -> &PixpipeError {
        match self {
            Self::StageFailed { source, .. } => source.root(),
            other => other,
        }
    }

    /// Get the taxonomy kind for this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::StageFailed { source, .. } => source.kind(),

            // InvalidFormat: malformed structure or bad enum value
            Self::UnsupportedFormat { .. }
            | Self::InvalidResizeMode { .. }
            | Self::InvalidIco { .. }
            | Self::UnsupportedBitDepth { .. }
            | Self::EmptyImage { .. }
            | Self::CorruptedBuffer { .. }
            | Self::InvalidArgument { .. } => ErrorKind::InvalidFormat,

            // InvalidSize: bounds violated
            Self::DimensionExceedsLimit { .. }
            | Self::PixelCountExceedsLimit { .. }
            | Self::NegativeDimension { .. }
            | Self::FileTooLarge { .. } => ErrorKind::InvalidSize,

            Self::UnsupportedMime { .. } => ErrorKind::InvalidMime,

            Self::ResizeFailed { .. } => ErrorKind::ResizeFailed,

            Self::BackgroundRemovalFailed { .. } => ErrorKind::BackgroundRemovalFailed,

            // ProcessingFailed: valid input, failing stage
            // Note: a timed-out command is reported as a processing failure; the caller
            // that set the timeout decides whether to retry the whole request.
            Self::DecodeFailed { .. }
            | Self::EncodeFailed { .. }
            | Self::DocumentConversionFailed { .. }
            | Self::CommandTimedOut { .. }
            | Self::InternalPanic { .. } => ErrorKind::ProcessingFailed,
        }
    }

    /// Client/server classification of this error.
    pub fn class(&self) -> ErrorClass {
        self.kind().class()
    }

    /// True when the request itself is at fault.
    pub fn is_client_error(&self) -> bool {
        self.class() == ErrorClass::Client
    }
}

// Result type alias
pub type Result<T> = std::result::Result<T, PixpipeError>;
