// src/engine.rs
//
// The core of pixpipe. A per-request pipeline that:
// 1. Validates and decodes the input (ICO, HEIC and the standard codecs)
// 2. Optionally removes the background through an external collaborator
// 3. Resizes (fit / fill / stretch)
// 4. Converts to the target format, optionally re-optimizing
//
// This file is a facade over the modules in engine/

// =============================================================================
// SECURITY LIMITS
// =============================================================================

/// Maximum allowed image dimension (width or height), for inputs and resize requests.
pub const MAX_DIMENSION: u32 = 8192;

/// Maximum allowed total pixels (width * height).
/// 8192x8192 = 256MB uncompressed RGBA.
pub const MAX_PIXELS: u64 = MAX_DIMENSION as u64 * MAX_DIMENSION as u64;

/// Maximum accepted input size in bytes (32MB).
pub const MAX_FILE_SIZE: u64 = 32 * 1024 * 1024;

// =============================================================================
// MODULE DECOMPOSITION
// =============================================================================

pub(crate) mod common;

mod buffer;
mod convert;
mod decoder;
mod optimize;
mod pipeline;
mod pool;
mod resize;
mod validate;

pub use buffer::{PixelBuffer, PixelFormat};
pub use common::{run_with_panic_policy, EngineResult};
pub use convert::{ConversionManager, ProcessedImage};
pub use decoder::{decode_image, detect_format, SourceFormat};
pub use optimize::{auto_quality, estimate_complexity, optimize_round_trip, OptimizeSettings};
pub use pipeline::{EncodedImage, Pipeline};
pub use pool::{get_pool, process_batch, BatchItem};
pub use resize::{
    calc_fill_crop, calc_fit_dimensions, plan_resize, CropWindow, ResizeEngine, ResizePlan,
};
pub use validate::{check_dimensions, sniff_mime, validate_input, InputGuard, ALLOWED_MIME_TYPES};
