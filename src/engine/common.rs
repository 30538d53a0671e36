// src/engine/common.rs
//
// Common utilities shared across engine modules.
// Provides unified error handling and type aliases.

use crate::error::PixpipeError;
use std::panic::{catch_unwind, AssertUnwindSafe};
use tracing::warn;

/// Result type used throughout the engine.
pub type EngineResult<T> = std::result::Result<T, PixpipeError>;

/// Run a codec call, converting a panic inside third-party code into
/// `InternalPanic` (ProcessingFailed) instead of unwinding through the caller.
///
/// `context` names the call site in the error, e.g. `"encode:jpeg"`.
pub fn run_with_panic_policy<T, F>(context: &'static str, f: F) -> EngineResult<T>
where
    F: FnOnce() -> EngineResult<T>,
{
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(payload) => {
            let detail = panic_message(payload.as_ref());
            warn!(context, detail = %detail, "codec panicked");
            Err(PixpipeError::internal_panic(format!("{context}: {detail}")))
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
