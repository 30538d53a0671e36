// src/external/mod.rs
//
// Collaborators the pipeline calls through narrow traits. The command-backed
// implementations shell out with a bounded timeout and never retry.

pub mod background;
pub mod command;
pub mod document;
pub mod heic;

pub use self::background::{BackgroundRemover, CommandBackgroundRemover};
pub use self::command::{run_command, CommandError, CommandOutput, CommandSpec};
pub use self::document::{
    is_conversion_supported, supported_outputs, CommandDocumentConverter, DocumentConverter,
    SUPPORTED_CONVERSIONS,
};
pub use self::heic::{CommandHeicTranscoder, HeicTranscoder, DEFAULT_HEIC_TIMEOUT};
