// src/external/background.rs
//
// Background removal collaborator. The command-backed implementation speaks PNG
// over stdin/stdout, which is what `rembg i - -` expects.

use super::command::{run_command, CommandSpec};
use crate::codecs::png::PNG_SIGNATURE;
use crate::codecs::{FormatCodec, PngCodec};
use crate::engine::PixelBuffer;
use crate::error::{PixpipeError, Result};
use crate::ops::Quality;
use tracing::debug;

/// Replaces the background of an image with transparency.
pub trait BackgroundRemover: Send + Sync {
    fn remove(&self, buffer: PixelBuffer) -> Result<PixelBuffer>;
}

/// Pipes a PNG through an external program and reads a PNG with alpha back.
#[derive(Clone, Debug)]
pub struct CommandBackgroundRemover {
    spec: CommandSpec,
    codec: PngCodec,
}

impl CommandBackgroundRemover {
    pub fn new(spec: CommandSpec) -> Self {
        Self {
            spec,
            // Fast deflate; the payload only lives for one pipe
            codec: PngCodec {
                compression_level: Some(1),
                ..PngCodec::default()
            },
        }
    }

    pub fn spec(&self) -> &CommandSpec {
        &self.spec
    }
}

impl BackgroundRemover for CommandBackgroundRemover {
    fn remove(&self, buffer: PixelBuffer) -> Result<PixelBuffer> {
        let input = self
            .codec
            .encode(&buffer, Quality::MAX)
            .map_err(PixpipeError::background_removal_failed)?;

        let output = run_command(&self.spec, &[], Some(&input))
            .map_err(PixpipeError::background_removal_failed)?;

        if !output.stdout.starts_with(&PNG_SIGNATURE) {
            return Err(PixpipeError::background_removal_failed(format!(
                "'{}' did not write a PNG ({} bytes on stdout)",
                self.spec.program,
                output.stdout.len()
            )));
        }
        let result = self
            .codec
            .decode(&output.stdout)
            .map_err(PixpipeError::background_removal_failed)?;
        debug!(
            width = result.width(),
            height = result.height(),
            "background removed"
        );
        Ok(result)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::external::command::test_support::script;
    use std::time::Duration;
    use tempfile::TempDir;

    fn remover(path: &std::path::Path, timeout: Duration) -> CommandBackgroundRemover {
        CommandBackgroundRemover::new(CommandSpec::new(
            path.to_string_lossy().into_owned(),
            Vec::<String>::new(),
            timeout,
        ))
    }

    #[test]
    fn test_passthrough_command_round_trips() {
        let dir = TempDir::new().unwrap();
        let cat = script(&dir, "rembg.sh", "cat");
        let buffer = PixelBuffer::filled(7, 5, [10, 20, 30, 128]);
        let result = remover(&cat, Duration::from_secs(5))
            .remove(buffer.clone())
            .unwrap();
        assert_eq!(result, buffer);
    }

    #[test]
    fn test_failing_command() {
        let dir = TempDir::new().unwrap();
        let fail = script(&dir, "rembg.sh", "cat > /dev/null\nexit 1");
        let err = remover(&fail, Duration::from_secs(5))
            .remove(PixelBuffer::filled(2, 2, [0; 4]))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BackgroundRemovalFailed);
    }

    #[test]
    fn test_malformed_output() {
        let dir = TempDir::new().unwrap();
        let junk = script(&dir, "rembg.sh", "cat > /dev/null\necho not-a-png");
        let err = remover(&junk, Duration::from_secs(5))
            .remove(PixelBuffer::filled(2, 2, [0; 4]))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BackgroundRemovalFailed);
        assert!(err.to_string().contains("did not write a PNG"));
    }

    #[test]
    fn test_timeout_is_background_failure() {
        let dir = TempDir::new().unwrap();
        let slow = script(&dir, "rembg.sh", "exec sleep 5");
        let err = remover(&slow, Duration::from_millis(100))
            .remove(PixelBuffer::filled(2, 2, [0; 4]))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BackgroundRemovalFailed);
    }
}
