// src/external/heic.rs
//
// HEIC/HEIF transcoding collaborator. HEVC decoding stays outside the crate:
// the input is handed to libheif's `heif-convert` and comes back as JPEG.

use super::command::{run_command, CommandError, CommandSpec};
use crate::error::{PixpipeError, Result};
use std::fs;
use std::time::Duration;
use tempfile::TempDir;
use tracing::debug;

/// Default budget for one transcode.
pub const DEFAULT_HEIC_TIMEOUT: Duration = Duration::from_secs(30);

/// Turns HEIC/HEIF bytes into JPEG bytes.
pub trait HeicTranscoder: Send + Sync {
    fn transcode(&self, heic: &[u8]) -> Result<Vec<u8>>;
}

/// `heif-convert -q 100 <tmp>/input.heic <tmp>/output.jpg`
#[derive(Clone, Debug)]
pub struct CommandHeicTranscoder {
    spec: CommandSpec,
}

impl CommandHeicTranscoder {
    pub fn new(spec: CommandSpec) -> Self {
        Self { spec }
    }
}

impl Default for CommandHeicTranscoder {
    fn default() -> Self {
        Self::new(CommandSpec::new(
            "heif-convert",
            ["-q", "100"],
            DEFAULT_HEIC_TIMEOUT,
        ))
    }
}

impl HeicTranscoder for CommandHeicTranscoder {
    fn transcode(&self, heic: &[u8]) -> Result<Vec<u8>> {
        let failed = |source: Box<dyn std::error::Error + Send + Sync>| {
            PixpipeError::decode_failed("heic", source)
        };

        let workdir = TempDir::new().map_err(|e| failed(e.into()))?;
        let input = workdir.path().join("input.heic");
        let output = workdir.path().join("output.jpg");
        fs::write(&input, heic).map_err(|e| failed(e.into()))?;

        let args = [
            input.to_string_lossy().into_owned(),
            output.to_string_lossy().into_owned(),
        ];
        run_command(&self.spec, &args, None).map_err(|e| match e {
            CommandError::TimedOut { program, timeout } => {
                PixpipeError::command_timed_out(program, timeout.as_millis() as u64)
            }
            other => failed(other.into()),
        })?;

        let jpeg = fs::read(&output).map_err(|e| failed(e.into()))?;
        debug!(heic = heic.len(), jpeg = jpeg.len(), "heic transcoded");
        Ok(jpeg)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::external::command::test_support::script;

    fn transcoder(body: &str) -> (TempDir, CommandHeicTranscoder) {
        let dir = TempDir::new().unwrap();
        let path = script(&dir, "heif-convert.sh", body);
        let spec = CommandSpec::new(
            path.to_string_lossy().into_owned(),
            ["-q", "100"],
            Duration::from_secs(5),
        );
        (dir, CommandHeicTranscoder::new(spec))
    }

    #[test]
    fn test_output_file_is_returned() {
        // args: -q 100 <in> <out>
        let (_dir, transcoder) = transcoder("cp \"$3\" \"$4\"");
        let out = transcoder.transcode(b"fake heic").unwrap();
        assert_eq!(out, b"fake heic");
    }

    #[test]
    fn test_failure_is_decode_error() {
        let (_dir, transcoder) = transcoder("exit 2");
        let err = transcoder.transcode(b"fake heic").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ProcessingFailed);
        assert!(matches!(err, PixpipeError::DecodeFailed { .. }));
    }
}
