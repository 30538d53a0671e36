// src/external/document.rs
//
// Office document conversion through LibreOffice. Works on document bytes, not
// pixels; it lives here because it shares the error taxonomy and the command runner.

use super::command::{run_command, CommandError, CommandSpec};
use crate::config::PipelineConfig;
use crate::error::{PixpipeError, Result};
use std::fs;
use tempfile::TempDir;
use tracing::debug;

/// Source extension -> reachable target extensions.
pub const SUPPORTED_CONVERSIONS: [(&str, [&str; 5]); 6] = [
    ("pdf", ["doc", "docx", "txt", "odt", "rtf"]),
    ("doc", ["pdf", "docx", "txt", "odt", "rtf"]),
    ("docx", ["pdf", "doc", "txt", "odt", "rtf"]),
    ("odt", ["pdf", "doc", "docx", "txt", "rtf"]),
    ("rtf", ["pdf", "doc", "docx", "txt", "odt"]),
    ("txt", ["pdf", "doc", "docx", "odt", "rtf"]),
];

/// Targets reachable from `input_ext`; empty for unknown inputs.
pub fn supported_outputs(input_ext: &str) -> &'static [&'static str] {
    SUPPORTED_CONVERSIONS
        .iter()
        .find(|(input, _)| input.eq_ignore_ascii_case(input_ext))
        .map(|(_, outputs)| outputs.as_slice())
        .unwrap_or(&[])
}

pub fn is_conversion_supported(input_ext: &str, output_ext: &str) -> bool {
    supported_outputs(input_ext)
        .iter()
        .any(|o| o.eq_ignore_ascii_case(output_ext))
}

/// Converts a document between the formats of [`SUPPORTED_CONVERSIONS`].
pub trait DocumentConverter: Send + Sync {
    fn convert(&self, input: &[u8], input_ext: &str, output_ext: &str) -> Result<Vec<u8>>;
}

/// `soffice --headless --convert-to <ext> --outdir <tmp> <tmp>/input.<ext>`
#[derive(Clone, Debug)]
pub struct CommandDocumentConverter {
    spec: CommandSpec,
}

impl CommandDocumentConverter {
    pub fn new(spec: CommandSpec) -> Self {
        Self { spec }
    }

    /// Converter running the configured `document_conversion` command.
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(config.document_conversion.clone())
    }

    pub fn spec(&self) -> &CommandSpec {
        &self.spec
    }
}

impl DocumentConverter for CommandDocumentConverter {
    fn convert(&self, input: &[u8], input_ext: &str, output_ext: &str) -> Result<Vec<u8>> {
        let input_ext = input_ext.trim().to_ascii_lowercase();
        let output_ext = output_ext.trim().to_ascii_lowercase();
        if !is_conversion_supported(&input_ext, &output_ext) {
            return Err(PixpipeError::unsupported_format(format!(
                "{input_ext} -> {output_ext}"
            )));
        }
        let failed = |source: Box<dyn std::error::Error + Send + Sync>| {
            PixpipeError::document_conversion_failed(input_ext.clone(), output_ext.clone(), source)
        };

        // Removed on drop, whatever the outcome
        let workdir = TempDir::new().map_err(|e| failed(e.into()))?;
        let input_path = workdir.path().join(format!("input.{input_ext}"));
        fs::write(&input_path, input).map_err(|e| failed(e.into()))?;

        let args = vec![
            "--convert-to".to_string(),
            output_ext.clone(),
            "--outdir".to_string(),
            workdir.path().to_string_lossy().into_owned(),
            input_path.to_string_lossy().into_owned(),
        ];
        run_command(&self.spec, &args, None).map_err(|e| match e {
            CommandError::TimedOut { program, timeout } => {
                PixpipeError::command_timed_out(program, timeout.as_millis() as u64)
            }
            other => failed(other.into()),
        })?;

        let suffix = format!(".{output_ext}");
        let output_path = fs::read_dir(workdir.path())
            .map_err(|e| failed(e.into()))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .find(|path| {
                path != &input_path
                    && path
                        .file_name()
                        .map(|n| n.to_string_lossy().ends_with(&suffix))
                        .unwrap_or(false)
            })
            .ok_or_else(|| failed("converted file not found in output directory".into()))?;

        let converted = fs::read(&output_path).map_err(|e| failed(e.into()))?;
        debug!(
            input = input.len(),
            output = converted.len(),
            from = %input_ext,
            to = %output_ext,
            "document converted"
        );
        Ok(converted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conversion_table() {
        assert!(is_conversion_supported("docx", "pdf"));
        assert!(is_conversion_supported("PDF", "txt"));
        assert!(!is_conversion_supported("pdf", "pdf"));
        assert!(!is_conversion_supported("xls", "pdf"));
        assert_eq!(supported_outputs("txt").len(), 5);
        assert!(supported_outputs("png").is_empty());
    }

    #[cfg(unix)]
    mod command_tests {
        use super::super::*;
        use crate::error::ErrorKind;
        use crate::external::command::test_support::script;
        use std::time::Duration;

        // Mimics soffice: copies the last argument into --outdir with the new extension
        const FAKE_SOFFICE: &str = r#"
ext=""; out=""
while [ $# -gt 1 ]; do
  case "$1" in
    --convert-to) ext="$2"; shift 2 ;;
    --outdir) out="$2"; shift 2 ;;
    *) shift ;;
  esac
done
tr a-z A-Z < "$1" > "$out/input.$ext"
"#;

        fn converter(body: &str, timeout: Duration) -> (TempDir, CommandDocumentConverter) {
            let dir = TempDir::new().unwrap();
            let path = script(&dir, "soffice.sh", body);
            let spec = CommandSpec::new(path.to_string_lossy().into_owned(), ["--headless"], timeout);
            (dir, CommandDocumentConverter::new(spec))
        }

        #[test]
        fn test_converts_through_command() {
            let (_dir, converter) = converter(FAKE_SOFFICE, Duration::from_secs(5));
            let out = converter.convert(b"hello", "txt", "pdf").unwrap();
            assert_eq!(out, b"HELLO");
        }

        #[test]
        fn test_unsupported_pair_is_rejected_before_running() {
            let (_dir, converter) = converter("exit 99", Duration::from_secs(5));
            let err = converter.convert(b"x", "pdf", "png").unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidFormat);
        }

        #[test]
        fn test_missing_output_file() {
            let (_dir, converter) = converter("exit 0", Duration::from_secs(5));
            let err = converter.convert(b"x", "doc", "pdf").unwrap_err();
            assert!(matches!(err, PixpipeError::DocumentConversionFailed { .. }));
            assert_eq!(err.kind(), ErrorKind::ProcessingFailed);
        }

        #[test]
        fn test_from_config_uses_configured_command() {
            let dir = TempDir::new().unwrap();
            let path = script(&dir, "soffice.sh", FAKE_SOFFICE);
            let program = path.to_string_lossy().into_owned();
            let config = PipelineConfig::from_lookup(|key| match key {
                "PIXPIPE_SOFFICE_BIN" => Some(program.clone()),
                "PIXPIPE_SOFFICE_TIMEOUT_MS" => Some("5000".to_string()),
                _ => None,
            });
            let converter = CommandDocumentConverter::from_config(&config);
            assert_eq!(converter.spec().program, program);
            assert_eq!(converter.spec().timeout, Duration::from_secs(5));
            assert_eq!(converter.convert(b"abc", "odt", "docx").unwrap(), b"ABC");
        }

        #[test]
        fn test_timeout() {
            let (_dir, converter) = converter("exec sleep 5", Duration::from_millis(100));
            let err = converter.convert(b"x", "doc", "pdf").unwrap_err();
            assert!(matches!(err, PixpipeError::CommandTimedOut { .. }));
        }
    }
}
