// src/config.rs
//
// Pipeline configuration: limits, defaults and collaborator commands.
// Built once at startup and shared by reference with every pipeline invocation.

use crate::engine::{MAX_DIMENSION, MAX_FILE_SIZE, MAX_PIXELS};
use crate::external::CommandSpec;
use crate::ops::{OutputFormat, Quality};
use std::time::Duration;
use tracing::warn;

/// Default wall clock budget for one background-removal run.
pub const DEFAULT_REMBG_TIMEOUT: Duration = Duration::from_secs(60);

/// Default wall clock budget for one document conversion.
pub const DEFAULT_SOFFICE_TIMEOUT: Duration = Duration::from_secs(120);

/// Opaque white, the flattening background for formats without alpha.
pub const WHITE: [u8; 3] = [255, 255, 255];

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Largest accepted width or height, for inputs and resize requests
    pub max_dimension: u32,
    pub max_pixels: u64,
    /// Largest accepted input in bytes
    pub max_file_size: u64,
    pub default_quality: Quality,
    /// Used when a request leaves the output format empty
    pub default_format: OutputFormat,
    /// Colour transparent pixels are flattened onto for JPEG/BMP
    pub background: [u8; 3],
    pub background_removal: CommandSpec,
    pub document_conversion: CommandSpec,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_dimension: MAX_DIMENSION,
            max_pixels: MAX_PIXELS,
            max_file_size: MAX_FILE_SIZE,
            default_quality: Quality::DEFAULT,
            default_format: OutputFormat::Jpeg,
            background: WHITE,
            background_removal: CommandSpec::new("rembg", ["i", "-", "-"], DEFAULT_REMBG_TIMEOUT),
            document_conversion: CommandSpec::new(
                "soffice",
                ["--headless"],
                DEFAULT_SOFFICE_TIMEOUT,
            ),
        }
    }
}

impl PipelineConfig {
    /// Defaults overlaid with `PIXPIPE_*` environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overlaid with values from `lookup`. Unparsable values are ignored.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(v) = parse_var::<u32, _>(&lookup, "PIXPIPE_MAX_DIMENSION") {
            config.max_dimension = v.max(1);
            config.max_pixels = v as u64 * v as u64;
        }
        if let Some(v) = parse_var::<u64, _>(&lookup, "PIXPIPE_MAX_FILE_SIZE") {
            config.max_file_size = v;
        }
        if let Some(v) = parse_var::<i64, _>(&lookup, "PIXPIPE_DEFAULT_QUALITY") {
            config.default_quality = Quality::new(v);
        }
        if let Some(raw) = lookup("PIXPIPE_DEFAULT_FORMAT") {
            match OutputFormat::parse(&raw) {
                Ok(format) => config.default_format = format,
                Err(e) => warn!(value = %raw, error = %e, "ignoring PIXPIPE_DEFAULT_FORMAT"),
            }
        }
        if let Some(raw) = lookup("PIXPIPE_REMBG_BIN") {
            let program = raw.trim();
            if !program.is_empty() {
                config.background_removal.program = program.to_string();
            }
        }
        if let Some(ms) = parse_var::<u64, _>(&lookup, "PIXPIPE_REMBG_TIMEOUT_MS") {
            config.background_removal.timeout = Duration::from_millis(ms);
        }
        if let Some(raw) = lookup("PIXPIPE_SOFFICE_BIN") {
            let program = raw.trim();
            if !program.is_empty() {
                config.document_conversion.program = program.to_string();
            }
        }
        if let Some(ms) = parse_var::<u64, _>(&lookup, "PIXPIPE_SOFFICE_TIMEOUT_MS") {
            config.document_conversion.timeout = Duration::from_millis(ms);
        }

        config
    }

    /// Reject requested output geometry larger than the configured box.
    pub fn check_requested(&self, width: u32, height: u32) -> crate::error::Result<()> {
        let largest = width.max(height);
        if largest > self.max_dimension {
            return Err(crate::error::PixpipeError::dimension_exceeds_limit(
                largest,
                self.max_dimension,
            ));
        }
        Ok(())
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Option<T>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(key)?;
    match raw.trim().parse::<T>() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!(key, value = %raw, "ignoring unparsable environment override");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.max_dimension, 8192);
        assert_eq!(config.max_file_size, 32 * 1024 * 1024);
        assert_eq!(config.default_quality.value(), 85);
        assert_eq!(config.default_format, OutputFormat::Jpeg);
        assert_eq!(config.background, WHITE);
        assert_eq!(config.background_removal.program, "rembg");
        assert_eq!(config.background_removal.args, vec!["i", "-", "-"]);
    }

    #[test]
    fn test_env_overrides() {
        let config = PipelineConfig::from_lookup(lookup_from(&[
            ("PIXPIPE_MAX_DIMENSION", "4096"),
            ("PIXPIPE_DEFAULT_QUALITY", "70"),
            ("PIXPIPE_DEFAULT_FORMAT", "webp"),
            ("PIXPIPE_REMBG_BIN", "/opt/rembg/bin/rembg"),
            ("PIXPIPE_REMBG_TIMEOUT_MS", "2500"),
            ("PIXPIPE_SOFFICE_BIN", "/usr/lib/libreoffice/program/soffice"),
            ("PIXPIPE_SOFFICE_TIMEOUT_MS", "90000"),
        ]));
        assert_eq!(config.max_dimension, 4096);
        assert_eq!(config.max_pixels, 4096 * 4096);
        assert_eq!(config.default_quality.value(), 70);
        assert_eq!(config.default_format, OutputFormat::WebP);
        assert_eq!(config.background_removal.program, "/opt/rembg/bin/rembg");
        assert_eq!(
            config.background_removal.timeout,
            Duration::from_millis(2500)
        );
        assert_eq!(
            config.document_conversion.program,
            "/usr/lib/libreoffice/program/soffice"
        );
        assert_eq!(config.document_conversion.args, vec!["--headless"]);
        assert_eq!(config.document_conversion.timeout, Duration::from_secs(90));
    }

    #[test]
    fn test_unparsable_overrides_are_ignored() {
        let config = PipelineConfig::from_lookup(lookup_from(&[
            ("PIXPIPE_MAX_FILE_SIZE", "lots"),
            ("PIXPIPE_DEFAULT_FORMAT", "tiff"),
        ]));
        assert_eq!(config, PipelineConfig::default());
    }

    #[test]
    fn test_check_requested() {
        let config = PipelineConfig::default();
        assert!(config.check_requested(8192, 10).is_ok());
        let err = config.check_requested(10, 8193).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::InvalidSize);
    }
}
