// src/ops.rs
//
// Request-level value types.
// These are cheap to create and copy - the expensive work happens in the engine.

use crate::error::{PixpipeError, Result};
use std::fmt;

/// How a requested width/height box is applied to the source geometry.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ResizeMode {
    /// Preserve aspect ratio and fit entirely inside the box (no cropping)
    #[default]
    AspectFit,
    /// Preserve aspect ratio, cover the box, then center-crop to it exactly
    Fill,
    /// Scale each axis independently to the exact box
    Stretch,
}

impl ResizeMode {
    /// Parse a user-supplied mode name. Accepts the aliases used by the upload form.
    pub fn parse(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "fit" | "aspect" | "aspectfit" => Ok(Self::AspectFit),
            "fill" | "cover" => Ok(Self::Fill),
            "stretch" | "exact" => Ok(Self::Stretch),
            _ => Err(PixpipeError::invalid_resize_mode(value.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AspectFit => "fit",
            Self::Fill => "fill",
            Self::Stretch => "stretch",
        }
    }
}

/// Requested output box. A zero axis is unconstrained; both zero is a pass-through.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct ResizeSpec {
    pub width: u32,
    pub height: u32,
    pub mode: ResizeMode,
}

impl ResizeSpec {
    pub fn new(width: u32, height: u32, mode: ResizeMode) -> Self {
        Self {
            width,
            height,
            mode,
        }
    }

    /// Build a spec from signed user input, rejecting negative axes as `InvalidSize`.
    pub fn from_signed(width: i64, height: i64, mode: ResizeMode) -> Result<Self> {
        let width = checked_axis("width", width)?;
        let height = checked_axis("height", height)?;
        Ok(Self::new(width, height, mode))
    }

    pub fn fit(width: u32, height: u32) -> Self {
        Self::new(width, height, ResizeMode::AspectFit)
    }

    pub fn fill(width: u32, height: u32) -> Self {
        Self::new(width, height, ResizeMode::Fill)
    }

    pub fn stretch(width: u32, height: u32) -> Self {
        Self::new(width, height, ResizeMode::Stretch)
    }

    /// True when no axis is constrained and the resize is a no-op.
    pub fn is_passthrough(&self) -> bool {
        self.width == 0 && self.height == 0
    }
}

fn checked_axis(name: &'static str, value: i64) -> Result<u32> {
    if value < 0 {
        return Err(PixpipeError::negative_dimension(name, value));
    }
    u32::try_from(value).map_err(|_| PixpipeError::dimension_exceeds_limit(u32::MAX, u32::MAX))
}

/// Output format for encoding
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OutputFormat {
    Jpeg,
    Png,
    WebP,
    Gif,
    Bmp,
}

impl OutputFormat {
    pub const ALL: [OutputFormat; 5] = [
        OutputFormat::Jpeg,
        OutputFormat::Png,
        OutputFormat::WebP,
        OutputFormat::Gif,
        OutputFormat::Bmp,
    ];

    /// Parse a format tag. `jpg` is an alias of `jpeg`.
    pub fn parse(format: &str) -> Result<Self> {
        match format.trim().to_ascii_lowercase().as_str() {
            "jpeg" | "jpg" => Ok(Self::Jpeg),
            "png" => Ok(Self::Png),
            "webp" => Ok(Self::WebP),
            "gif" => Ok(Self::Gif),
            "bmp" => Ok(Self::Bmp),
            other => Err(PixpipeError::unsupported_format(other.to_string())),
        }
    }

    /// Like [`OutputFormat::parse`], but an empty tag selects `default`.
    pub fn parse_or(format: &str, default: OutputFormat) -> Result<Self> {
        if format.trim().is_empty() {
            return Ok(default);
        }
        Self::parse(format)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Jpeg => "jpeg",
            Self::Png => "png",
            Self::WebP => "webp",
            Self::Gif => "gif",
            Self::Bmp => "bmp",
        }
    }

    /// `image/<format>`
    pub fn content_type(&self) -> String {
        format!("image/{}", self.as_str())
    }

    /// `processed.<format>`
    pub fn suggested_filename(&self) -> String {
        format!("processed.{}", self.as_str())
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Format-agnostic quality on a 1-100 scale. Each codec translates it to its own knob.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Quality(u8);

impl Quality {
    pub const MIN: Quality = Quality(1);
    pub const MAX: Quality = Quality(100);
    pub const DEFAULT: Quality = Quality(85);

    /// Normalize any integer onto 1-100.
    pub fn new(value: i64) -> Self {
        Self(value.clamp(1, 100) as u8)
    }

    /// Quality from the named presets of the upload form; anything else is the default.
    pub fn from_preset(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "low" => Self(60),
            "medium" => Self(75),
            "high" => Self(90),
            "lossless" => Self(100),
            _ => Self::DEFAULT,
        }
    }

    pub fn value(&self) -> u8 {
        self.0
    }

    pub fn is_max(&self) -> bool {
        self.0 == 100
    }

    /// Bucket used by the optimize stage.
    pub fn level(&self) -> QualityLevel {
        QualityLevel::from_quality(*self)
    }
}

impl Default for Quality {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Coarse quality bucket: `<=60` low, `<=75` medium, `<=90` high, else lossless.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum QualityLevel {
    Low,
    Medium,
    High,
    Lossless,
}

impl QualityLevel {
    pub fn from_quality(quality: Quality) -> Self {
        match quality.value() {
            0..=60 => Self::Low,
            61..=75 => Self::Medium,
            76..=90 => Self::High,
            _ => Self::Lossless,
        }
    }

    /// Representative quality of the bucket.
    pub fn quality(&self) -> Quality {
        match self {
            Self::Low => Quality(60),
            Self::Medium => Quality(75),
            Self::High => Quality(90),
            Self::Lossless => Quality(100),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Lossless => "lossless",
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WebPOptions {
    /// Force lossless encoding regardless of quality
    pub lossless: bool,
    /// Preserve RGB values under fully transparent pixels
    pub exact: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PngOptions {
    /// Explicit 0-9 compression level; `None` derives it from quality
    pub compression_level: Option<u8>,
    /// Reduce to a palette of `max_colors` before encoding
    pub quantize_colors: bool,
    pub max_colors: u16,
}

impl Default for PngOptions {
    fn default() -> Self {
        Self {
            compression_level: None,
            quantize_colors: false,
            max_colors: 256,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GifOptions {
    /// Explicit 2-256 palette size; `None` derives it from quality
    pub colors: Option<u16>,
    /// Floyd-Steinberg error diffusion when mapping onto the palette
    pub dither: bool,
}

impl Default for GifOptions {
    fn default() -> Self {
        Self {
            colors: None,
            dither: true,
        }
    }
}

/// Everything the ConversionManager needs to pick and configure a codec.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConversionOptions {
    pub format: OutputFormat,
    pub quality: Quality,
    pub strip_metadata: bool,
    /// Progressive scan order for JPEG
    pub progressive: bool,
    pub webp: WebPOptions,
    pub png: PngOptions,
    pub gif: GifOptions,
}

impl ConversionOptions {
    pub fn new(format: OutputFormat, quality: Quality) -> Self {
        Self {
            quality,
            ..Self::defaults_for(format)
        }
    }

    /// Recommended defaults per format.
    pub fn defaults_for(format: OutputFormat) -> Self {
        Self {
            format,
            quality: Quality::DEFAULT,
            strip_metadata: true,
            progressive: false,
            webp: WebPOptions::default(),
            png: PngOptions {
                compression_level: None,
                quantize_colors: false,
                max_colors: 256,
            },
            gif: GifOptions::default(),
        }
    }
}

/// Options for one pipeline invocation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProcessOptions {
    pub resize: ResizeSpec,
    pub format: OutputFormat,
    pub quality: Quality,
    pub remove_background: bool,
    pub optimize: bool,
    pub strip_metadata: bool,
    /// Progressive scan order for JPEG
    pub progressive: bool,
    pub webp: WebPOptions,
    pub png: PngOptions,
    pub gif: GifOptions,
}

impl ProcessOptions {
    pub fn new(format: OutputFormat) -> Self {
        Self {
            resize: ResizeSpec::default(),
            format,
            quality: Quality::DEFAULT,
            remove_background: false,
            optimize: false,
            strip_metadata: true,
            progressive: false,
            webp: WebPOptions::default(),
            png: PngOptions::default(),
            gif: GifOptions::default(),
        }
    }

    pub fn with_resize(mut self, resize: ResizeSpec) -> Self {
        self.resize = resize;
        self
    }

    pub fn with_quality(mut self, quality: Quality) -> Self {
        self.quality = quality;
        self
    }

    pub fn with_background_removal(mut self, enabled: bool) -> Self {
        self.remove_background = enabled;
        self
    }

    pub fn with_optimize(mut self, enabled: bool) -> Self {
        self.optimize = enabled;
        self
    }

    pub fn with_progressive(mut self, enabled: bool) -> Self {
        self.progressive = enabled;
        self
    }

    pub fn with_webp(mut self, webp: WebPOptions) -> Self {
        self.webp = webp;
        self
    }

    pub fn with_png(mut self, png: PngOptions) -> Self {
        self.png = png;
        self
    }

    pub fn with_gif(mut self, gif: GifOptions) -> Self {
        self.gif = gif;
        self
    }

    /// Conversion options derived from this request, sub-options included.
    pub fn conversion(&self) -> ConversionOptions {
        ConversionOptions {
            format: self.format,
            quality: self.quality,
            strip_metadata: self.strip_metadata,
            progressive: self.progressive,
            webp: self.webp,
            png: self.png,
            gif: self.gif,
        }
    }
}

impl Default for ProcessOptions {
    fn default() -> Self {
        Self::new(OutputFormat::Jpeg)
    }
}
