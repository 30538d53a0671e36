// src/engine/buffer.rs
//
// PixelBuffer: owned, decoded raster. Every transformation consumes its input
// buffer and returns a new one, so a buffer is never shared between stages.

use crate::error::{PixpipeError, Result};
use image::{DynamicImage, RgbImage, RgbaImage};

/// Sample layout of a PixelBuffer. Rgba8 is canonical; decoders always produce it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    Rgb8,
    Rgba8,
}

impl PixelFormat {
    pub fn channels(&self) -> usize {
        match self {
            PixelFormat::Rgb8 => 3,
            PixelFormat::Rgba8 => 4,
        }
    }

    pub fn has_alpha(&self) -> bool {
        matches!(self, PixelFormat::Rgba8)
    }
}

/// Row-major, tightly packed 8-bit raster.
///
/// Invariant: `data.len() == width * height * format.channels()`.
#[derive(Clone, PartialEq, Eq)]
pub struct PixelBuffer {
    width: u32,
    height: u32,
    format: PixelFormat,
    data: Vec<u8>,
}

impl std::fmt::Debug for PixelBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Pixel data is omitted; it can be hundreds of megabytes.
        f.debug_struct("PixelBuffer")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("format", &self.format)
            .field("len", &self.data.len())
            .finish()
    }
}

impl PixelBuffer {
    /// Wrap raw samples, checking the length invariant.
    pub fn new(width: u32, height: u32, format: PixelFormat, data: Vec<u8>) -> Result<Self> {
        let expected = expected_len(width, height, format)
            .ok_or_else(|| PixpipeError::corrupted_buffer(width, height, usize::MAX, data.len()))?;
        if data.len() != expected {
            return Err(PixpipeError::corrupted_buffer(
                width,
                height,
                expected,
                data.len(),
            ));
        }
        Ok(Self {
            width,
            height,
            format,
            data,
        })
    }

    pub fn from_rgba(width: u32, height: u32, data: Vec<u8>) -> Result<Self> {
        Self::new(width, height, PixelFormat::Rgba8, data)
    }

    pub fn from_rgb(width: u32, height: u32, data: Vec<u8>) -> Result<Self> {
        Self::new(width, height, PixelFormat::Rgb8, data)
    }

    /// A buffer filled with one RGBA colour.
    pub fn filled(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        let count = width as usize * height as usize;
        let mut data = Vec::with_capacity(count * 4);
        for _ in 0..count {
            data.extend_from_slice(&rgba);
        }
        Self {
            width,
            height,
            format: PixelFormat::Rgba8,
            data,
        }
    }

    /// Convert a decoded `image` crate value into the canonical RGBA layout.
    pub fn from_dynamic(img: DynamicImage) -> Self {
        let rgba = match img {
            DynamicImage::ImageRgba8(rgba) => rgba,
            other => other.into_rgba8(),
        };
        let (width, height) = rgba.dimensions();
        Self {
            width,
            height,
            format: PixelFormat::Rgba8,
            data: rgba.into_raw(),
        }
    }

    /// Hand the samples to the `image` crate without copying.
    pub fn into_dynamic(self) -> DynamicImage {
        let (width, height) = (self.width, self.height);
        match self.format {
            // Lengths are guaranteed by the constructor invariant.
            PixelFormat::Rgb8 => RgbImage::from_raw(width, height, self.data)
                .map(DynamicImage::ImageRgb8)
                .unwrap_or_else(|| DynamicImage::new_rgb8(width, height)),
            PixelFormat::Rgba8 => RgbaImage::from_raw(width, height, self.data)
                .map(DynamicImage::ImageRgba8)
                .unwrap_or_else(|| DynamicImage::new_rgba8(width, height)),
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_raw(self) -> Vec<u8> {
        self.data
    }

    /// Zero-area buffers cannot be resized or encoded.
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// RGBA sample at (x, y). Rgb8 buffers report full opacity.
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let ch = self.format.channels();
        let idx = (y as usize * self.width as usize + x as usize) * ch;
        let px = &self.data[idx..idx + ch];
        Some(match self.format {
            PixelFormat::Rgb8 => [px[0], px[1], px[2], 255],
            PixelFormat::Rgba8 => [px[0], px[1], px[2], px[3]],
        })
    }

    /// True if any pixel is not fully opaque.
    pub fn has_transparency(&self) -> bool {
        match self.format {
            PixelFormat::Rgb8 => false,
            PixelFormat::Rgba8 => self.data.iter().skip(3).step_by(4).any(|&a| a < 255),
        }
    }

    /// Canonical RGBA copy of this buffer.
    pub fn into_rgba(self) -> Self {
        match self.format {
            PixelFormat::Rgba8 => self,
            PixelFormat::Rgb8 => {
                let mut data = Vec::with_capacity(self.data.len() / 3 * 4);
                for px in self.data.chunks_exact(3) {
                    data.extend_from_slice(&[px[0], px[1], px[2], 255]);
                }
                Self {
                    width: self.width,
                    height: self.height,
                    format: PixelFormat::Rgba8,
                    data,
                }
            }
        }
    }

    /// Composite every pixel onto an opaque `background`.
    ///
    /// alpha 0 becomes the background, alpha 255 passes through unchanged,
    /// anything in between is blended. The result is fully opaque RGBA.
    pub fn flatten_onto(self, background: [u8; 3]) -> Self {
        if !self.has_transparency() {
            return self.into_rgba();
        }
        let mut data = self.data;
        for px in data.chunks_exact_mut(4) {
            let [r, g, b] = composite([px[0], px[1], px[2]], px[3], background);
            px[0] = r;
            px[1] = g;
            px[2] = b;
            px[3] = 255;
        }
        Self {
            width: self.width,
            height: self.height,
            format: PixelFormat::Rgba8,
            data,
        }
    }

    /// Tightly packed RGB samples with transparency composited onto `background`.
    pub fn to_rgb_flattened(&self, background: [u8; 3]) -> Vec<u8> {
        match self.format {
            PixelFormat::Rgb8 => self.data.clone(),
            PixelFormat::Rgba8 => {
                let mut out = Vec::with_capacity(self.data.len() / 4 * 3);
                for px in self.data.chunks_exact(4) {
                    out.extend_from_slice(&composite([px[0], px[1], px[2]], px[3], background));
                }
                out
            }
        }
    }
}

#[inline]
fn composite(rgb: [u8; 3], alpha: u8, background: [u8; 3]) -> [u8; 3] {
    match alpha {
        255 => rgb,
        0 => background,
        a => {
            let a = a as u32;
            let inv = 255 - a;
            let blend = |c: u8, bg: u8| ((c as u32 * a + bg as u32 * inv + 127) / 255) as u8;
            [
                blend(rgb[0], background[0]),
                blend(rgb[1], background[1]),
                blend(rgb[2], background[2]),
            ]
        }
    }
}

fn expected_len(width: u32, height: u32, format: PixelFormat) -> Option<usize> {
    (width as usize)
        .checked_mul(height as usize)?
        .checked_mul(format.channels())
}
