// src/engine/resize.rs
//
// ResizeEngine: target geometry for fit/fill/stretch and Lanczos3 resampling.
//
// Geometry is integer math on the source dimensions so the same input and spec
// always give the same output size. Fill never materializes the oversized
// intermediate: the covering scale is expressed as a centered source crop window
// and resampled straight to the requested box.

use crate::engine::buffer::{PixelBuffer, PixelFormat};
use crate::error::{PixpipeError, Result};
use crate::ops::{ResizeMode, ResizeSpec};
use fast_image_resize::{self as fir, ImageBufferError, PixelType, ResizeOptions};
use image::{imageops::FilterType, RgbImage, RgbaImage};
use tracing::debug;

/// Resampling kernel. Constant so output is deterministic for a given input and spec.
const RESIZE_FILTER: fir::FilterType = fir::FilterType::Lanczos3;

/// Source window (in source pixels) sampled by a Fill resize.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CropWindow {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

/// Output geometry for one resize.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ResizePlan {
    pub width: u32,
    pub height: u32,
    pub crop: Option<CropWindow>,
}

/// Aspect-preserving box fit. A zero request axis is derived from the other;
/// a derived axis never drops below one pixel.
pub fn calc_fit_dimensions(src_w: u32, src_h: u32, req_w: u32, req_h: u32) -> (u32, u32) {
    let (sw, sh) = (src_w as u64, src_h as u64);
    let (rw, rh) = (req_w as u64, req_h as u64);
    match (req_w, req_h) {
        (0, 0) => (src_w, src_h),
        (_, 0) => (req_w, derive_axis(sh, rw, sw)),
        (0, _) => (derive_axis(sw, rh, sh), req_h),
        _ => {
            // rw/sw <= rh/sh: width is the binding constraint
            if rw * sh <= rh * sw {
                (req_w, derive_axis(sh, rw, sw))
            } else {
                (derive_axis(sw, rh, sh), req_h)
            }
        }
    }
}

#[inline]
fn derive_axis(src_other: u64, given: u64, src_given: u64) -> u32 {
    let value = src_other * given / src_given.max(1);
    value.clamp(1, u32::MAX as u64) as u32
}

/// Centered source window that, scaled by the larger of the two ratios,
/// covers exactly `req_w x req_h`.
pub fn calc_fill_crop(src_w: u32, src_h: u32, req_w: u32, req_h: u32) -> CropWindow {
    let (sw, sh) = (src_w as f64, src_h as f64);
    let (rw, rh) = (req_w as f64, req_h as f64);
    let scale = (rw / sw).max(rh / sh);
    let width = (rw / scale).min(sw);
    let height = (rh / scale).min(sh);
    CropWindow {
        left: (sw - width) / 2.0,
        top: (sh - height) / 2.0,
        width,
        height,
    }
}

/// Output geometry for `spec` applied to a `src_w x src_h` source.
pub fn plan_resize(src_w: u32, src_h: u32, spec: &ResizeSpec) -> ResizePlan {
    let one_axis = spec.width == 0 || spec.height == 0;
    match spec.mode {
        ResizeMode::AspectFit => {
            let (width, height) = calc_fit_dimensions(src_w, src_h, spec.width, spec.height);
            ResizePlan {
                width,
                height,
                crop: None,
            }
        }
        // With one axis free there is nothing to cover or stretch against.
        ResizeMode::Fill | ResizeMode::Stretch if one_axis => {
            let (width, height) = calc_fit_dimensions(src_w, src_h, spec.width, spec.height);
            ResizePlan {
                width,
                height,
                crop: None,
            }
        }
        ResizeMode::Fill => {
            let crop = calc_fill_crop(src_w, src_h, spec.width, spec.height);
            let full = crop.width >= src_w as f64 && crop.height >= src_h as f64;
            ResizePlan {
                width: spec.width,
                height: spec.height,
                crop: (!full).then_some(crop),
            }
        }
        ResizeMode::Stretch => ResizePlan {
            width: spec.width,
            height: spec.height,
            crop: None,
        },
    }
}

/// Resize engine with a fixed output bound.
#[derive(Clone, Copy, Debug)]
pub struct ResizeEngine {
    max_dimension: u32,
}

impl Default for ResizeEngine {
    fn default() -> Self {
        Self::new(crate::engine::MAX_DIMENSION)
    }
}

impl ResizeEngine {
    pub fn new(max_dimension: u32) -> Self {
        Self { max_dimension }
    }

    pub fn max_dimension(&self) -> u32 {
        self.max_dimension
    }

    /// Validate `spec` against `buffer` and compute the output geometry.
    pub fn plan(&self, src: (u32, u32), spec: &ResizeSpec) -> Result<ResizePlan> {
        let (src_w, src_h) = src;
        if src_w == 0 || src_h == 0 {
            return Err(PixpipeError::empty_image(src_w, src_h));
        }
        self.check_bound(spec.width.max(spec.height))?;
        let plan = plan_resize(src_w, src_h, spec);
        // A derived axis can exceed the bound even when the request does not.
        self.check_bound(plan.width.max(plan.height))?;
        Ok(plan)
    }

    fn check_bound(&self, largest: u32) -> Result<()> {
        if largest > self.max_dimension {
            return Err(PixpipeError::dimension_exceeds_limit(
                largest,
                self.max_dimension,
            ));
        }
        Ok(())
    }

    /// Resize `buffer` under `spec`. A 0x0 request returns the buffer untouched.
    pub fn resize(&self, buffer: PixelBuffer, spec: &ResizeSpec) -> Result<PixelBuffer> {
        if buffer.is_empty() {
            return Err(PixpipeError::empty_image(buffer.width(), buffer.height()));
        }
        if spec.is_passthrough() {
            return Ok(buffer);
        }

        let src = buffer.dimensions();
        let plan = self.plan(src, spec)?;
        debug!(
            mode = spec.mode.as_str(),
            src_w = src.0,
            src_h = src.1,
            dst_w = plan.width,
            dst_h = plan.height,
            cropped = plan.crop.is_some(),
            "resize plan"
        );

        if plan.crop.is_none() && (plan.width, plan.height) == src {
            return Ok(buffer);
        }

        resample(buffer, &plan)
            .map_err(|reason| PixpipeError::resize_failed(src, (plan.width, plan.height), reason))
    }
}

fn pixel_type_for(format: PixelFormat) -> PixelType {
    match format {
        PixelFormat::Rgb8 => PixelType::U8x3,
        PixelFormat::Rgba8 => PixelType::U8x4,
    }
}

fn resize_options(crop: Option<&CropWindow>) -> ResizeOptions {
    // fir premultiplies U8x4 sources itself, so no MulDiv pass here.
    let options = ResizeOptions::new().resize_alg(fir::ResizeAlg::Convolution(RESIZE_FILTER));
    match crop {
        Some(c) => options.crop(c.left, c.top, c.width, c.height),
        None => options,
    }
}

fn resample(buffer: PixelBuffer, plan: &ResizePlan) -> std::result::Result<PixelBuffer, String> {
    let (src_width, src_height) = buffer.dimensions();
    let format = buffer.format();
    let pixel_type = pixel_type_for(format);
    let mut src_pixels = buffer.into_raw();

    let primary = match fir::images::Image::from_slice_u8(
        src_width,
        src_height,
        src_pixels.as_mut_slice(),
        pixel_type,
    ) {
        Ok(src_image) => resize_with_source_image(&src_image, format, plan),
        Err(ImageBufferError::InvalidBufferAlignment) => {
            let aligned = copy_pixels_to_aligned_image(src_width, src_height, pixel_type, &src_pixels)?;
            resize_with_source_image(&aligned, format, plan)
        }
        Err(other) => Err(format!("fir source image error: {other:?}")),
    };

    match primary {
        Ok(resized) => Ok(resized),
        Err(err) => {
            debug!(error = %err, "fir resize failed, retrying with image crate");
            resize_with_image_crate_fallback(&src_pixels, src_width, src_height, format, plan)
                .map_err(|fallback_err| format!("{err}; image crate fallback failed: {fallback_err}"))
        }
    }
}

fn copy_pixels_to_aligned_image(
    width: u32,
    height: u32,
    pixel_type: PixelType,
    src_pixels: &[u8],
) -> std::result::Result<fir::images::Image<'static>, String> {
    let mut aligned = fir::images::Image::new(width, height, pixel_type);
    let aligned_buffer = aligned.buffer_mut();
    if aligned_buffer.len() != src_pixels.len() {
        return Err(format!(
            "fir alignment fallback buffer mismatch. expected {} bytes, got {} bytes",
            src_pixels.len(),
            aligned_buffer.len()
        ));
    }
    aligned_buffer.copy_from_slice(src_pixels);
    Ok(aligned)
}

fn resize_with_source_image(
    src_image: &fir::images::Image<'_>,
    format: PixelFormat,
    plan: &ResizePlan,
) -> std::result::Result<PixelBuffer, String> {
    let mut dst_image = fir::images::Image::new(plan.width, plan.height, pixel_type_for(format));
    let options = resize_options(plan.crop.as_ref());

    let mut resizer = fir::Resizer::new();
    resizer
        .resize(src_image, &mut dst_image, &options)
        .map_err(|e| format!("fir resize error: {e:?}"))?;

    PixelBuffer::new(plan.width, plan.height, format, dst_image.into_vec())
        .map_err(|e| e.to_string())
}

fn resize_with_image_crate_fallback(
    src_pixels: &[u8],
    src_width: u32,
    src_height: u32,
    format: PixelFormat,
    plan: &ResizePlan,
) -> std::result::Result<PixelBuffer, String> {
    let filter = FilterType::Lanczos3;
    let window = plan.crop.map(|c| {
        (
            c.left.round() as u32,
            c.top.round() as u32,
            (c.width.round() as u32).max(1),
            (c.height.round() as u32).max(1),
        )
    });

    match format {
        PixelFormat::Rgb8 => {
            let mut rgb = RgbImage::from_raw(src_width, src_height, src_pixels.to_vec())
                .ok_or_else(|| "failed to build rgb image for fallback resize".to_string())?;
            if let Some((x, y, w, h)) = window {
                rgb = image::imageops::crop_imm(&rgb, x, y, w, h).to_image();
            }
            let out = image::imageops::resize(&rgb, plan.width, plan.height, filter);
            PixelBuffer::from_rgb(plan.width, plan.height, out.into_raw()).map_err(|e| e.to_string())
        }
        PixelFormat::Rgba8 => {
            let mut rgba = RgbaImage::from_raw(src_width, src_height, src_pixels.to_vec())
                .ok_or_else(|| "failed to build rgba image for fallback resize".to_string())?;
            if let Some((x, y, w, h)) = window {
                rgba = image::imageops::crop_imm(&rgba, x, y, w, h).to_image();
            }
            let out = image::imageops::resize(&rgba, plan.width, plan.height, filter);
            PixelBuffer::from_rgba(plan.width, plan.height, out.into_raw())
                .map_err(|e| e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn create_test_buffer(width: u32, height: u32) -> PixelBuffer {
        let mut data = Vec::with_capacity((width * height * 4) as usize);
        for y in 0..height {
            for x in 0..width {
                data.extend_from_slice(&[(x % 256) as u8, (y % 256) as u8, 128, 255]);
            }
        }
        PixelBuffer::from_rgba(width, height, data).unwrap()
    }

    mod geometry_tests {
        use super::*;

        #[test]
        fn test_fit_width_only_derives_height() {
            assert_eq!(calc_fit_dimensions(100, 50, 200, 0), (200, 100));
            assert_eq!(calc_fit_dimensions(1000, 333, 100, 0), (100, 33));
        }

        #[test]
        fn test_fit_height_only_derives_width() {
            assert_eq!(calc_fit_dimensions(100, 50, 0, 25), (50, 25));
        }

        #[test]
        fn test_fit_both_uses_smaller_ratio() {
            // wide source into square box: width binds
            assert_eq!(calc_fit_dimensions(400, 200, 100, 100), (100, 50));
            // tall source into square box: height binds
            assert_eq!(calc_fit_dimensions(200, 400, 100, 100), (50, 100));
        }

        #[test]
        fn test_fit_derived_axis_clamped_to_one() {
            assert_eq!(calc_fit_dimensions(1000, 1, 10, 0), (10, 1));
        }

        #[test]
        fn test_fill_crop_is_centered() {
            let crop = calc_fill_crop(100, 50, 80, 80);
            // scale = max(0.8, 1.6) = 1.6, window = 50x50 centered horizontally
            assert!((crop.width - 50.0).abs() < 1e-9);
            assert!((crop.height - 50.0).abs() < 1e-9);
            assert!((crop.left - 25.0).abs() < 1e-9);
            assert!(crop.top.abs() < 1e-9);
        }

        #[test]
        fn test_plan_fill_one_axis_behaves_like_fit() {
            let plan = plan_resize(100, 50, &ResizeSpec::fill(0, 25));
            assert_eq!((plan.width, plan.height), (50, 25));
            assert!(plan.crop.is_none());
        }

        #[test]
        fn test_plan_stretch_exact() {
            let plan = plan_resize(100, 50, &ResizeSpec::stretch(30, 90));
            assert_eq!((plan.width, plan.height), (30, 90));
        }
    }

    mod engine_tests {
        use super::*;

        #[test]
        fn test_aspect_fit_scenario() {
            let engine = ResizeEngine::default();
            let out = engine
                .resize(create_test_buffer(100, 50), &ResizeSpec::fit(200, 0))
                .unwrap();
            assert_eq!(out.dimensions(), (200, 100));
        }

        #[test]
        fn test_fill_scenario_exact_size() {
            let engine = ResizeEngine::default();
            let out = engine
                .resize(create_test_buffer(100, 50), &ResizeSpec::fill(80, 80))
                .unwrap();
            assert_eq!(out.dimensions(), (80, 80));
            assert_eq!(out.as_bytes().len(), 80 * 80 * 4);
        }

        #[test]
        fn test_stretch_ignores_aspect() {
            let engine = ResizeEngine::default();
            let out = engine
                .resize(create_test_buffer(64, 64), &ResizeSpec::stretch(10, 40))
                .unwrap();
            assert_eq!(out.dimensions(), (10, 40));
        }

        #[test]
        fn test_passthrough_returns_same_buffer() {
            let engine = ResizeEngine::default();
            let input = create_test_buffer(7, 3);
            let out = engine.resize(input.clone(), &ResizeSpec::default()).unwrap();
            assert_eq!(out, input);
        }

        #[test]
        fn test_rgb_buffer_resizes() {
            let engine = ResizeEngine::default();
            let input = PixelBuffer::from_rgb(20, 10, vec![90; 20 * 10 * 3]).unwrap();
            let out = engine.resize(input, &ResizeSpec::fit(10, 0)).unwrap();
            assert_eq!(out.dimensions(), (10, 5));
            assert_eq!(out.format(), PixelFormat::Rgb8);
        }

        #[test]
        fn test_empty_input_rejected() {
            let engine = ResizeEngine::default();
            let empty = PixelBuffer::from_rgba(0, 0, Vec::new()).unwrap();
            let err = engine.resize(empty, &ResizeSpec::fit(10, 10)).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidFormat);
        }

        #[test]
        fn test_oversized_request_rejected() {
            let engine = ResizeEngine::new(8192);
            let err = engine
                .resize(create_test_buffer(4, 4), &ResizeSpec::stretch(8193, 10))
                .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidSize);
        }

        #[test]
        fn test_oversized_derived_axis_rejected() {
            let engine = ResizeEngine::new(1000);
            let err = engine
                .resize(create_test_buffer(1, 100), &ResizeSpec::fit(20, 0))
                .unwrap_err();
            assert!(matches!(
                err,
                PixpipeError::DimensionExceedsLimit { dimension: 2000, .. }
            ));
        }

        #[test]
        fn test_solid_colour_survives_resampling() {
            let engine = ResizeEngine::default();
            let input = PixelBuffer::filled(32, 16, [40, 80, 120, 255]);
            let out = engine.resize(input, &ResizeSpec::fill(8, 8)).unwrap();
            assert_eq!(out.pixel(4, 4), Some([40, 80, 120, 255]));
        }
    }
}
