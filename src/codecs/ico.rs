// src/codecs/ico.rs
//
// ICO container reader. General-purpose decoders do not reliably pick the best
// sub-image, so the directory is parsed here:
//
//   validate header -> scan directory -> select best entry -> extract pixels
//
// Entry payloads are either raw bottom-up BGR(A) rows (optionally preceded by a
// 40-byte BITMAPINFOHEADER) or an embedded PNG stream.

use super::png::{PngCodec, PNG_SIGNATURE};
use super::FormatCodec;
use crate::engine::common::run_with_panic_policy;
use crate::engine::PixelBuffer;
use crate::error::{PixpipeError, Result};
use tracing::debug;

/// Reserved(2) = 0, type(2) = 1 (icon).
pub const ICO_SIGNATURE: [u8; 4] = [0x00, 0x00, 0x01, 0x00];

const HEADER_LEN: usize = 6;
const ENTRY_LEN: usize = 16;
const BITMAPINFOHEADER_LEN: u32 = 40;

/// One 16-byte directory record.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IcoDirectoryEntry {
    /// Stored 0 means 256
    pub width: u32,
    pub height: u32,
    pub bits_per_pixel: u16,
    pub length: u32,
    pub offset: u32,
}

impl IcoDirectoryEntry {
    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

#[inline]
fn read_u16_le(data: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([data[at], data[at + 1]])
}

#[inline]
fn read_u32_le(data: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([data[at], data[at + 1], data[at + 2], data[at + 3]])
}

/// Check the signature and return the entry count.
pub fn validate_header(data: &[u8]) -> Result<u16> {
    if data.len() < HEADER_LEN {
        return Err(PixpipeError::invalid_ico(format!(
            "header needs {HEADER_LEN} bytes, got {}",
            data.len()
        )));
    }
    if data[0..4] != ICO_SIGNATURE {
        return Err(PixpipeError::invalid_ico("bad signature"));
    }
    let count = read_u16_le(data, 4);
    if count == 0 {
        return Err(PixpipeError::invalid_ico("directory is empty"));
    }
    Ok(count)
}

/// Read `count` directory records following the header.
pub fn scan_directory(data: &[u8], count: u16) -> Result<Vec<IcoDirectoryEntry>> {
    (0..count as usize)
        .map(|i| {
            let at = HEADER_LEN + ENTRY_LEN * i;
            if at + ENTRY_LEN > data.len() {
                return Err(PixpipeError::invalid_ico(format!(
                    "directory entry {i} runs past end of data"
                )));
            }
            let dim = |b: u8| if b == 0 { 256 } else { b as u32 };
            Ok(IcoDirectoryEntry {
                width: dim(data[at]),
                height: dim(data[at + 1]),
                bits_per_pixel: read_u16_le(data, at + 6),
                length: read_u32_le(data, at + 8),
                offset: read_u32_le(data, at + 12),
            })
        })
        .collect()
}

/// Largest area wins; equal areas go to the higher bit depth. First wins on a full tie.
pub fn select_best_entry(entries: &[IcoDirectoryEntry]) -> Option<&IcoDirectoryEntry> {
    entries.iter().fold(None, |best, entry| match best {
        Some(b) if (b.area(), b.bits_per_pixel) >= (entry.area(), entry.bits_per_pixel) => Some(b),
        _ => Some(entry),
    })
}

/// Payload bytes for `entry`, bounds-checked against `data`.
fn entry_payload<'a>(data: &'a [u8], entry: &IcoDirectoryEntry) -> Result<&'a [u8]> {
    let start = entry.offset as usize;
    let end = start
        .checked_add(entry.length as usize)
        .filter(|&end| end <= data.len())
        .ok_or_else(|| {
            PixpipeError::invalid_ico(format!(
                "image data at {}+{} exceeds file length {}",
                entry.offset,
                entry.length,
                data.len()
            ))
        })?;
    Ok(&data[start..end])
}

/// True when `payload` opens with a BITMAPINFOHEADER describing `entry`.
///
/// The header height counts the XOR and AND masks together, so it is either the
/// entry height or twice it. A raw pixel row that happens to start with the
/// bytes `28 00 00 00` does not match both dimensions.
fn has_info_header(payload: &[u8], entry: &IcoDirectoryEntry) -> bool {
    if payload.len() < BITMAPINFOHEADER_LEN as usize
        || read_u32_le(payload, 0) != BITMAPINFOHEADER_LEN
    {
        return false;
    }
    let header_width = read_u32_le(payload, 4) as i32;
    let header_height = (read_u32_le(payload, 8) as i32).unsigned_abs();
    header_width >= 0
        && header_width as u32 == entry.width
        && (header_height == entry.height || header_height == entry.height * 2)
}

/// Decode raw bottom-up BGR/BGRA rows into RGBA.
pub fn extract_pixels(payload: &[u8], entry: &IcoDirectoryEntry) -> Result<PixelBuffer> {
    let (width, height) = (entry.width as usize, entry.height as usize);

    let (bytes_per_px, stride) = match entry.bits_per_pixel {
        32 => (4, width * 4),
        24 => (3, (width * 3 + 3) & !3),
        other => return Err(PixpipeError::unsupported_bit_depth(other)),
    };
    let needed = stride * height;

    let pixels = if has_info_header(payload, entry) {
        &payload[BITMAPINFOHEADER_LEN as usize..]
    } else {
        let header_tag = payload.len() >= 4 && read_u32_le(payload, 0) == BITMAPINFOHEADER_LEN;
        if header_tag && payload.len() < BITMAPINFOHEADER_LEN as usize && payload.len() < needed {
            return Err(PixpipeError::invalid_ico("truncated BITMAPINFOHEADER"));
        }
        payload
    };

    if pixels.len() < needed {
        return Err(PixpipeError::invalid_ico(format!(
            "{}x{} {}bpp needs {needed} bytes of pixel data, got {}",
            width,
            height,
            entry.bits_per_pixel,
            pixels.len()
        )));
    }

    let mut out = vec![0u8; width * height * 4];
    for y in 0..height {
        let src_row = &pixels[y * stride..y * stride + width * bytes_per_px];
        let dst_y = height - 1 - y;
        let dst_row = &mut out[dst_y * width * 4..(dst_y + 1) * width * 4];
        for (src, dst) in src_row
            .chunks_exact(bytes_per_px)
            .zip(dst_row.chunks_exact_mut(4))
        {
            dst[0] = src[2];
            dst[1] = src[1];
            dst[2] = src[0];
            dst[3] = if bytes_per_px == 4 { src[3] } else { 255 };
        }
    }

    PixelBuffer::from_rgba(entry.width, entry.height, out)
}

/// Decode the best sub-image of an ICO file.
pub fn decode_ico(data: &[u8]) -> Result<PixelBuffer> {
    run_with_panic_policy("decode:ico", || {
        let count = validate_header(data)?;
        let entries = scan_directory(data, count)?;
        let best = select_best_entry(&entries)
            .ok_or_else(|| PixpipeError::invalid_ico("directory is empty"))?;
        debug!(
            entries = entries.len(),
            width = best.width,
            height = best.height,
            bpp = best.bits_per_pixel,
            "ico entry selected"
        );

        let payload = entry_payload(data, best)?;
        if payload.starts_with(&PNG_SIGNATURE) {
            return PngCodec::default().decode(payload);
        }
        extract_pixels(payload, best)
    })
}

#[cfg(test)]
pub(crate) mod test_support {
    /// Build an ICO file from `(width, height, bpp, payload)` entries.
    pub fn build_ico(entries: &[(u8, u8, u16, Vec<u8>)]) -> Vec<u8> {
        let mut out = vec![0x00, 0x00, 0x01, 0x00];
        out.extend_from_slice(&(entries.len() as u16).to_le_bytes());
        let mut offset = 6 + 16 * entries.len() as u32;
        for (w, h, bpp, payload) in entries {
            out.extend_from_slice(&[*w, *h, 0, 0]);
            out.extend_from_slice(&1u16.to_le_bytes());
            out.extend_from_slice(&bpp.to_le_bytes());
            out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
            out.extend_from_slice(&offset.to_le_bytes());
            offset += payload.len() as u32;
        }
        for (_, _, _, payload) in entries {
            out.extend_from_slice(payload);
        }
        out
    }

    /// Bottom-up BGRA rows of one colour.
    pub fn bgra_payload(width: usize, height: usize, bgra: [u8; 4]) -> Vec<u8> {
        bgra.iter().copied().cycle().take(width * height * 4).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::{bgra_payload, build_ico};
    use super::*;
    use crate::error::ErrorKind;

    fn entry(width: u32, height: u32, bpp: u16) -> IcoDirectoryEntry {
        IcoDirectoryEntry {
            width,
            height,
            bits_per_pixel: bpp,
            length: 0,
            offset: 0,
        }
    }

    mod header_tests {
        use super::*;

        #[test]
        fn test_too_short() {
            let err = validate_header(&[0, 0, 1]).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidFormat);
        }

        #[test]
        fn test_bad_signature() {
            let mut ico = build_ico(&[(32, 32, 32, bgra_payload(32, 32, [0; 4]))]);
            ico[2] = 0x02;
            let err = decode_ico(&ico).unwrap_err();
            assert!(matches!(err, PixpipeError::InvalidIco { .. }));
        }

        #[test]
        fn test_zero_count() {
            let err = validate_header(&[0, 0, 1, 0, 0, 0]).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidFormat);
        }

        #[test]
        fn test_truncated_directory() {
            // claims two entries, carries one
            let mut ico = build_ico(&[(16, 16, 32, Vec::new())]);
            ico[4] = 2;
            ico.truncate(6 + 16);
            let err = decode_ico(&ico).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidFormat);
        }
    }

    mod selection_tests {
        use super::*;

        #[test]
        fn test_largest_area_wins() {
            let entries = [entry(16, 16, 32), entry(48, 48, 32), entry(32, 32, 32)];
            assert_eq!(select_best_entry(&entries), Some(&entries[1]));
        }

        #[test]
        fn test_bit_depth_breaks_ties() {
            let entries = [entry(32, 32, 8), entry(32, 32, 32)];
            assert_eq!(select_best_entry(&entries).unwrap().bits_per_pixel, 32);
            let entries = [entry(32, 32, 32), entry(32, 32, 8)];
            assert_eq!(select_best_entry(&entries).unwrap().bits_per_pixel, 32);
        }

        #[test]
        fn test_zero_byte_means_256() {
            let ico = build_ico(&[(0, 0, 32, Vec::new())]);
            let entries = scan_directory(&ico, 1).unwrap();
            assert_eq!((entries[0].width, entries[0].height), (256, 256));
        }
    }

    mod extract_tests {
        use super::*;

        #[test]
        fn test_32bpp_decodes_with_flip_and_reorder() {
            // 1x2: bottom row (first in file) blue, top row red, half alpha
            let payload = vec![255, 0, 0, 128, 0, 0, 255, 128];
            let ico = build_ico(&[(1, 2, 32, payload)]);
            let img = decode_ico(&ico).unwrap();
            assert_eq!(img.dimensions(), (1, 2));
            assert_eq!(img.pixel(0, 0), Some([255, 0, 0, 128]));
            assert_eq!(img.pixel(0, 1), Some([0, 0, 255, 128]));
        }

        #[test]
        fn test_24bpp_rows_are_padded_and_opaque() {
            // width 1 -> 3 bytes + 1 pad per row
            let payload = vec![10, 20, 30, 0, 40, 50, 60, 0];
            let ico = build_ico(&[(1, 2, 24, payload)]);
            let img = decode_ico(&ico).unwrap();
            assert_eq!(img.pixel(0, 1), Some([30, 20, 10, 255]));
            assert_eq!(img.pixel(0, 0), Some([60, 50, 40, 255]));
        }

        #[test]
        fn test_bitmapinfoheader_is_skipped() {
            let mut payload = vec![0u8; 40];
            payload[0] = 40;
            payload[4] = 2;
            // XOR + AND mask rows
            payload[8] = 4;
            payload.extend_from_slice(&bgra_payload(2, 2, [1, 2, 3, 255]));
            let ico = build_ico(&[(2, 2, 32, payload)]);
            let img = decode_ico(&ico).unwrap();
            assert_eq!(img.pixel(1, 1), Some([3, 2, 1, 255]));
        }

        #[test]
        fn test_truncated_header_is_invalid_format() {
            let ico = build_ico(&[(2, 2, 32, vec![40, 0, 0, 0, 1, 2, 3, 4])]);
            let err = decode_ico(&ico).unwrap_err();
            assert!(matches!(err, PixpipeError::InvalidIco { .. }), "{err}");
            assert_eq!(err.kind(), ErrorKind::InvalidFormat);
        }

        #[test]
        fn test_raw_pixels_starting_with_header_tag() {
            // 4x4 32bpp, first stored pixel is BGRA (40, 0, 0, 0)
            let mut payload = bgra_payload(4, 4, [9, 9, 9, 255]);
            payload[..4].copy_from_slice(&[40, 0, 0, 0]);
            let ico = build_ico(&[(4, 4, 32, payload)]);
            let img = decode_ico(&ico).unwrap();
            assert_eq!(img.dimensions(), (4, 4));
            // first stored row is the bottom row
            assert_eq!(img.pixel(0, 3), Some([0, 0, 40, 0]));
            assert_eq!(img.pixel(1, 3), Some([9, 9, 9, 255]));
        }

        #[test]
        fn test_unsupported_bit_depth() {
            let ico = build_ico(&[(4, 4, 8, vec![0; 64])]);
            let err = decode_ico(&ico).unwrap_err();
            assert!(matches!(err, PixpipeError::UnsupportedBitDepth { bits: 8 }));
            assert_eq!(err.kind(), ErrorKind::InvalidFormat);
        }

        #[test]
        fn test_payload_out_of_bounds() {
            let mut ico = build_ico(&[(2, 2, 32, bgra_payload(2, 2, [0; 4]))]);
            ico.truncate(ico.len() - 1);
            let err = decode_ico(&ico).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidFormat);
        }

        #[test]
        fn test_short_pixel_data_rejected() {
            let ico = build_ico(&[(4, 4, 32, vec![0; 20])]);
            let err = decode_ico(&ico).unwrap_err();
            assert!(matches!(err, PixpipeError::InvalidIco { .. }));
        }

        #[test]
        fn test_png_payload() {
            let buffer = PixelBuffer::filled(5, 3, [7, 8, 9, 200]);
            let png = PngCodec::default()
                .encode(&buffer, crate::ops::Quality::DEFAULT)
                .unwrap();
            let ico = build_ico(&[(5, 3, 32, png)]);
            assert_eq!(decode_ico(&ico).unwrap(), buffer);
        }
    }
}
