// src/codecs/palette.rs
//
// Palette reduction for GIF (and optional PNG quantization).
//
// The reference palette is Plan 9's 256-colour map: a 4x4x4 RGB cube where each
// cell is subdivided into 4 intensity steps. When fewer colours are requested the
// most used reference entries are kept. Pixels are mapped with optional
// Floyd-Steinberg error diffusion; pixels with alpha < 128 map to a single
// transparent index.

use crate::engine::{PixelBuffer, PixelFormat};
use std::sync::OnceLock;

/// Alpha below this is treated as fully transparent.
pub const ALPHA_THRESHOLD: u8 = 128;

/// Maximum palette size (including the transparent slot).
pub const MAX_COLORS: u16 = 256;

/// Minimum palette size.
pub const MIN_COLORS: u16 = 2;

static PLAN9: OnceLock<[[u8; 3]; 256]> = OnceLock::new();

/// The Plan 9 reference palette.
pub fn plan9() -> &'static [[u8; 3]; 256] {
    PLAN9.get_or_init(build_plan9)
}

fn build_plan9() -> [[u8; 3]; 256] {
    let mut palette = [[0u8; 3]; 256];
    for r in 0..4i32 {
        let mut i = (r * 64) as usize;
        for v in 0..4i32 {
            let mut j = v - r;
            for g in 0..4i32 {
                for b in 0..4i32 {
                    let den = r.max(g).max(b);
                    let color = if den == 0 {
                        let c = (17 * v) as u8;
                        [c, c, c]
                    } else {
                        let num = 17 * (4 * den + v);
                        [
                            (r * num / den) as u8,
                            (g * num / den) as u8,
                            (b * num / den) as u8,
                        ]
                    };
                    palette[i + (j & 15) as usize] = color;
                    j += 1;
                }
            }
            i += 16;
        }
    }
    palette
}

/// Palette-indexed image.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IndexedImage {
    pub width: u32,
    pub height: u32,
    /// Opaque colours; the transparent slot, if any, is not included
    pub palette: Vec<[u8; 3]>,
    pub indices: Vec<u8>,
    /// Index used for transparent pixels (always `palette.len()`)
    pub transparent: Option<u8>,
}

impl IndexedImage {
    /// Expand back to RGBA. Transparent pixels become `(0, 0, 0, 0)`.
    pub fn to_rgba(&self) -> PixelBuffer {
        let mut data = Vec::with_capacity(self.indices.len() * 4);
        for &idx in &self.indices {
            match self.palette.get(idx as usize) {
                Some(c) if Some(idx) != self.transparent => {
                    data.extend_from_slice(&[c[0], c[1], c[2], 255])
                }
                _ => data.extend_from_slice(&[0, 0, 0, 0]),
            }
        }
        match PixelBuffer::from_rgba(self.width, self.height, data) {
            Ok(buffer) => buffer,
            // indices.len() == width * height by construction
            Err(_) => PixelBuffer::filled(self.width, self.height, [0, 0, 0, 0]),
        }
    }

    /// Number of palette slots in use, including the transparent one.
    pub fn color_count(&self) -> usize {
        self.palette.len() + usize::from(self.transparent.is_some())
    }
}

/// Nearest-colour lookup over a 5-bit-per-channel grid.
struct ColorLookup {
    table: Vec<u8>,
}

impl ColorLookup {
    fn new(palette: &[[u8; 3]]) -> Self {
        let mut table = vec![0u8; 1 << 15];
        for (key, slot) in table.iter_mut().enumerate() {
            let target = [
                (((key >> 10) & 31) << 3 | 4) as i32,
                (((key >> 5) & 31) << 3 | 4) as i32,
                ((key & 31) << 3 | 4) as i32,
            ];
            *slot = nearest_exact(palette, target);
        }
        Self { table }
    }

    #[inline]
    fn nearest(&self, r: u8, g: u8, b: u8) -> u8 {
        let key = ((r as usize >> 3) << 10) | ((g as usize >> 3) << 5) | (b as usize >> 3);
        self.table[key]
    }
}

fn nearest_exact(palette: &[[u8; 3]], target: [i32; 3]) -> u8 {
    let mut best = 0usize;
    let mut best_dist = i32::MAX;
    for (i, c) in palette.iter().enumerate() {
        let dr = target[0] - c[0] as i32;
        let dg = target[1] - c[1] as i32;
        let db = target[2] - c[2] as i32;
        let dist = dr * dr + dg * dg + db * db;
        if dist < best_dist {
            best_dist = dist;
            best = i;
        }
    }
    best as u8
}

#[inline]
fn rgba_at(buffer: &PixelBuffer, idx: usize) -> [u8; 4] {
    let data = buffer.as_bytes();
    match buffer.format() {
        PixelFormat::Rgb8 => {
            let o = idx * 3;
            [data[o], data[o + 1], data[o + 2], 255]
        }
        PixelFormat::Rgba8 => {
            let o = idx * 4;
            [data[o], data[o + 1], data[o + 2], data[o + 3]]
        }
    }
}

/// Reference entries ranked by how many opaque pixels map to them; keep `keep`.
fn reduced_palette(buffer: &PixelBuffer, keep: usize) -> Vec<[u8; 3]> {
    let reference = plan9();
    if keep >= reference.len() {
        return reference.to_vec();
    }

    let lookup = ColorLookup::new(reference);
    let mut counts = [0u64; 256];
    let pixels = buffer.width() as usize * buffer.height() as usize;
    for i in 0..pixels {
        let [r, g, b, a] = rgba_at(buffer, i);
        if a >= ALPHA_THRESHOLD {
            counts[lookup.nearest(r, g, b) as usize] += 1;
        }
    }

    let mut ranked: Vec<usize> = (0..reference.len()).filter(|&i| counts[i] > 0).collect();
    // Stable on ties so the result is deterministic
    ranked.sort_by(|&a, &b| counts[b].cmp(&counts[a]).then(a.cmp(&b)));
    ranked.truncate(keep.max(1));
    if ranked.is_empty() {
        ranked.push(0);
    }
    ranked.into_iter().map(|i| reference[i]).collect()
}

/// Reduce `buffer` to at most `colors` palette entries (2-256, transparent slot included).
pub fn quantize(buffer: &PixelBuffer, colors: u16, dither: bool) -> IndexedImage {
    let colors = colors.clamp(MIN_COLORS, MAX_COLORS) as usize;
    let width = buffer.width() as usize;
    let height = buffer.height() as usize;

    let has_transparent = buffer.format().has_alpha()
        && buffer
            .as_bytes()
            .iter()
            .skip(3)
            .step_by(4)
            .any(|&a| a < ALPHA_THRESHOLD);
    let opaque_slots = if has_transparent { colors - 1 } else { colors };

    let palette = reduced_palette(buffer, opaque_slots);
    let transparent = has_transparent.then_some(palette.len() as u8);
    let lookup = ColorLookup::new(&palette);

    let mut indices = Vec::with_capacity(width * height);
    // Error rows scaled by 16, padded by one cell on each side
    let mut cur = vec![[0i32; 3]; width + 2];
    let mut next = vec![[0i32; 3]; width + 2];

    for y in 0..height {
        for x in 0..width {
            let [r, g, b, a] = rgba_at(buffer, y * width + x);
            if a < ALPHA_THRESHOLD {
                indices.push(transparent.unwrap_or(0));
                continue;
            }
            if !dither {
                indices.push(lookup.nearest(r, g, b));
                continue;
            }

            let e = cur[x + 1];
            let adj = [
                (r as i32 + e[0] / 16).clamp(0, 255),
                (g as i32 + e[1] / 16).clamp(0, 255),
                (b as i32 + e[2] / 16).clamp(0, 255),
            ];
            let idx = lookup.nearest(adj[0] as u8, adj[1] as u8, adj[2] as u8);
            indices.push(idx);

            let c = palette[idx as usize];
            for ch in 0..3 {
                let err = adj[ch] - c[ch] as i32;
                cur[x + 2][ch] += err * 7;
                next[x][ch] += err * 3;
                next[x + 1][ch] += err * 5;
                next[x + 2][ch] += err;
            }
        }
        std::mem::swap(&mut cur, &mut next);
        next.iter_mut().for_each(|e| *e = [0; 3]);
    }

    IndexedImage {
        width: buffer.width(),
        height: buffer.height(),
        palette,
        indices,
        transparent,
    }
}
