//! Cell-pooling resamplers (area, summed-area table, mode)
//!
//! Each output pixel summarizes the block of source pixels its cell covers.

use hashbrown::HashMap;
use rayon::prelude::*;

use crate::kernel::{Taps, apply_taps, normalize};
use crate::{BYTES_PER_PIXEL, Source};

/// Integer source span [start, end) covered by output cell `d`, never empty
#[inline]
fn cell_span(d: usize, src_len: usize, dst_len: usize) -> (usize, usize) {
    let start = (d * src_len / dst_len).min(src_len - 1);
    let end = ((d + 1) * src_len).div_ceil(dst_len).clamp(start + 1, src_len);
    (start, end)
}

// =============================================================================
// Area-weighted
// =============================================================================

/// Taps weighted by the exact overlap of each source pixel with the cell
fn coverage_taps(src_len: usize, dst_len: usize) -> Vec<Taps> {
    let scale = src_len as f32 / dst_len as f32;
    (0..dst_len)
        .map(|d| {
            let lo = d as f32 * scale;
            let hi = lo + scale;
            let first = (lo.floor() as usize).min(src_len - 1);
            let last = (hi.ceil() as usize).clamp(first + 1, src_len);

            let mut taps: Taps = Vec::with_capacity(last - first);
            for i in first..last {
                let overlap = (hi.min(i as f32 + 1.0) - lo.max(i as f32)).max(0.0);
                if overlap > 0.0 {
                    taps.push((i, overlap));
                }
            }
            normalize(&mut taps, lo + scale / 2.0, src_len);
            taps
        })
        .collect()
}

pub(crate) fn area(src: &Source, dst_w: usize, dst_h: usize) -> Vec<u8> {
    let x_taps = coverage_taps(src.width, dst_w);
    let y_taps = coverage_taps(src.height, dst_h);
    apply_taps(src, &x_taps, &y_taps)
}

// =============================================================================
// Summed-area table
// =============================================================================

/// Integral image with a zero border: entry (x, y) sums all pixels above-left
struct SummedAreaTable {
    stride: usize,
    sums: Vec<u64>,
}

impl SummedAreaTable {
    fn build(src: &Source) -> Self {
        let stride = (src.width + 1) * BYTES_PER_PIXEL;
        let mut sums = vec![0u64; stride * (src.height + 1)];

        // Row prefix sums are independent
        sums[stride..]
            .par_chunks_mut(stride)
            .enumerate()
            .for_each(|(y, row)| {
                let mut acc = [0u64; 4];
                for x in 0..src.width {
                    let p = src.at(x, y);
                    let cell = &mut row[(x + 1) * BYTES_PER_PIXEL..(x + 2) * BYTES_PER_PIXEL];
                    for c in 0..BYTES_PER_PIXEL {
                        acc[c] += p[c] as u64;
                        cell[c] = acc[c];
                    }
                }
            });

        // Column accumulation depends on the previous row
        for y in 2..=src.height {
            let (above, rest) = sums.split_at_mut(y * stride);
            let prev = &above[(y - 1) * stride..];
            for (v, p) in rest[..stride].iter_mut().zip(prev) {
                *v += p;
            }
        }

        Self { stride, sums }
    }

    #[inline]
    fn get(&self, x: usize, y: usize, c: usize) -> u64 {
        self.sums[y * self.stride + x * BYTES_PER_PIXEL + c]
    }

    /// Channel sums over [x0, x1) x [y0, y1)
    fn rect(&self, x0: usize, y0: usize, x1: usize, y1: usize) -> [u64; 4] {
        let mut out = [0u64; 4];
        for (c, v) in out.iter_mut().enumerate() {
            *v = self.get(x1, y1, c) + self.get(x0, y0, c) - self.get(x0, y1, c) - self.get(x1, y0, c);
        }
        out
    }
}

pub(crate) fn summed_area(src: &Source, dst_w: usize, dst_h: usize) -> Vec<u8> {
    let table = SummedAreaTable::build(src);
    let cols: Vec<(usize, usize)> = (0..dst_w).map(|x| cell_span(x, src.width, dst_w)).collect();

    let mut out = vec![0u8; dst_w * dst_h * BYTES_PER_PIXEL];
    out.par_chunks_mut(dst_w * BYTES_PER_PIXEL)
        .enumerate()
        .for_each(|(y, row)| {
            let (y0, y1) = cell_span(y, src.height, dst_h);
            for (px, &(x0, x1)) in row.chunks_exact_mut(BYTES_PER_PIXEL).zip(&cols) {
                let count = ((x1 - x0) * (y1 - y0)) as u64;
                let sums = table.rect(x0, y0, x1, y1);
                for c in 0..BYTES_PER_PIXEL {
                    // Rounded integer mean
                    px[c] = ((sums[c] + count / 2) / count) as u8;
                }
            }
        });
    out
}

// =============================================================================
// Mode pooling
// =============================================================================

/// Most frequent exact RGBA value per cell; ties go to the first seen in scan order
pub(crate) fn mode(src: &Source, dst_w: usize, dst_h: usize) -> Vec<u8> {
    let cols: Vec<(usize, usize)> = (0..dst_w).map(|x| cell_span(x, src.width, dst_w)).collect();

    let mut out = vec![0u8; dst_w * dst_h * BYTES_PER_PIXEL];
    out.par_chunks_mut(dst_w * BYTES_PER_PIXEL)
        .enumerate()
        .for_each(|(y, row)| {
            let (y0, y1) = cell_span(y, src.height, dst_h);
            // (count, first seen) per packed color
            let mut counts: HashMap<u32, (u32, u32)> = HashMap::new();

            for (px, &(x0, x1)) in row.chunks_exact_mut(BYTES_PER_PIXEL).zip(&cols) {
                counts.clear();
                let mut order = 0u32;
                for sy in y0..y1 {
                    for sx in x0..x1 {
                        let key = u32::from_le_bytes(src.at(sx, sy));
                        let entry = counts.entry(key).or_insert((0, order));
                        entry.0 += 1;
                        order += 1;
                    }
                }

                let best = counts
                    .iter()
                    .max_by(|a, b| a.1.0.cmp(&b.1.0).then(b.1.1.cmp(&a.1.1)))
                    .map(|(&key, _)| key)
                    .unwrap_or_default();
                px.copy_from_slice(&best.to_le_bytes());
            }
        });
    out
}
