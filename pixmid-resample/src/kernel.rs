//! Convolution resamplers (Lanczos, Gaussian, Mitchell, box, Hermite)
//!
//! Filter taps are computed once per axis. When shrinking, the kernel is
//! widened by the scale factor so every source pixel contributes.

use rayon::prelude::*;

use crate::{
    BYTES_PER_PIXEL, GAUSSIAN_RADIUS, GAUSSIAN_SIGMA, LANCZOS_A, MITCHELL_B, MITCHELL_C, Source,
    to_u8,
};

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum Filter {
    Lanczos,
    Gaussian,
    Mitchell,
    Box,
    Hermite,
}

impl Filter {
    /// Kernel half-width in source pixels at scale 1
    fn support(self) -> f32 {
        match self {
            Filter::Lanczos => LANCZOS_A,
            Filter::Gaussian => GAUSSIAN_RADIUS,
            Filter::Mitchell => 2.0,
            Filter::Box => 0.5,
            Filter::Hermite => 1.0,
        }
    }

    fn weight(self, t: f32) -> f32 {
        match self {
            Filter::Lanczos => {
                if t.abs() < LANCZOS_A {
                    sinc(t) * sinc(t / LANCZOS_A)
                } else {
                    0.0
                }
            }
            Filter::Gaussian => {
                if t.abs() <= GAUSSIAN_RADIUS {
                    (-(t * t) / (2.0 * GAUSSIAN_SIGMA * GAUSSIAN_SIGMA)).exp()
                } else {
                    0.0
                }
            }
            Filter::Mitchell => mitchell(t.abs(), MITCHELL_B, MITCHELL_C),
            // Half-open so a tap exactly on a cell boundary is counted once
            Filter::Box => {
                if (-0.5..0.5).contains(&t) {
                    1.0
                } else {
                    0.0
                }
            }
            Filter::Hermite => {
                let t = t.abs();
                if t < 1.0 {
                    (2.0 * t - 3.0) * t * t + 1.0
                } else {
                    0.0
                }
            }
        }
    }
}

fn sinc(t: f32) -> f32 {
    if t == 0.0 {
        1.0
    } else {
        let a = t * std::f32::consts::PI;
        a.sin() / a
    }
}

fn mitchell(x: f32, b: f32, c: f32) -> f32 {
    let x2 = x * x;
    let x3 = x2 * x;
    let w = if x < 1.0 {
        (12.0 - 9.0 * b - 6.0 * c) * x3 + (-18.0 + 12.0 * b + 6.0 * c) * x2 + (6.0 - 2.0 * b)
    } else if x < 2.0 {
        (-b - 6.0 * c) * x3
            + (6.0 * b + 30.0 * c) * x2
            + (-12.0 * b - 48.0 * c) * x
            + (8.0 * b + 24.0 * c)
    } else {
        0.0
    };
    w / 6.0
}

// =============================================================================
// Axis contributions
// =============================================================================

/// Normalized (source index, weight) taps for one output coordinate
pub(crate) type Taps = Vec<(usize, f32)>;

/// Compute taps for every output coordinate along one axis
pub(crate) fn filter_taps(src_len: usize, dst_len: usize, filter: Filter) -> Vec<Taps> {
    let scale = src_len as f32 / dst_len as f32;
    let filter_scale = scale.max(1.0);
    let support = filter.support() * filter_scale;

    (0..dst_len)
        .map(|d| {
            let center = (d as f32 + 0.5) * scale;
            let left = (center - support).floor() as isize;
            let right = (center + support).ceil() as isize;

            let mut taps: Taps = Vec::with_capacity((right - left).max(1) as usize);
            for i in left..right {
                let w = filter.weight((i as f32 + 0.5 - center) / filter_scale);
                if w != 0.0 {
                    let idx = i.clamp(0, src_len as isize - 1) as usize;
                    taps.push((idx, w));
                }
            }
            normalize(&mut taps, center, src_len);
            taps
        })
        .collect()
}

/// Scale weights to sum to one; fall back to the nearest pixel if they cancel out
pub(crate) fn normalize(taps: &mut Taps, center: f32, src_len: usize) {
    let sum: f32 = taps.iter().map(|&(_, w)| w).sum();
    if sum.abs() < f32::EPSILON {
        taps.clear();
        let idx = (center.floor() as isize).clamp(0, src_len as isize - 1) as usize;
        taps.push((idx, 1.0));
    } else {
        for (_, w) in taps.iter_mut() {
            *w /= sum;
        }
    }
}

/// Apply precomputed taps in both directions, one output row per work unit
pub(crate) fn apply_taps(src: &Source, x_taps: &[Taps], y_taps: &[Taps]) -> Vec<u8> {
    let dst_w = x_taps.len();
    let dst_h = y_taps.len();

    let mut out = vec![0u8; dst_w * dst_h * BYTES_PER_PIXEL];
    out.par_chunks_mut(dst_w * BYTES_PER_PIXEL)
        .enumerate()
        .for_each(|(y, row)| {
            for (x, px) in row.chunks_exact_mut(BYTES_PER_PIXEL).enumerate() {
                let mut acc = [0.0f32; 4];
                for &(sy, wy) in &y_taps[y] {
                    for &(sx, wx) in &x_taps[x] {
                        let p = src.at(sx, sy);
                        let w = wx * wy;
                        for c in 0..BYTES_PER_PIXEL {
                            acc[c] += p[c] as f32 * w;
                        }
                    }
                }
                for c in 0..BYTES_PER_PIXEL {
                    px[c] = to_u8(acc[c]);
                }
            }
        });
    out
}

pub(crate) fn convolve(src: &Source, dst_w: usize, dst_h: usize, filter: Filter) -> Vec<u8> {
    let x_taps = filter_taps(src.width, dst_w, filter);
    let y_taps = filter_taps(src.height, dst_h, filter);
    apply_taps(src, &x_taps, &y_taps)
}

// =============================================================================
// Separable Hermite
// =============================================================================

/// Two-pass Hermite: horizontal into an f32 buffer, then vertical
pub(crate) fn hermite_separable(src: &Source, dst_w: usize, dst_h: usize) -> Vec<u8> {
    let x_taps = filter_taps(src.width, dst_w, Filter::Hermite);
    let y_taps = filter_taps(src.height, dst_h, Filter::Hermite);
    let row_len = dst_w * BYTES_PER_PIXEL;

    // Pass 1: source rows -> dst_w columns
    let mut horizontal = vec![0.0f32; src.height * row_len];
    horizontal
        .par_chunks_mut(row_len)
        .enumerate()
        .for_each(|(sy, row)| {
            for (x, px) in row.chunks_exact_mut(BYTES_PER_PIXEL).enumerate() {
                for &(sx, w) in &x_taps[x] {
                    let p = src.at(sx, sy);
                    for c in 0..BYTES_PER_PIXEL {
                        px[c] += p[c] as f32 * w;
                    }
                }
            }
        });

    // Pass 2: intermediate rows -> dst_h rows
    let mut out = vec![0u8; dst_h * row_len];
    out.par_chunks_mut(row_len)
        .enumerate()
        .for_each(|(y, row)| {
            let mut acc = vec![0.0f32; row_len];
            for &(sy, w) in &y_taps[y] {
                let src_row = &horizontal[sy * row_len..(sy + 1) * row_len];
                for (a, v) in acc.iter_mut().zip(src_row) {
                    *a += v * w;
                }
            }
            for (o, a) in row.iter_mut().zip(acc) {
                *o = to_u8(a);
            }
        });
    out
}
