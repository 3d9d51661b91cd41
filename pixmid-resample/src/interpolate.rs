//! Point-sampling interpolators (nearest, bilinear, bicubic)
//!
//! Each output pixel samples the source at its mapped center. No low-pass
//! filtering is applied when shrinking.

use rayon::prelude::*;

use crate::{BYTES_PER_PIXEL, Source, source_center, to_u8};

pub(crate) fn nearest(src: &Source, dst_w: usize, dst_h: usize) -> Vec<u8> {
    let sx = src.width as f32 / dst_w as f32;
    let sy = src.height as f32 / dst_h as f32;

    // Column lookup is shared by every row
    let cols: Vec<isize> = (0..dst_w)
        .map(|x| ((x as f32 + 0.5) * sx).floor() as isize)
        .collect();

    let mut out = vec![0u8; dst_w * dst_h * BYTES_PER_PIXEL];
    out.par_chunks_mut(dst_w * BYTES_PER_PIXEL)
        .enumerate()
        .for_each(|(y, row)| {
            let src_y = ((y as f32 + 0.5) * sy).floor() as isize;
            for (x, px) in row.chunks_exact_mut(BYTES_PER_PIXEL).enumerate() {
                px.copy_from_slice(&src.clamped(cols[x], src_y));
            }
        });
    out
}

pub(crate) fn bilinear(src: &Source, dst_w: usize, dst_h: usize) -> Vec<u8> {
    let sx = src.width as f32 / dst_w as f32;
    let sy = src.height as f32 / dst_h as f32;

    let mut out = vec![0u8; dst_w * dst_h * BYTES_PER_PIXEL];
    out.par_chunks_mut(dst_w * BYTES_PER_PIXEL)
        .enumerate()
        .for_each(|(y, row)| {
            let fy = source_center(y, sy);
            let y0 = fy.floor();
            let ty = fy - y0;
            let y0 = y0 as isize;

            for (x, px) in row.chunks_exact_mut(BYTES_PER_PIXEL).enumerate() {
                let fx = source_center(x, sx);
                let x0 = fx.floor();
                let tx = fx - x0;
                let x0 = x0 as isize;

                let p00 = src.clamped(x0, y0);
                let p10 = src.clamped(x0 + 1, y0);
                let p01 = src.clamped(x0, y0 + 1);
                let p11 = src.clamped(x0 + 1, y0 + 1);

                for c in 0..BYTES_PER_PIXEL {
                    let top = p00[c] as f32 + (p10[c] as f32 - p00[c] as f32) * tx;
                    let bottom = p01[c] as f32 + (p11[c] as f32 - p01[c] as f32) * tx;
                    px[c] = to_u8(top + (bottom - top) * ty);
                }
            }
        });
    out
}

/// Cubic Hermite spline through p1..p2 with tangents from p0 and p3
#[inline]
fn cubic_hermite(p0: f32, p1: f32, p2: f32, p3: f32, t: f32) -> f32 {
    let a = -p0 / 2.0 + (3.0 * p1) / 2.0 - (3.0 * p2) / 2.0 + p3 / 2.0;
    let b = p0 - (5.0 * p1) / 2.0 + 2.0 * p2 - p3 / 2.0;
    let c = -p0 / 2.0 + p2 / 2.0;
    let d = p1;
    ((a * t + b) * t + c) * t + d
}

pub(crate) fn bicubic(src: &Source, dst_w: usize, dst_h: usize) -> Vec<u8> {
    let sx = src.width as f32 / dst_w as f32;
    let sy = src.height as f32 / dst_h as f32;

    let mut out = vec![0u8; dst_w * dst_h * BYTES_PER_PIXEL];
    out.par_chunks_mut(dst_w * BYTES_PER_PIXEL)
        .enumerate()
        .for_each(|(y, row)| {
            let fy = source_center(y, sy);
            let y1 = fy.floor();
            let ty = fy - y1;
            let y1 = y1 as isize;

            for (x, px) in row.chunks_exact_mut(BYTES_PER_PIXEL).enumerate() {
                let fx = source_center(x, sx);
                let x1 = fx.floor();
                let tx = fx - x1;
                let x1 = x1 as isize;

                for c in 0..BYTES_PER_PIXEL {
                    let mut column = [0.0f32; 4];
                    for (j, value) in column.iter_mut().enumerate() {
                        let yy = y1 - 1 + j as isize;
                        let p = |dx: isize| src.clamped(x1 + dx, yy)[c] as f32;
                        *value = cubic_hermite(p(-1), p(0), p(1), p(2), tx);
                    }
                    px[c] = to_u8(cubic_hermite(column[0], column[1], column[2], column[3], ty));
                }
            }
        });
    out
}
