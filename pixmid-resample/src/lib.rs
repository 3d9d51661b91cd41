//! pixmid-resample: RGBA8 image resampling for the pixmid pipeline
//!
//! Maps a source pixel buffer to a target width x height RGBA8 buffer using
//! one of eleven algorithms. Every algorithm is a pure function of its input
//! and computes each output row independently, so all of them run
//! data-parallel over output rows with `rayon`.
//!
//! # Edge Policy
//!
//! Source coordinates that fall outside the image clamp to the nearest valid
//! pixel. Nothing wraps. Alpha is resampled exactly like the color channels
//! (no premultiplication).
//!
//! # Usage
//!
//! ```
//! use pixmid_resample::{resize, ResizeAlgorithm};
//!
//! // 2x1 source: red, blue
//! let src = [255, 0, 0, 255, 0, 0, 255, 255];
//! let out = resize(&src, 8, 4, 2, ResizeAlgorithm::Nearest).unwrap();
//! assert_eq!(out.len(), 4 * 2 * 4);
//! ```

mod error;
mod grid;
mod interpolate;
mod kernel;
mod pooling;

pub use error::ResampleError;
pub use grid::PixelGrid;

use serde::Deserialize;
use std::fmt;
use std::str::FromStr;

// =============================================================================
// Constants
// =============================================================================

/// Bytes per RGBA8 pixel
pub const BYTES_PER_PIXEL: usize = 4;

/// Lanczos window size (a)
pub const LANCZOS_A: f32 = 3.0;

/// Gaussian standard deviation
pub const GAUSSIAN_SIGMA: f32 = 1.0;

/// Gaussian kernel radius in source pixels
pub const GAUSSIAN_RADIUS: f32 = 2.0;

/// Mitchell-Netravali B parameter
pub const MITCHELL_B: f32 = 1.0 / 3.0;

/// Mitchell-Netravali C parameter
pub const MITCHELL_C: f32 = 1.0 / 3.0;

// =============================================================================
// Algorithms
// =============================================================================

/// Resampling algorithm
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResizeAlgorithm {
    /// Nearest source pixel
    #[default]
    Nearest,
    /// Linear interpolation of the 2x2 neighborhood
    Bilinear,
    /// Cubic Hermite spline over the 4x4 neighborhood
    Bicubic,
    /// Windowed sinc, a = 3
    Lanczos,
    /// Gaussian, sigma = 1, radius 2
    Gaussian,
    /// Mitchell-Netravali, B = C = 1/3
    Mitchell,
    /// Box filter
    Box,
    /// Fractional-coverage area averaging
    Area,
    /// Box averaging through a summed-area table
    SummedArea,
    /// Most frequent exact color per cell
    Mode,
    /// Two-pass separable Hermite filter
    Hermite,
}

impl ResizeAlgorithm {
    /// All algorithms, in declaration order
    pub const ALL: [ResizeAlgorithm; 11] = [
        ResizeAlgorithm::Nearest,
        ResizeAlgorithm::Bilinear,
        ResizeAlgorithm::Bicubic,
        ResizeAlgorithm::Lanczos,
        ResizeAlgorithm::Gaussian,
        ResizeAlgorithm::Mitchell,
        ResizeAlgorithm::Box,
        ResizeAlgorithm::Area,
        ResizeAlgorithm::SummedArea,
        ResizeAlgorithm::Mode,
        ResizeAlgorithm::Hermite,
    ];

    /// Name used on the command line and in manifests
    pub fn name(self) -> &'static str {
        match self {
            ResizeAlgorithm::Nearest => "nearest",
            ResizeAlgorithm::Bilinear => "bilinear",
            ResizeAlgorithm::Bicubic => "bicubic",
            ResizeAlgorithm::Lanczos => "lanczos",
            ResizeAlgorithm::Gaussian => "gaussian",
            ResizeAlgorithm::Mitchell => "mitchell",
            ResizeAlgorithm::Box => "box",
            ResizeAlgorithm::Area => "area",
            ResizeAlgorithm::SummedArea => "summed-area",
            ResizeAlgorithm::Mode => "mode",
            ResizeAlgorithm::Hermite => "hermite",
        }
    }
}

impl fmt::Display for ResizeAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ResizeAlgorithm {
    type Err = ResampleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_ascii_lowercase();
        ResizeAlgorithm::ALL
            .into_iter()
            .find(|a| a.name() == lower)
            .ok_or_else(|| ResampleError::UnknownAlgorithm(s.to_string()))
    }
}

// =============================================================================
// Entry point
// =============================================================================

/// Resize an RGBA8 buffer to `target_width` x `target_height`
///
/// `stride` is the source row length in bytes; it must be a non-zero multiple
/// of 4 and must divide `pixels.len()`. The source width is `stride / 4` and
/// the source height is `pixels.len() / stride`.
///
/// # Errors
///
/// Returns an error if the stride or buffer length is inconsistent, or if
/// either target dimension is zero.
pub fn resize(
    pixels: &[u8],
    stride: usize,
    target_width: u32,
    target_height: u32,
    algorithm: ResizeAlgorithm,
) -> Result<Vec<u8>, ResampleError> {
    let (src_w, src_h) = grid::source_dimensions(pixels.len(), stride)?;
    if target_width == 0 || target_height == 0 {
        return Err(ResampleError::InvalidDimensions {
            width: target_width,
            height: target_height,
        });
    }

    let src = Source {
        pixels,
        width: src_w,
        height: src_h,
    };
    let dst_w = target_width as usize;
    let dst_h = target_height as usize;

    let out = match algorithm {
        ResizeAlgorithm::Nearest => interpolate::nearest(&src, dst_w, dst_h),
        ResizeAlgorithm::Bilinear => interpolate::bilinear(&src, dst_w, dst_h),
        ResizeAlgorithm::Bicubic => interpolate::bicubic(&src, dst_w, dst_h),
        ResizeAlgorithm::Lanczos => kernel::convolve(&src, dst_w, dst_h, kernel::Filter::Lanczos),
        ResizeAlgorithm::Gaussian => {
            kernel::convolve(&src, dst_w, dst_h, kernel::Filter::Gaussian)
        }
        ResizeAlgorithm::Mitchell => {
            kernel::convolve(&src, dst_w, dst_h, kernel::Filter::Mitchell)
        }
        ResizeAlgorithm::Box => kernel::convolve(&src, dst_w, dst_h, kernel::Filter::Box),
        ResizeAlgorithm::Area => pooling::area(&src, dst_w, dst_h),
        ResizeAlgorithm::SummedArea => pooling::summed_area(&src, dst_w, dst_h),
        ResizeAlgorithm::Mode => pooling::mode(&src, dst_w, dst_h),
        ResizeAlgorithm::Hermite => kernel::hermite_separable(&src, dst_w, dst_h),
    };

    debug_assert_eq!(out.len(), dst_w * dst_h * BYTES_PER_PIXEL);
    Ok(out)
}

// =============================================================================
// Shared helpers
// =============================================================================

/// Borrowed, validated source image
pub(crate) struct Source<'a> {
    pub pixels: &'a [u8],
    pub width: usize,
    pub height: usize,
}

impl Source<'_> {
    /// RGBA of the pixel at (x, y), clamping both coordinates into the image
    #[inline]
    pub fn clamped(&self, x: isize, y: isize) -> [u8; 4] {
        let x = x.clamp(0, self.width as isize - 1) as usize;
        let y = y.clamp(0, self.height as isize - 1) as usize;
        self.at(x, y)
    }

    #[inline]
    pub fn at(&self, x: usize, y: usize) -> [u8; 4] {
        let i = (y * self.width + x) * BYTES_PER_PIXEL;
        [
            self.pixels[i],
            self.pixels[i + 1],
            self.pixels[i + 2],
            self.pixels[i + 3],
        ]
    }
}

/// Map an output pixel center to a continuous source coordinate
#[inline]
pub(crate) fn source_center(dst: usize, scale: f32) -> f32 {
    (dst as f32 + 0.5) * scale - 0.5
}

#[inline]
pub(crate) fn to_u8(v: f32) -> u8 {
    v.round().clamp(0.0, 255.0) as u8
}
