//! Resampling error types

/// Resampling error types
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResampleError {
    /// Stride is zero or not a multiple of 4
    #[error("invalid stride {0} (must be a non-zero multiple of 4)")]
    InvalidStride(usize),

    /// Buffer length is empty or not a whole number of rows
    #[error("buffer of {len} bytes is not a whole number of {stride}-byte rows")]
    InconsistentBuffer { len: usize, stride: usize },

    /// Requested output has a zero dimension
    #[error("invalid target dimensions {width}x{height}")]
    InvalidDimensions { width: u32, height: u32 },

    /// Algorithm name not recognized
    #[error("unknown resize algorithm: {0}")]
    UnknownAlgorithm(String),
}
