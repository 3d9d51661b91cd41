//! Conversion and export error types

use std::time::Duration;

use pixmid_resample::ResampleError;

use crate::engine::ConversionState;

/// Errors raised while constructing or running a conversion
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConversionError {
    /// Palette is empty or too large
    #[error("invalid palette: {0}")]
    InvalidPalette(String),

    /// Configuration rejected before a run starts
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Source pixels could not be resampled
    #[error("resampling failed: {0}")]
    Resample(#[from] ResampleError),

    /// Unexpected fault during an asynchronous run
    #[error("conversion failed: {0}")]
    RuntimeFailure(String),

    /// Wait elapsed before the run finished (the run keeps going)
    #[error("timed out after {0:?} waiting for conversion")]
    Timeout(Duration),

    /// Buffers requested from a run that did not complete
    #[error("conversion has no result (state: {0})")]
    NotCompleted(ConversionState),
}

/// Errors raised while building or writing a sequence file
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    /// Export option out of range
    #[error("invalid export options: {0}")]
    InvalidOptions(String),

    /// Result track count does not match the palette
    #[error("expected {expected} tracks, found {found}")]
    TrackCountMismatch { expected: usize, found: usize },

    /// Gap between two events exceeds the 28-bit delta range
    #[error("delta time {0} exceeds the 28-bit limit")]
    DeltaOverflow(u64),

    /// Filesystem error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Hex color parse errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PaletteError {
    #[error("invalid color '{0}' (expected #rrggbb or #rrggbbaa)")]
    InvalidHex(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(
            ConversionError::InvalidArgument("max note length must be positive".into()).to_string(),
            "invalid argument: max note length must be positive"
        );
        assert_eq!(
            ConversionError::NotCompleted(ConversionState::Cancelled).to_string(),
            "conversion has no result (state: cancelled)"
        );
        assert_eq!(
            ExportError::TrackCountMismatch {
                expected: 3,
                found: 2
            }
            .to_string(),
            "expected 3 tracks, found 2"
        );
        assert_eq!(
            PaletteError::InvalidHex("#12".into()).to_string(),
            "invalid color '#12' (expected #rrggbb or #rrggbbaa)"
        );
    }
}
