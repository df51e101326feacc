//! Error types for conversion operations
//!
//! Conversion failures are local to a single call: they never touch the
//! capture buffer, so the next call starts fresh.

use thiserror::Error;

/// Errors that can occur while converting a packed frame
#[derive(Error, Debug)]
pub enum ConversionError {
    /// Frame dimensions cannot be represented in v210
    ///
    /// Width must be a non-zero multiple of 6 (one packed chunk) and
    /// height must be non-zero.
    #[error("Invalid frame geometry: {0}")]
    InvalidGeometry(String),

    /// Packed source is shorter than the geometry requires
    #[error("Source frame too small: need {needed} words, got {actual}")]
    SourceTooSmall { needed: usize, actual: usize },

    /// Destination row stride cannot hold one row of RGB half-floats
    #[error("Output stride {stride} bytes is smaller than a row ({row_bytes} bytes)")]
    StrideTooSmall { stride: usize, row_bytes: usize },

    /// Destination stride is not a whole number of half-float components
    #[error("Output stride {0} bytes is not a multiple of 2")]
    OddStride(usize),

    /// Destination buffer cannot hold every row at the given stride
    #[error("Output buffer too small: need {needed} bytes, got {actual}")]
    BufferTooSmall { needed: usize, actual: usize },

    /// Destination buffer is not aligned for 16-bit components
    #[error("Output buffer is not 2-byte aligned")]
    Misaligned,

    /// Conversion worker pool could not be created
    #[error("Failed to build conversion worker pool: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),

    /// Requested half-float backend is not available on this CPU
    #[error("Half-float backend unavailable: {0}")]
    BackendUnavailable(String),
}

/// Result type for conversion operations
pub type Result<T> = std::result::Result<T, ConversionError>;

impl ConversionError {
    /// Create an invalid geometry error
    pub(crate) fn invalid_geometry(msg: impl Into<String>) -> Self {
        Self::InvalidGeometry(msg.into())
    }
}
