//! Error types for the host-facing session
//!
//! Errors fall into the classes the host cares about:
//!
//! | Class | Variants | Host sees |
//! |-------|----------|-----------|
//! | Unsupported configuration | `UnsupportedResolution`, `UnsupportedPixelFormat`, `InvalidConfig` | error message, no frames |
//! | Device acquisition | `Capture` (device failures) | error message, retried next call |
//! | Transient | `BufferUnavailable`, contended ownership | nothing, call skipped |

use hdmisupply_capture::CaptureError;
use hdmisupply_convert::ConversionError;
use thiserror::Error;

/// Errors surfaced by [`crate::SupplySession`]
#[derive(Error, Debug)]
pub enum SupplyError {
    /// Host project is not the one supported frame size
    #[error("Resolution is {width}x{height}, only 1920x1080 can be processed")]
    UnsupportedResolution { width: u32, height: u32 },

    /// Host asked for an output format other than RGB half-float
    #[error("Unsupported output pixel format: {0}")]
    UnsupportedPixelFormat(String),

    /// Output slot was not allocated or could not be locked
    #[error("Output buffer unavailable: {0}")]
    BufferUnavailable(String),

    /// Configuration failed validation
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Capture stream could not be acquired or joined
    #[error(transparent)]
    Capture(#[from] CaptureError),

    /// Frame conversion failed
    #[error(transparent)]
    Conversion(#[from] ConversionError),
}

/// Result type for session operations
pub type Result<T> = std::result::Result<T, SupplyError>;

impl SupplyError {
    pub(crate) fn buffer_unavailable(msg: impl Into<String>) -> Self {
        Self::BufferUnavailable(msg.into())
    }

    pub(crate) fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Whether the call should be skipped quietly and retried next frame
    pub fn is_transient(&self) -> bool {
        match self {
            Self::BufferUnavailable(_) => true,
            Self::Capture(e) => e.is_transient(),
            _ => false,
        }
    }

    /// Whether this is an unsupported-configuration error
    ///
    /// These never clear up on their own.
    pub fn is_unsupported(&self) -> bool {
        matches!(
            self,
            Self::UnsupportedResolution { .. } | Self::UnsupportedPixelFormat(_) | Self::InvalidConfig(_)
        )
    }
}
