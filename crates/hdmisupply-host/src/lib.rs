//! # hdmisupply-host
//!
//! Host-facing surface of hdmisupply: the plugin a compositing host loads to
//! get live HDMI input as an RGB half-float image.
//!
//! Each loaded instance is one [`SupplySession`]. The session answers the
//! capability query, starts or joins the shared capture stream, converts the
//! latest frame into the host's output slot on every process call, and
//! reports errors and frame-rate telemetry back through a [`HostNotifier`].
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use hdmisupply_capture::SyntheticProvider;
//! use hdmisupply_host::{HostInfo, LogNotifier, MemorySlots, SupplyConfig, SupplySession};
//!
//! let host = HostInfo::hd1080(25.0, 8);
//! let provider = Arc::new(SyntheticProvider::pattern(502, 512, 512));
//! let mut session = SupplySession::initialize(
//!     SupplyConfig::from_env(),
//!     &host,
//!     provider,
//!     Arc::new(LogNotifier),
//! )?;
//!
//! let mut slots = MemorySlots::new(2, 1920, 1080);
//! let outcome = session.process(&host, &mut slots)?;
//! println!("{outcome:?}");
//!
//! session.shutdown()?;
//! # Ok::<(), hdmisupply_host::SupplyError>(())
//! ```
//!
//! # Entry Points
//!
//! | Host call | Here |
//! |-----------|------|
//! | capability query | [`supported_output_formats`], [`INPUT_CLIP_COUNT`] |
//! | initialize | [`SupplySession::initialize`] |
//! | process | [`SupplySession::process`] |
//! | uninitialize | [`SupplySession::uninitialize`] (no-op) |
//! | "YUV headroom" changed | [`SupplySession::set_headroom`] |

// =============================================================================
// CORE MODULES
// =============================================================================

pub mod config;
pub mod error;
pub mod format;
pub mod headroom;
pub mod host;
pub mod logging;
pub mod session;
pub mod telemetry;

// =============================================================================
// RE-EXPORTS - PRIMARY API
// =============================================================================

// Error types
pub use error::{Result, SupplyError};

// Configuration
pub use config::{SupplyConfig, SupplyConfigBuilder};

// Capability query
pub use format::{
    is_output_format_supported, supported_output_formats, HostPixelFormat, INPUT_CLIP_COUNT,
    OUTPUT_SLOT, SUPPORTED_OUTPUT_FORMAT,
};

// Host boundary
pub use host::{
    HostInfo, HostNotifier, LogNotifier, MemorySlots, OutputSlots, RecordingNotifier, SlotBuffer,
    SlotUnavailable,
};

// Session
pub use headroom::{HeadroomToggle, HEADROOM_LABEL};
pub use session::{FrameReport, ProcessOutcome, SkipReason, SupplySession};
pub use telemetry::{fps_message, CallTiming, FrameTimer};

// Logging
pub use logging::{debug_requested, init_logging, DEBUG_ENV};

// =============================================================================
// CRATE-LEVEL ITEMS
// =============================================================================

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
