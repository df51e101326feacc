//! # hdmisupply
//!
//! Live HDMI/SDI input for compositing hosts: v210 capture shared between
//! plugin instances, converted to RGB half-float on every host frame.
//!
//! This crate provides a unified interface to the hdmisupply libraries:
//!
//! - **[`convert`]** - v210 unpacking, Rec.709 matrixing and multithreaded RGB half-float conversion
//! - **[`capture`]** - latest-frame capture buffer and cross-instance device sharing over POSIX shared memory
//! - **[`host`]** - the plugin session a host drives: initialize, process, uninitialize
//!
//! # Features
//!
//! All features are enabled by default. You can selectively enable only what you need:
//!
//! ```toml
//! # Use everything (default)
//! hdmisupply = "0.1"
//!
//! # Conversion kernel only
//! hdmisupply = { version = "0.1", default-features = false, features = ["convert"] }
//!
//! # Capture coordination without the host session
//! hdmisupply = { version = "0.1", default-features = false, features = ["capture"] }
//! ```
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `convert` | Yes | v210 to RGB half-float conversion |
//! | `capture` | Yes | Capture buffer and instance coordination |
//! | `host` | Yes | Host plugin session |
//! | `full` | No | All features from all sub-crates |
//!
//! # Quick Start
//!
//! ## Converting a Frame
//!
//! ```rust,ignore
//! use hdmisupply::convert::{
//!     solid_frame, words_from_bytes, ConversionKernel, FrameGeometry, HalfBackend, LumaRange,
//!     OutputBuffer, RayonDistributor,
//! };
//!
//! let geometry = FrameGeometry::HD1080;
//! let packed = words_from_bytes(&solid_frame(geometry, 502, 512, 512));
//! let mut rgb = vec![0u16; geometry.output_row_components() * 1080];
//!
//! ConversionKernel::new(geometry, HalfBackend::detect()).convert(
//!     &packed,
//!     OutputBuffer::new(&mut rgb, geometry.output_row_bytes())?,
//!     LumaRange::Limited,
//!     &RayonDistributor::new(8)?,
//! )?;
//! ```
//!
//! ## Full Pipeline: Device → Shared Buffer → Host Slot
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use hdmisupply::prelude::*;
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
//! session.process(&host, &mut slots)?;
//! session.shutdown()?;
//! ```
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                          hdmisupply                             │
//! ├──────────────────────┬─────────────────────┬────────────────────┤
//! │  hdmisupply-capture  │ hdmisupply-convert  │  hdmisupply-host   │
//! │                      │                     │                    │
//! │  InstanceCoordinator │  ConversionKernel   │  SupplySession     │
//! │  CaptureBuffer       │  ColorConverter     │  SupplyConfig      │
//! │  ControlBlock        │  HalfBackend        │  HeadroomToggle    │
//! └──────────┬───────────┴──────────┬──────────┴─────────┬──────────┘
//!            │                      │                    │
//!            ▼                      ▼                    ▼
//!   POSIX shared memory       rayon worker pool    host output slots
//! ```
//!
//! # Platform Support
//!
//! - **Linux and other POSIX systems** - coordination uses `shm_open`/`mmap`
//! - **x86_64 F16C** - used for half-float encoding when the CPU has it,
//!   with a bit-identical software fallback everywhere else
//!
//! # Related Crates
//!
//! You can also use the individual crates directly:
//!
//! - [`hdmisupply-convert`](https://crates.io/crates/hdmisupply-convert) - Conversion only
//! - [`hdmisupply-capture`](https://crates.io/crates/hdmisupply-capture) - Capture coordination only
//! - [`hdmisupply-host`](https://crates.io/crates/hdmisupply-host) - Host session

#![cfg_attr(docsrs, feature(doc_cfg))]

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// =============================================================================
// RE-EXPORTS
// =============================================================================

/// v210 to RGB half-float conversion.
///
/// This module provides:
/// - v210 geometry, unpacking and packing helpers
/// - Limited/full range Rec.709 matrixing
/// - F16C and software half-float backends
/// - Row-sliced work distribution over a fixed worker pool
///
/// See [`hdmisupply_convert`] documentation for details.
#[cfg(feature = "convert")]
#[cfg_attr(docsrs, doc(cfg(feature = "convert")))]
pub use hdmisupply_convert as convert;

/// Capture buffer and cross-instance coordination.
///
/// This module provides:
/// - The capture device seam and a synthetic test-pattern device
/// - A latest-frame buffer with a generation counter
/// - Single-owner device sharing through named shared memory
///
/// See [`hdmisupply_capture`] documentation for details.
#[cfg(feature = "capture")]
#[cfg_attr(docsrs, doc(cfg(feature = "capture")))]
pub use hdmisupply_capture as capture;

/// Host plugin session.
///
/// See [`hdmisupply_host`] documentation for details.
#[cfg(feature = "host")]
#[cfg_attr(docsrs, doc(cfg(feature = "host")))]
pub use hdmisupply_host as host;

// =============================================================================
// PRELUDE - Common types for convenience
// =============================================================================

/// Prelude module with commonly used types.
///
/// ```rust
/// use hdmisupply::prelude::*;
/// ```
pub mod prelude {
    #[cfg(feature = "convert")]
    pub use hdmisupply_convert::{
        ConversionError, ConversionKernel, FrameGeometry, HalfBackend, HalfPreference, LumaRange,
        OutputBuffer, RayonDistributor,
    };

    #[cfg(feature = "capture")]
    pub use hdmisupply_capture::{
        CaptureError, CoordinatorConfig, DisplayMode, InstanceCoordinator, Role, SyntheticProvider,
    };

    #[cfg(feature = "host")]
    pub use hdmisupply_host::{
        HostInfo, HostNotifier, LogNotifier, MemorySlots, ProcessOutcome, SupplyConfig,
        SupplyError, SupplySession,
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    #[cfg(feature = "convert")]
    fn test_convert_reexport() {
        assert_eq!(convert::FrameGeometry::HD1080.row_bytes(), 5120);
    }

    #[test]
    #[cfg(feature = "capture")]
    fn test_capture_reexport() {
        assert_eq!(capture::DisplayMode::from_frame_rate(25.0), capture::DisplayMode::Hd1080i50);
    }

    #[test]
    #[cfg(feature = "host")]
    fn test_host_reexport() {
        let _ = host::SupplyConfig::default();
    }
}
