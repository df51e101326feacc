//! # hdmisupply-capture
//!
//! Capture side of the hdmisupply pipeline: a latest-frame v210 buffer fed
//! by a device notification thread, and the coordination that lets several
//! plugin instances in one process share a single capture device.
//!
//! # Architecture
//!
//! ```text
//!  device thread                         host process call (any instance)
//!  ─────────────                         ────────────────────────────────
//!  on_frame_arrived(frame)               InstanceCoordinator::ensure_streaming()
//!         │                                        │
//!         ▼                                        ▼
//!  CaptureBuffer::write_frame ──────────► ControlHandle::buffer()
//!  (Relaxed atomic stores,                (Relaxed atomic loads,
//!   then generation += 1)                  torn frames possible)
//! ```
//!
//! Shared state lives in two named POSIX shared-memory segments per lineage:
//!
//! | Segment | Contents |
//! |---------|----------|
//! | `/<prefix>-<lineage>` | [`ControlBlock`]: state, owner token, generation, frame segment name |
//! | `/<prefix>-<lineage>-frame-<token>` | one packed v210 frame as atomic words |
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use hdmisupply_capture::{CoordinatorConfig, InstanceCoordinator, SyntheticProvider};
//!
//! let provider = Arc::new(SyntheticProvider::pattern(502, 512, 512));
//! let mut coordinator = InstanceCoordinator::new(CoordinatorConfig::default(), provider)?;
//!
//! let handle = coordinator.ensure_streaming()?;
//! println!("{:?} at generation {}", handle.role(), handle.generation());
//!
//! coordinator.release()?;
//! # Ok::<(), hdmisupply_capture::CaptureError>(())
//! ```

// =============================================================================
// CORE MODULES
// =============================================================================

pub mod buffer;
pub mod control;
pub mod coordinator;
pub mod device;
pub mod error;
pub mod mode;
pub mod shm;
pub mod synthetic;

// =============================================================================
// RE-EXPORTS - PRIMARY API
// =============================================================================

// Error types
pub use error::{CaptureError, Result};

// Capture buffer and device seam
pub use buffer::{CaptureBuffer, CopyRejected};
pub use device::{CaptureDevice, DeviceProvider, FrameHandler};
pub use mode::DisplayMode;

// Coordination
pub use control::{ControlBlock, StreamState};
pub use coordinator::{ControlHandle, CoordinatorConfig, InstanceCoordinator, Role};
pub use shm::{Access, ProcessLifetime};

// Test and demo device
pub use synthetic::{Feed, InjectedFailure, SyntheticDevice, SyntheticProvider};

// =============================================================================
// CRATE-LEVEL ITEMS
// =============================================================================

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
