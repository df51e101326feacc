//! # hdmisupply-convert
//!
//! Multithreaded conversion of packed v210 (10-bit 4:2:2 YCbCr) frames into
//! interleaved RGB half-float images.
//!
//! This crate is part of the [hdmisupply](https://github.com/lewissaunders/hdmisupply)
//! workspace. It has no knowledge of capture devices or hosts: it takes a
//! source of packed words and a destination buffer and fills the buffer.
//!
//! # Features
//!
//! - **v210 unpacking**: 6-pixel chunks with chroma re-interpolation and a
//!   row-end clamp that never reads past the row
//! - **Rec.709 matrixing**: limited (64 / 1.164) or full (0 / 1.0) luma range
//! - **Two half-float backends**: F16C hardware conversion and a portable
//!   software path, bit-identical for the same input
//! - **Row-sliced workers**: contiguous row blocks per worker, derived from
//!   a fork/join offset, with a full join before returning
//!
//! # Quick Start
//!
//! ```rust
//! use hdmisupply_convert::{
//!     solid_frame, words_from_bytes, ConversionKernel, FrameGeometry, HalfBackend,
//!     LumaRange, OutputBuffer, SerialDistributor,
//! };
//!
//! let geometry = FrameGeometry::new(48, 4)?;
//! let packed = words_from_bytes(&solid_frame(geometry, 502, 512, 512));
//!
//! let mut rgb = vec![0u16; geometry.output_row_components() * 4];
//! let dest = OutputBuffer::new(&mut rgb, geometry.output_row_bytes())?;
//!
//! let kernel = ConversionKernel::new(geometry, HalfBackend::detect());
//! kernel.convert(&packed, dest, LumaRange::Limited, &SerialDistributor::new(2))?;
//! # Ok::<(), hdmisupply_convert::ConversionError>(())
//! ```
//!
//! # Data Flow
//!
//! ```text
//! packed row H-1-r ──► unpack_chunk ──► ycbcr_to_rgb ──► HalfEncoder ──► output row r
//!                      (6 px, 4 words)   (Rec.709)        (F16C / soft)
//! ```
//!
//! # Output Layout
//!
//! Each output pixel is three half-float components (R, G, B) stored as
//! `u16` bit patterns. Rows are `width * 6` bytes long and laid out at the
//! caller's byte stride; bytes past the row end are left untouched.

// =============================================================================
// CORE MODULES
// =============================================================================

pub mod color;
pub mod distribute;
pub mod encode;
pub mod error;
pub mod kernel;
pub mod v210;

// =============================================================================
// RE-EXPORTS - PRIMARY API
// =============================================================================

// Error types
pub use error::{ConversionError, Result};

// Packed format
pub use v210::{
    pack_chunk, solid_frame, unpack_chunk, words_from_bytes, FrameGeometry, WordSource, YCbCr,
    CHUNK_BYTES, CHUNK_PIXELS, CHUNK_WORDS,
};

// Colour
pub use color::{ycbcr_to_rgb, ColorConverter, LumaRange};

// Half-float backends
pub use encode::{cpu_supports_f16c, F16cHalf, HalfBackend, HalfEncoder, HalfPreference, SoftwareHalf};

// Work distribution
pub use distribute::{
    row_range, share_for, worker_index, RayonDistributor, SerialDistributor, WorkDistributor,
    WorkShare,
};

// Kernel
pub use kernel::{convert_row, ConversionJob, ConversionKernel, OutputBuffer};

// =============================================================================
// CRATE-LEVEL ITEMS
// =============================================================================

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Bytes needed for a tightly packed RGB half-float frame
#[must_use]
pub fn output_frame_bytes(geometry: FrameGeometry) -> usize {
    geometry.output_row_bytes() * geometry.height() as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_frame_bytes() {
        assert_eq!(output_frame_bytes(FrameGeometry::HD1080), 1920 * 1080 * 6);
    }

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
