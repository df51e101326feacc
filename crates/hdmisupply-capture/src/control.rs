//! Published control descriptor
//!
//! The control segment holds one [`ControlBlock`]: the stream state, the
//! owner's token, a generation counter, and enough of a description of the
//! frame segment for another process to find and validate it. It never
//! holds pointers; every process maps the frame segment itself.
//!
//! Publishing order: the creator fills every field, then stores [`MAGIC`]
//! with `Release`. Readers load the magic with `Acquire` before trusting
//! anything else.

use std::sync::atomic::{AtomicU32, AtomicU64, AtomicU8, Ordering};

use hdmisupply_convert::FrameGeometry;

use crate::error::{CaptureError, Result};
use crate::shm::SharedView;

/// "HDMS" as a little-endian word
pub const MAGIC: u32 = u32::from_le_bytes(*b"HDMS");

/// Layout version; bumped whenever `ControlBlock` changes
pub const VERSION: u32 = 1;

/// Longest frame segment name the descriptor can carry
pub const MAX_SEGMENT_NAME: usize = 63;

/// Lifecycle of the published stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum StreamState {
    /// Owner is still acquiring the device
    Starting = 0,
    /// Frames are arriving
    Streaming = 1,
    /// Owner released the device or failed to acquire it
    Stopped = 2,
    /// A former joiner has claimed the stopped stream and is taking over
    Migrating = 3,
}

impl StreamState {
    fn from_raw(raw: u32) -> Self {
        match raw {
            1 => Self::Streaming,
            2 => Self::Stopped,
            3 => Self::Migrating,
            _ => Self::Starting,
        }
    }
}

/// Shared descriptor, laid out identically in every process
#[derive(Debug)]
#[repr(C)]
pub struct ControlBlock {
    magic: AtomicU32,
    version: AtomicU32,
    width: AtomicU32,
    height: AtomicU32,
    row_bytes: AtomicU32,
    state: AtomicU32,
    owner_token: AtomicU64,
    generation: AtomicU64,
    frame_segment_len: AtomicU32,
    frame_segment: [AtomicU8; MAX_SEGMENT_NAME + 1],
}

// SAFETY: repr(C) aggregate of atomics only; all-zero and arbitrary bits are valid.
unsafe impl SharedView for ControlBlock {}

impl ControlBlock {
    /// Fill a freshly created block and publish it
    pub fn publish(&self, geometry: FrameGeometry, owner_token: u64, frame_segment: &str) -> Result<()> {
        self.version.store(VERSION, Ordering::Relaxed);
        self.width.store(geometry.width(), Ordering::Relaxed);
        self.height.store(geometry.height(), Ordering::Relaxed);
        self.row_bytes.store(geometry.row_bytes() as u32, Ordering::Relaxed);
        self.state.store(StreamState::Starting as u32, Ordering::Relaxed);
        self.owner_token.store(owner_token, Ordering::Relaxed);
        self.generation.store(0, Ordering::Relaxed);
        self.set_frame_segment(frame_segment)?;
        self.magic.store(MAGIC, Ordering::Release);
        Ok(())
    }

    /// Whether the creator has finished publishing
    pub fn is_published(&self) -> bool {
        self.magic.load(Ordering::Acquire) == MAGIC
    }

    /// Check the published layout and geometry against ours
    pub fn validate(&self, geometry: FrameGeometry) -> Result<()> {
        if !self.is_published() {
            return Err(CaptureError::invalid_descriptor("magic not set"));
        }
        let version = self.version.load(Ordering::Relaxed);
        if version != VERSION {
            return Err(CaptureError::invalid_descriptor(format!(
                "layout version {version}, expected {VERSION}"
            )));
        }

        let width = self.width.load(Ordering::Relaxed);
        let height = self.height.load(Ordering::Relaxed);
        let row_bytes = self.row_bytes.load(Ordering::Relaxed) as usize;
        if width != geometry.width() || height != geometry.height() || row_bytes != geometry.row_bytes() {
            return Err(CaptureError::invalid_descriptor(format!(
                "published {width}x{height} ({row_bytes} bytes/row), expected {geometry} ({} bytes/row)",
                geometry.row_bytes()
            )));
        }
        Ok(())
    }

    pub fn state(&self) -> StreamState {
        StreamState::from_raw(self.state.load(Ordering::Acquire))
    }

    pub fn set_state(&self, state: StreamState) {
        self.state.store(state as u32, Ordering::Release);
    }

    /// Claim a stopped stream for migration
    ///
    /// Exactly one caller wins when several notice the same stopped stream.
    pub fn claim_migration(&self) -> bool {
        self.state
            .compare_exchange(
                StreamState::Stopped as u32,
                StreamState::Migrating as u32,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// Claim a stream whose owner never finished starting
    ///
    /// Same single-winner guarantee as [`claim_migration`](Self::claim_migration).
    pub fn claim_stalled_start(&self) -> bool {
        self.state
            .compare_exchange(
                StreamState::Starting as u32,
                StreamState::Migrating as u32,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    pub fn owner_token(&self) -> u64 {
        self.owner_token.load(Ordering::Acquire)
    }

    /// Number of complete frames written so far
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Record one complete frame copy
    pub fn bump_generation(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::Release) + 1
    }

    /// Name of the frame segment this block describes
    pub fn frame_segment(&self) -> Result<String> {
        let len = self.frame_segment_len.load(Ordering::Relaxed) as usize;
        if len == 0 || len > MAX_SEGMENT_NAME {
            return Err(CaptureError::invalid_descriptor(format!(
                "frame segment name length {len}"
            )));
        }
        let bytes: Vec<u8> = self.frame_segment[..len]
            .iter()
            .map(|b| b.load(Ordering::Relaxed))
            .collect();
        String::from_utf8(bytes)
            .map_err(|_| CaptureError::invalid_descriptor("frame segment name is not UTF-8"))
    }

    fn set_frame_segment(&self, name: &str) -> Result<()> {
        if name.is_empty() || name.len() > MAX_SEGMENT_NAME {
            return Err(CaptureError::unsupported(format!(
                "segment name {name:?} must be 1 to {MAX_SEGMENT_NAME} bytes"
            )));
        }
        for (slot, byte) in self.frame_segment.iter().zip(name.bytes()) {
            slot.store(byte, Ordering::Relaxed);
        }
        self.frame_segment_len.store(name.len() as u32, Ordering::Relaxed);
        Ok(())
    }
}
