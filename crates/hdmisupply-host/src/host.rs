//! The host side of the plugin boundary
//!
//! A compositing host hands each process call a set of output slots and
//! receives error and status messages back. These traits are that boundary;
//! [`MemorySlots`] and [`RecordingNotifier`] are in-process implementations
//! for tests and demos.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;
use tracing::{error, info};

use crate::format::{HostPixelFormat, SUPPORTED_OUTPUT_FORMAT};

/// What the host reports about the current project
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HostInfo {
    pub frame_width: u32,
    pub frame_height: u32,
    /// Project frame rate, mapped to a capture timing mode
    pub frame_rate: f64,
    /// Processor count, used as the conversion worker count
    pub processor_count: usize,
}

impl HostInfo {
    /// A 1920x1080 project
    pub fn hd1080(frame_rate: f64, processor_count: usize) -> Self {
        Self {
            frame_width: 1920,
            frame_height: 1080,
            frame_rate,
            processor_count,
        }
    }
}

/// A locked output slot
#[derive(Debug)]
pub struct SlotBuffer<'a> {
    /// Pixel data, `stride_bytes` per row
    pub data: &'a mut [u8],
    pub stride_bytes: usize,
    pub format: HostPixelFormat,
}

/// Why an output slot could not be used
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotUnavailable {
    /// The host has no slot at this index
    Missing,
    /// The slot exists but has no buffer behind it
    NotAllocated,
    /// The buffer could not be locked for writing
    NotLocked,
}

impl fmt::Display for SlotUnavailable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Missing => f.write_str("no such slot"),
            Self::NotAllocated => f.write_str("not allocated"),
            Self::NotLocked => f.write_str("not locked"),
        }
    }
}

/// Output slots offered for one process call
pub trait OutputSlots {
    /// Lock slot `index` for writing
    fn lock(&mut self, index: usize) -> Result<SlotBuffer<'_>, SlotUnavailable>;
}

/// Messages and requests sent back to the host
pub trait HostNotifier: Send + Sync {
    /// Show an error to the user
    fn error(&self, message: &str);

    /// Show a status line
    fn message(&self, message: &str);

    /// Ask the host to run the process call again for the current frame
    fn request_reprocess(&self);
}

/// Notifier that only logs
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl HostNotifier for LogNotifier {
    fn error(&self, message: &str) {
        error!("{}", message);
    }

    fn message(&self, message: &str) {
        info!("{}", message);
    }

    fn request_reprocess(&self) {
        info!("Reprocess requested");
    }
}

/// Notifier that keeps everything it is sent
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    errors: Mutex<Vec<String>>,
    messages: Mutex<Vec<String>>,
    reprocess: AtomicUsize,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn errors(&self) -> Vec<String> {
        self.errors.lock().clone()
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().clone()
    }

    /// Reprocess requests received
    pub fn reprocess_requests(&self) -> usize {
        self.reprocess.load(Ordering::SeqCst)
    }
}

impl HostNotifier for RecordingNotifier {
    fn error(&self, message: &str) {
        self.errors.lock().push(message.to_string());
    }

    fn message(&self, message: &str) {
        self.messages.lock().push(message.to_string());
    }

    fn request_reprocess(&self) {
        self.reprocess.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Debug)]
struct MemorySlot {
    // u16 backing keeps the bytes aligned for half-float components
    data: Vec<u16>,
    stride_bytes: usize,
    format: HostPixelFormat,
    allocated: bool,
    lockable: bool,
}

/// Heap-backed output slots
#[derive(Debug)]
pub struct MemorySlots {
    slots: Vec<MemorySlot>,
}

impl MemorySlots {
    /// `count` allocated slots of `width x height` RGB half-float pixels
    pub fn new(count: usize, width: u32, height: u32) -> Self {
        let stride_bytes = width as usize * SUPPORTED_OUTPUT_FORMAT.bytes_per_pixel();
        Self::with_stride(count, stride_bytes, height)
    }

    /// Slots with an explicit row stride in bytes, rounded up to even
    pub fn with_stride(count: usize, stride_bytes: usize, height: u32) -> Self {
        let stride_bytes = stride_bytes + stride_bytes % 2;
        let components = stride_bytes / 2 * height as usize;
        let slots = (0..count)
            .map(|_| MemorySlot {
                data: vec![0; components],
                stride_bytes,
                format: SUPPORTED_OUTPUT_FORMAT,
                allocated: true,
                lockable: true,
            })
            .collect();
        Self { slots }
    }

    pub fn set_allocated(&mut self, index: usize, allocated: bool) {
        if let Some(slot) = self.slots.get_mut(index) {
            slot.allocated = allocated;
        }
    }

    pub fn set_lockable(&mut self, index: usize, lockable: bool) {
        if let Some(slot) = self.slots.get_mut(index) {
            slot.lockable = lockable;
        }
    }

    pub fn set_format(&mut self, index: usize, format: HostPixelFormat) {
        if let Some(slot) = self.slots.get_mut(index) {
            slot.format = format;
        }
    }

    /// Half-float components of slot `index`
    pub fn components(&self, index: usize) -> &[u16] {
        self.slots
            .get(index)
            .map(|slot| slot.data.as_slice())
            .unwrap_or_default()
    }

    /// Row stride of slot `index` in bytes
    pub fn stride_bytes(&self, index: usize) -> usize {
        self.slots.get(index).map_or(0, |slot| slot.stride_bytes)
    }
}

impl OutputSlots for MemorySlots {
    fn lock(&mut self, index: usize) -> Result<SlotBuffer<'_>, SlotUnavailable> {
        let slot = self.slots.get_mut(index).ok_or(SlotUnavailable::Missing)?;
        if !slot.allocated {
            return Err(SlotUnavailable::NotAllocated);
        }
        if !slot.lockable {
            return Err(SlotUnavailable::NotLocked);
        }
        Ok(SlotBuffer {
            data: bytemuck::cast_slice_mut(slot.data.as_mut_slice()),
            stride_bytes: slot.stride_bytes,
            format: slot.format,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_slots_lock() {
        let mut slots = MemorySlots::new(2, 12, 3);
        {
            let slot = slots.lock(1).expect("lock");
            assert_eq!(slot.stride_bytes, 72);
            assert_eq!(slot.data.len(), 72 * 3);
            assert_eq!(slot.format, HostPixelFormat::Rgb48Half);
            slot.data[0] = 0xff;
        }
        assert_eq!(slots.components(1)[0], 0x00ff_u16.to_le());
        assert_eq!(slots.lock(2).err(), Some(SlotUnavailable::Missing));
    }

    #[test]
    fn test_memory_slots_unavailable() {
        let mut slots = MemorySlots::new(2, 6, 1);
        slots.set_allocated(1, false);
        assert_eq!(slots.lock(1).err(), Some(SlotUnavailable::NotAllocated));

        slots.set_allocated(1, true);
        slots.set_lockable(1, false);
        assert_eq!(slots.lock(1).err(), Some(SlotUnavailable::NotLocked));
        assert!(slots.lock(0).is_ok());
    }

    #[test]
    fn test_odd_stride_rounds_up() {
        let slots = MemorySlots::with_stride(1, 37, 2);
        assert_eq!(slots.stride_bytes(0), 38);
        assert_eq!(slots.components(0).len(), 38);
    }

    #[test]
    fn test_recording_notifier() {
        let notifier = RecordingNotifier::new();
        notifier.error("bad");
        notifier.message("averaging 24.00 fps");
        notifier.request_reprocess();
        notifier.request_reprocess();

        assert_eq!(notifier.errors(), vec!["bad".to_string()]);
        assert_eq!(notifier.messages().len(), 1);
        assert_eq!(notifier.reprocess_requests(), 2);
    }
}
