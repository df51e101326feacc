//! Latest-frame capture buffer
//!
//! One frame-sized region of atomic words, overwritten in place by the
//! device notification thread and read concurrently by conversion workers.
//! There is no lock and no queue. Newest frame wins, and a reader may see
//! part of one frame and part of the next. Every word access is a `Relaxed`
//! atomic, so a torn frame is a visual artefact, never undefined behaviour.
//!
//! Readers that care can compare [`CaptureBuffer::generation`] before and
//! after reading; the writer bumps it after each complete copy.

use std::sync::atomic::{AtomicU32, Ordering};

use hdmisupply_convert::{FrameGeometry, WordSource};
use tracing::warn;

use crate::control::ControlBlock;
use crate::device::FrameHandler;

/// Shared view of the most recent captured frame
#[derive(Debug, Clone, Copy)]
pub struct CaptureBuffer {
    words: &'static [AtomicU32],
    geometry: FrameGeometry,
    control: &'static ControlBlock,
    writable: bool,
}

/// Why a frame was not copied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyRejected {
    /// Payload length differs from the buffer
    SizeMismatch { expected: usize, actual: usize },
    /// This process mapped the buffer read-only
    ReadOnly,
}

impl std::fmt::Display for CopyRejected {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SizeMismatch { expected, actual } => {
                write!(f, "frame is {actual} bytes, buffer holds {expected}")
            }
            Self::ReadOnly => f.write_str("buffer is mapped read-only in this process"),
        }
    }
}

impl CaptureBuffer {
    pub(crate) fn new(
        words: &'static [AtomicU32],
        geometry: FrameGeometry,
        control: &'static ControlBlock,
        writable: bool,
    ) -> Self {
        Self {
            words,
            geometry,
            control,
            writable,
        }
    }

    pub fn geometry(&self) -> FrameGeometry {
        self.geometry
    }

    /// Size of one packed frame in bytes
    pub fn len_bytes(&self) -> usize {
        self.geometry.frame_bytes()
    }

    /// Complete frames copied in so far
    pub fn generation(&self) -> u64 {
        self.control.generation()
    }

    /// Whether this process may write frames
    pub fn is_writable(&self) -> bool {
        self.writable
    }

    /// Replace the whole buffer with `frame` and bump the generation
    pub fn write_frame(&self, frame: &[u8]) -> Result<u64, CopyRejected> {
        if !self.writable {
            return Err(CopyRejected::ReadOnly);
        }
        let expected = self.len_bytes();
        if frame.len() != expected {
            return Err(CopyRejected::SizeMismatch {
                expected,
                actual: frame.len(),
            });
        }

        for (word, bytes) in self.words.iter().zip(frame.chunks_exact(4)) {
            word.store(
                u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
                Ordering::Relaxed,
            );
        }
        Ok(self.control.bump_generation())
    }

    /// Copy the current contents out as little-endian bytes
    pub fn snapshot(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.len_bytes());
        for word in &self.words[..self.geometry.frame_words()] {
            bytes.extend_from_slice(&word.load(Ordering::Relaxed).to_le_bytes());
        }
        bytes
    }
}

impl FrameHandler for CaptureBuffer {
    fn on_frame_arrived(&self, frame: &[u8]) {
        if let Err(reason) = self.write_frame(frame) {
            warn!("Dropped captured frame: {}", reason);
        }
    }
}

impl WordSource for CaptureBuffer {
    fn word_len(&self) -> usize {
        self.geometry.frame_words().min(self.words.len())
    }

    fn read_words(&self, start: usize, out: &mut [u32]) {
        self.words.read_words(start, out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::StreamState;
    use crate::shm::{self, Access};
    use hdmisupply_convert::{solid_frame, words_from_bytes};
    use std::sync::atomic::AtomicUsize;

    fn segment_pair(geometry: FrameGeometry) -> (CaptureBuffer, CaptureBuffer) {
        static NEXT: AtomicUsize = AtomicUsize::new(0);
        let n = NEXT.fetch_add(1, Ordering::Relaxed);
        let control_name = format!("/hdmisupply-buftest-{}-{}", std::process::id(), n);
        let frame_name = format!("{control_name}-frame");

        let control: &'static ControlBlock = shm::create_exclusive(&control_name, 4096)
            .expect("create control")
            .expect("new control")
            .into_ref()
            .expect("control view");
        control.publish(geometry, 1, &frame_name).expect("publish");
        control.set_state(StreamState::Streaming);

        let writer_words = shm::create_exclusive(&frame_name, geometry.frame_bytes())
            .expect("create frame")
            .expect("new frame")
            .into_slice();
        let reader_words = shm::open_existing(&frame_name, geometry.frame_bytes(), Access::ReadOnly)
            .expect("open frame")
            .expect("frame exists")
            .into_slice();

        shm::unlink(&frame_name).expect("unlink frame");
        shm::unlink(&control_name).expect("unlink control");

        (
            CaptureBuffer::new(writer_words, geometry, control, true),
            CaptureBuffer::new(reader_words, geometry, control, false),
        )
    }

    #[test]
    fn test_write_visible_to_reader() {
        let geometry = FrameGeometry::new(12, 4).expect("geometry");
        let (writer, reader) = segment_pair(geometry);
        assert_eq!(reader.generation(), 0);

        let frame = solid_frame(geometry, 300, 400, 500);
        writer.on_frame_arrived(&frame);

        assert_eq!(reader.generation(), 1);
        assert_eq!(reader.snapshot(), frame);

        let mut words = vec![0u32; geometry.frame_words()];
        reader.read_words(0, &mut words);
        assert_eq!(words, words_from_bytes(&frame));
    }

    #[test]
    fn test_wrong_size_frame_is_absorbed() {
        let geometry = FrameGeometry::new(12, 4).expect("geometry");
        let (writer, reader) = segment_pair(geometry);

        writer.on_frame_arrived(&[0xff; 10]);
        assert_eq!(reader.generation(), 0);
        assert!(reader.snapshot().iter().all(|&b| b == 0));

        assert_eq!(
            writer.write_frame(&[0; 10]),
            Err(CopyRejected::SizeMismatch {
                expected: geometry.frame_bytes(),
                actual: 10
            })
        );
    }

    #[test]
    fn test_reader_cannot_write() {
        let geometry = FrameGeometry::new(6, 1).expect("geometry");
        let (_writer, reader) = segment_pair(geometry);
        let frame = solid_frame(geometry, 1, 2, 3);
        assert_eq!(reader.write_frame(&frame), Err(CopyRejected::ReadOnly));
        // The handler path logs instead of faulting on the read-only mapping
        reader.on_frame_arrived(&frame);
        assert_eq!(reader.generation(), 0);
    }
}
