//! v210 packed 10-bit 4:2:2 YCbCr layout
//!
//! v210 stores six pixels in four little-endian 32-bit words. Each word
//! carries three 10-bit samples in bits 0-9, 10-19 and 20-29:
//!
//! ```text
//! word 0:  Cb0  Y0  Cr0
//! word 1:  Y1   Cb2 Y2
//! word 2:  Cr2  Y3  Cb4
//! word 3:  Y4   Cr4 Y5
//! ```
//!
//! Chroma is sampled at even pixels only. The odd pixels get chroma
//! interpolated from their neighbours, the last of which lives in the
//! first word of the following chunk. Rows are padded to a multiple of
//! 128 bytes (48 pixels).

use std::sync::atomic::{AtomicU32, Ordering};

use crate::error::{ConversionError, Result};

/// Pixels per packed chunk
pub const CHUNK_PIXELS: usize = 6;

/// 32-bit words per packed chunk
pub const CHUNK_WORDS: usize = 4;

/// Bytes per packed chunk
pub const CHUNK_BYTES: usize = CHUNK_WORDS * 4;

const SAMPLE_MASK: u32 = 0x3ff;

/// Dimensions of a v210 frame and the derived buffer sizes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameGeometry {
    width: u32,
    height: u32,
}

impl FrameGeometry {
    /// The single frame size the capture pipeline runs at
    pub const HD1080: Self = Self {
        width: 1920,
        height: 1080,
    };

    /// Create a geometry, checking that the width packs into whole chunks
    pub fn new(width: u32, height: u32) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(ConversionError::invalid_geometry(format!(
                "{width}x{height} has a zero dimension"
            )));
        }
        if width as usize % CHUNK_PIXELS != 0 {
            return Err(ConversionError::invalid_geometry(format!(
                "width {width} is not a multiple of {CHUNK_PIXELS}"
            )));
        }
        Ok(Self { width, height })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Total pixel count
    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Packed chunks per row
    pub fn chunks_per_row(&self) -> usize {
        self.width as usize / CHUNK_PIXELS
    }

    /// Bytes per packed row, including padding to 128 bytes
    pub fn row_bytes(&self) -> usize {
        (self.width as usize + 47) / 48 * 128
    }

    /// 32-bit words per packed row
    pub fn row_words(&self) -> usize {
        self.row_bytes() / 4
    }

    /// Bytes in one packed frame
    pub fn frame_bytes(&self) -> usize {
        self.row_bytes() * self.height as usize
    }

    /// 32-bit words in one packed frame
    pub fn frame_words(&self) -> usize {
        self.row_words() * self.height as usize
    }

    /// Half-float components in one output row (3 per pixel)
    pub fn output_row_components(&self) -> usize {
        self.width as usize * 3
    }

    /// Minimum byte stride of one output row
    pub fn output_row_bytes(&self) -> usize {
        self.output_row_components() * 2
    }
}

impl std::fmt::Display for FrameGeometry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Read access to packed frame words
///
/// Implemented for plain word slices and for the atomic words of a live
/// capture buffer. Reads from a live buffer may interleave with a
/// concurrent capture write; callers get whatever each word held at the
/// moment it was loaded.
pub trait WordSource: Sync {
    /// Number of 32-bit words available
    fn word_len(&self) -> usize;

    /// Copy `out.len()` words starting at `start` into `out`
    fn read_words(&self, start: usize, out: &mut [u32]);
}

impl WordSource for [u32] {
    fn word_len(&self) -> usize {
        self.len()
    }

    fn read_words(&self, start: usize, out: &mut [u32]) {
        out.copy_from_slice(&self[start..start + out.len()]);
    }
}

impl WordSource for [AtomicU32] {
    fn word_len(&self) -> usize {
        self.len()
    }

    fn read_words(&self, start: usize, out: &mut [u32]) {
        let len = out.len();
        for (dst, word) in out.iter_mut().zip(&self[start..start + len]) {
            *dst = word.load(Ordering::Relaxed);
        }
    }
}

impl WordSource for Vec<u32> {
    fn word_len(&self) -> usize {
        self.len()
    }

    fn read_words(&self, start: usize, out: &mut [u32]) {
        self.as_slice().read_words(start, out);
    }
}

/// Reinterpret little-endian packed bytes as words
///
/// Trailing bytes that do not fill a whole word are ignored.
pub fn words_from_bytes(bytes: &[u8]) -> Vec<u32> {
    bytes
        .chunks_exact(4)
        .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}

/// One pixel's code values: 10-bit luma plus (possibly interpolated) chroma
///
/// Values are raw code values, not de-biased. Interpolated chroma may
/// carry a half step.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct YCbCr {
    pub y: f32,
    pub cb: f32,
    pub cr: f32,
}

#[inline]
fn sample(word: u32, shift: u32) -> f32 {
    ((word >> shift) & SAMPLE_MASK) as f32
}

/// Unpack one chunk into six pixels with re-interpolated chroma
///
/// `next` is the first word of the following chunk in the same row, which
/// carries the chroma pair after this chunk's last one. At the end of a row
/// pass `None`: the last known chroma is reused instead of reading past the
/// row.
#[inline]
pub fn unpack_chunk(chunk: &[u32; CHUNK_WORDS], next: Option<u32>) -> [YCbCr; CHUNK_PIXELS] {
    let [w0, w1, w2, w3] = *chunk;

    let y = [
        sample(w0, 10),
        sample(w1, 0),
        sample(w1, 20),
        sample(w2, 10),
        sample(w3, 0),
        sample(w3, 20),
    ];
    let cb0 = sample(w0, 0);
    let cb2 = sample(w1, 10);
    let cb4 = sample(w2, 20);
    let cr0 = sample(w0, 20);
    let cr2 = sample(w2, 0);
    let cr4 = sample(w3, 10);

    let (cb6, cr6) = match next {
        Some(word) => (sample(word, 0), sample(word, 20)),
        None => (cb4, cr4),
    };

    let cb = [
        cb0,
        (cb0 + cb2) * 0.5,
        cb2,
        (cb2 + cb4) * 0.5,
        cb4,
        (cb4 + cb6) * 0.5,
    ];
    let cr = [
        cr0,
        (cr0 + cr2) * 0.5,
        cr2,
        (cr2 + cr4) * 0.5,
        cr4,
        (cr4 + cr6) * 0.5,
    ];

    std::array::from_fn(|i| YCbCr {
        y: y[i],
        cb: cb[i],
        cr: cr[i],
    })
}

/// Pack six luma and three chroma pairs into one chunk
///
/// Samples are masked to 10 bits.
pub fn pack_chunk(y: [u16; CHUNK_PIXELS], cb: [u16; 3], cr: [u16; 3]) -> [u32; CHUNK_WORDS] {
    let s = |v: u16| u32::from(v) & SAMPLE_MASK;
    [
        s(cb[0]) | s(y[0]) << 10 | s(cr[0]) << 20,
        s(y[1]) | s(cb[1]) << 10 | s(y[2]) << 20,
        s(cr[1]) | s(y[3]) << 10 | s(cb[2]) << 20,
        s(y[4]) | s(cr[2]) << 10 | s(y[5]) << 20,
    ]
}

/// Build a packed frame where every pixel has the same code values
///
/// Row padding is zero-filled.
pub fn solid_frame(geometry: FrameGeometry, y: u16, cb: u16, cr: u16) -> Vec<u8> {
    let chunk = pack_chunk([y; CHUNK_PIXELS], [cb; 3], [cr; 3]);
    let mut row = Vec::with_capacity(geometry.row_bytes());
    for _ in 0..geometry.chunks_per_row() {
        for word in chunk {
            row.extend_from_slice(&word.to_le_bytes());
        }
    }
    row.resize(geometry.row_bytes(), 0);

    row.repeat(geometry.height() as usize)
}
