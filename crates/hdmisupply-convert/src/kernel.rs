//! Sliced v210 to RGB half-float conversion
//!
//! One call converts a whole frame. The destination rows are split into
//! one contiguous block per worker before the fork, so workers never share
//! a destination row and never write to the source.
//!
//! Output is flipped vertically: output row `r` comes from packed row
//! `H - 1 - r`, because capture hardware delivers frames bottom-up
//! relative to the host's buffer orientation.

use std::ops::Range;

use parking_lot::Mutex;
use tracing::{trace, warn};

use crate::color::{ColorConverter, LumaRange};
use crate::distribute::{row_range, worker_index, WorkDistributor, WorkShare};
use crate::encode::HalfBackend;
use crate::error::{ConversionError, Result};
use crate::v210::{unpack_chunk, FrameGeometry, WordSource, CHUNK_PIXELS, CHUNK_WORDS};

/// Interleaved RGB half-float components per chunk
const CHUNK_COMPONENTS: usize = CHUNK_PIXELS * 3;

/// Caller-owned destination: interleaved RGB half-float rows at a byte stride
#[derive(Debug)]
pub struct OutputBuffer<'a> {
    data: &'a mut [u16],
    stride: usize,
}

impl<'a> OutputBuffer<'a> {
    /// Wrap half-float components with a row stride in bytes
    pub fn new(data: &'a mut [u16], stride_bytes: usize) -> Result<Self> {
        if stride_bytes % 2 != 0 {
            return Err(ConversionError::OddStride(stride_bytes));
        }
        Ok(Self {
            data,
            stride: stride_bytes / 2,
        })
    }

    /// Wrap raw host bytes, which must be 2-byte aligned
    pub fn from_bytes(bytes: &'a mut [u8], stride_bytes: usize) -> Result<Self> {
        let even = bytes.len() & !1;
        let data: &mut [u16] = bytemuck::try_cast_slice_mut(&mut bytes[..even])
            .map_err(|_| ConversionError::Misaligned)?;
        Self::new(data, stride_bytes)
    }

    /// Row stride in bytes
    pub fn stride_bytes(&self) -> usize {
        self.stride * 2
    }

    /// Total size in bytes
    pub fn len_bytes(&self) -> usize {
        self.data.len() * 2
    }

    /// Components of output row `row`, `width * 3` long
    pub fn row(&self, row: usize, geometry: FrameGeometry) -> &[u16] {
        let start = row * self.stride;
        &self.data[start..start + geometry.output_row_components()]
    }

    fn validate(&self, geometry: FrameGeometry) -> Result<()> {
        let row_bytes = geometry.output_row_bytes();
        if self.stride_bytes() < row_bytes {
            return Err(ConversionError::StrideTooSmall {
                stride: self.stride_bytes(),
                row_bytes,
            });
        }

        let needed = (geometry.height() as usize - 1) * self.stride_bytes() + row_bytes;
        if self.len_bytes() < needed {
            return Err(ConversionError::BufferTooSmall {
                needed,
                actual: self.len_bytes(),
            });
        }
        Ok(())
    }
}

/// One worker's slice of a conversion call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionJob {
    /// Worker index recovered from the distributor's offset
    pub worker: usize,
    /// Worker count for this call
    pub workers: usize,
    /// Output rows this worker writes
    pub rows: Range<usize>,
}

impl ConversionJob {
    /// Derive the worker's job from the share it was handed
    pub fn for_share(share: WorkShare, workers: usize, height: usize) -> Self {
        let worker = worker_index(share, workers);
        Self {
            worker,
            workers,
            rows: row_range(worker, workers, height),
        }
    }
}

/// Converts packed v210 frames into RGB half-float buffers
#[derive(Debug, Clone, Copy)]
pub struct ConversionKernel {
    geometry: FrameGeometry,
    backend: HalfBackend,
}

impl ConversionKernel {
    pub fn new(geometry: FrameGeometry, backend: HalfBackend) -> Self {
        Self { geometry, backend }
    }

    pub fn geometry(&self) -> FrameGeometry {
        self.geometry
    }

    pub fn backend(&self) -> HalfBackend {
        self.backend
    }

    /// Convert a whole frame, fanning rows out across `distributor`
    ///
    /// Returns once every worker has finished its rows.
    pub fn convert<S, D>(
        &self,
        source: &S,
        dest: OutputBuffer<'_>,
        range: LumaRange,
        distributor: &D,
    ) -> Result<()>
    where
        S: WordSource + ?Sized,
        D: WorkDistributor + ?Sized,
    {
        let geometry = self.geometry;
        let needed = geometry.frame_words();
        if source.word_len() < needed {
            return Err(ConversionError::SourceTooSmall {
                needed,
                actual: source.word_len(),
            });
        }
        dest.validate(geometry)?;

        let height = geometry.height() as usize;
        let workers = distributor.workers().max(1);
        let stride = dest.stride;

        // Hand each worker exclusive ownership of its destination rows
        let mut remaining = dest.data;
        let mut slots = Vec::with_capacity(workers);
        for worker in 0..workers {
            let len = if worker + 1 == workers {
                remaining.len()
            } else {
                row_range(worker, workers, height).len() * stride
            };
            let (head, tail) = std::mem::take(&mut remaining).split_at_mut(len);
            remaining = tail;
            slots.push(Mutex::new(Some(head)));
        }

        let converter = ColorConverter::new(range, self.backend);
        let job = |share: WorkShare| {
            let job = ConversionJob::for_share(share, workers, height);
            let Some(rows) = slots[job.worker].lock().take() else {
                warn!("Worker {} received a second share, skipping", job.worker);
                return;
            };
            trace!("Worker {} converting rows {:?}", job.worker, job.rows);
            self.convert_rows(source, job.rows, rows, stride, &converter);
        };

        distributor.fork(geometry.pixel_count(), &job);
        Ok(())
    }

    /// Convert output `rows` into `dest`, whose first element is the first of those rows
    fn convert_rows<S: WordSource + ?Sized>(
        &self,
        source: &S,
        rows: Range<usize>,
        dest: &mut [u16],
        stride: usize,
        converter: &ColorConverter,
    ) {
        let geometry = self.geometry;
        let height = geometry.height() as usize;
        let row_words = geometry.row_words();
        let row_components = geometry.output_row_components();
        let mut packed = vec![0u32; geometry.chunks_per_row() * CHUNK_WORDS];

        for (i, row) in rows.enumerate() {
            let packed_row = height - 1 - row;
            source.read_words(packed_row * row_words, &mut packed);

            let start = i * stride;
            convert_row(&packed, &mut dest[start..start + row_components], converter);
        }
    }
}

/// Convert one packed row (padding excluded) into interleaved RGB halves
///
/// The final chunk has no following chroma pair, so it reuses its own.
pub fn convert_row(packed: &[u32], out: &mut [u16], converter: &ColorConverter) {
    let chunks = packed.len() / CHUNK_WORDS;
    for c in 0..chunks {
        let base = c * CHUNK_WORDS;
        let chunk = [packed[base], packed[base + 1], packed[base + 2], packed[base + 3]];
        let next = if c + 1 < chunks {
            Some(packed[base + CHUNK_WORDS])
        } else {
            None
        };

        let pixels = unpack_chunk(&chunk, next);
        let o = c * CHUNK_COMPONENTS;
        converter.convert_chunk(&pixels, &mut out[o..o + CHUNK_COMPONENTS]);
    }
}
