//! Work distribution across conversion workers
//!
//! The host hands out work the way a fork/join primitive does: given a
//! total item count, it runs a job once per worker and tells each worker
//! its own offset and share. Workers turn that offset back into a worker
//! index and then into a contiguous row range.
//!
//! [`RayonDistributor`] runs a fixed-size `rayon` pool sized from the host's
//! processor count. [`SerialDistributor`] runs every share inline on the
//! calling thread.

use std::ops::Range;

use rayon::{ThreadPool, ThreadPoolBuilder};
use tracing::debug;

use crate::error::Result;

/// One worker's portion of a forked job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkShare {
    /// First item of this worker's share
    pub offset: usize,
    /// Number of items in this worker's share
    pub count: usize,
    /// Total items across all workers
    pub total: usize,
}

/// Fork/join primitive that runs a job once per worker
///
/// `fork` must not return until every invocation of `job` has finished.
pub trait WorkDistributor: Sync {
    /// Number of workers each fork fans out to
    fn workers(&self) -> usize;

    /// Run `job` once per worker, then join
    fn fork(&self, total: usize, job: &(dyn Fn(WorkShare) + Sync));
}

/// Evenly split `total` items and return the share of `worker`
pub fn share_for(worker: usize, workers: usize, total: usize) -> WorkShare {
    let workers = workers.max(1);
    let offset = worker * total / workers;
    let end = (worker + 1) * total / workers;
    WorkShare {
        offset,
        count: end - offset,
        total,
    }
}

/// Recover a worker index from the offset a distributor handed out
///
/// Rounds `workers * offset / total` to the nearest worker.
pub fn worker_index(share: WorkShare, workers: usize) -> usize {
    let workers = workers.max(1);
    if share.total == 0 {
        return 0;
    }
    let index = (workers as f64 * share.offset as f64 / share.total as f64).round() as usize;
    index.min(workers - 1)
}

/// Contiguous output rows owned by `worker`
///
/// Every worker gets `height / workers` rows; the last also takes the
/// remainder, so the ranges tile `0..height` with no gaps or overlap.
pub fn row_range(worker: usize, workers: usize, height: usize) -> Range<usize> {
    let workers = workers.max(1);
    let per_worker = height / workers;
    let start = worker * per_worker;
    let end = if worker + 1 >= workers {
        height
    } else {
        start + per_worker
    };
    start..end
}

/// Fixed-size `rayon` pool distributor
pub struct RayonDistributor {
    pool: ThreadPool,
    workers: usize,
}

impl RayonDistributor {
    /// Build a pool with exactly `workers` threads (at least one)
    pub fn new(workers: usize) -> Result<Self> {
        let workers = workers.max(1);
        let pool = ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("hdmisupply-convert-{i}"))
            .build()?;

        debug!("Created conversion pool with {} workers", workers);
        Ok(Self { pool, workers })
    }
}

impl std::fmt::Debug for RayonDistributor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RayonDistributor")
            .field("workers", &self.workers)
            .finish_non_exhaustive()
    }
}

impl WorkDistributor for RayonDistributor {
    fn workers(&self) -> usize {
        self.workers
    }

    fn fork(&self, total: usize, job: &(dyn Fn(WorkShare) + Sync)) {
        let workers = self.workers;
        self.pool.scope(|scope| {
            for worker in 0..workers {
                let share = share_for(worker, workers, total);
                scope.spawn(move |_| job(share));
            }
        });
    }
}

/// Runs each share in turn on the calling thread
#[derive(Debug, Clone, Copy)]
pub struct SerialDistributor {
    workers: usize,
}

impl SerialDistributor {
    /// Split work into `workers` shares but run them sequentially
    pub fn new(workers: usize) -> Self {
        Self {
            workers: workers.max(1),
        }
    }
}

impl Default for SerialDistributor {
    fn default() -> Self {
        Self::new(1)
    }
}

impl WorkDistributor for SerialDistributor {
    fn workers(&self) -> usize {
        self.workers
    }

    fn fork(&self, total: usize, job: &(dyn Fn(WorkShare) + Sync)) {
        for worker in 0..self.workers {
            job(share_for(worker, self.workers, total));
        }
    }
}
