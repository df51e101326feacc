//! Named POSIX shared-memory segments
//!
//! Every mapping made here is process-lifetime: it is never unmapped.
//! Instances in one host process cannot know which of them will be torn
//! down last, so a mapping that any of them might still read has to stay
//! valid until the process exits. Unlinking a name only stops new
//! instances from finding it; existing mappings are unaffected.
//!
//! Mapped memory is only ever viewed as types implementing [`SharedView`],
//! which are valid for any bit pattern and only mutated through atomics.

use std::fs::File;
use std::mem::{align_of, size_of};
use std::num::NonZeroUsize;
use std::os::fd::OwnedFd;
use std::ptr::NonNull;
use std::sync::atomic::AtomicU32;

use nix::errno::Errno;
use nix::fcntl::OFlag;
use nix::libc::off_t;
use nix::sys::mman::{mmap, shm_open, shm_unlink, MapFlags, ProtFlags};
use nix::sys::stat::Mode;
use nix::unistd::ftruncate;
use tracing::{debug, warn};

use crate::error::{CaptureError, Result};

/// Types that may be viewed directly in shared memory
///
/// # Safety
///
/// Implementors must be valid for every bit pattern (including all zeroes),
/// must be `Sync`, and must only be mutated through atomic operations.
pub unsafe trait SharedView: Sync {}

// SAFETY: AtomicU32 has the layout of u32, any bits are valid, and all access is atomic.
unsafe impl SharedView for AtomicU32 {}

/// How a segment is mapped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    ReadOnly,
    ReadWrite,
}

/// A shared mapping that stays mapped until the process exits
///
/// There is deliberately no `Drop` impl and no unmap call anywhere in this
/// crate. Converting into a view hands out a `'static` reference, which is
/// sound only because of that.
#[derive(Debug)]
pub struct ProcessLifetime {
    name: String,
    ptr: NonNull<u8>,
    len: usize,
    access: Access,
}

impl ProcessLifetime {
    /// Segment name this mapping came from
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Mapped length in bytes
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn access(&self) -> Access {
        self.access
    }

    /// View the mapping as a slice of `T`, truncating any partial element
    pub fn into_slice<T: SharedView>(self) -> &'static [T] {
        debug_assert_eq!(self.ptr.as_ptr() as usize % align_of::<T>(), 0);
        let count = self.len / size_of::<T>();
        // SAFETY: mmap returns page-aligned memory at least `len` bytes long
        // that is never unmapped. T is valid for any bits and only mutated
        // atomically, so concurrent access from other processes is not UB.
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr().cast::<T>(), count) }
    }

    /// View the start of the mapping as one `T`
    pub fn into_ref<T: SharedView>(self) -> Result<&'static T> {
        if self.len < size_of::<T>() {
            return Err(CaptureError::invalid_descriptor(format!(
                "{} is {} bytes, expected at least {}",
                self.name,
                self.len,
                size_of::<T>()
            )));
        }
        debug_assert_eq!(self.ptr.as_ptr() as usize % align_of::<T>(), 0);
        // SAFETY: as for into_slice; the length check covers one T.
        Ok(unsafe { &*self.ptr.as_ptr().cast::<T>() })
    }
}

/// Create `name` with O_EXCL and map it read-write
///
/// Returns `None` if the segment already exists, which means another
/// instance won the race to create it. New segments are zero-filled.
pub fn create_exclusive(name: &str, len: usize) -> Result<Option<ProcessLifetime>> {
    let fd = match shm_open(
        name,
        OFlag::O_CREAT | OFlag::O_EXCL | OFlag::O_RDWR,
        Mode::S_IRUSR | Mode::S_IWUSR,
    ) {
        Ok(fd) => fd,
        Err(Errno::EEXIST) => {
            debug!("Segment {} already exists", name);
            return Ok(None);
        }
        Err(e) => return Err(CaptureError::shared_memory(format!("create {name}"), e)),
    };

    let size = off_t::try_from(len)
        .map_err(|_| CaptureError::unsupported(format!("segment size {len} does not fit off_t")))?;
    if let Err(e) = ftruncate(&fd, size) {
        discard(name);
        return Err(CaptureError::shared_memory(format!("ftruncate {name}"), e));
    }

    match map(fd, name, len, Access::ReadWrite) {
        Ok(mapping) => {
            debug!("Created segment {} ({} bytes)", name, len);
            Ok(Some(mapping))
        }
        Err(e) => {
            discard(name);
            Err(e)
        }
    }
}

/// Open an existing segment of at least `min_len` bytes
///
/// Returns `None` if no segment has that name. A segment that exists but
/// is still shorter than `min_len` is being set up by its creator and
/// yields [`CaptureError::DescriptorNotReady`].
pub fn open_existing(name: &str, min_len: usize, access: Access) -> Result<Option<ProcessLifetime>> {
    let flags = match access {
        Access::ReadOnly => OFlag::O_RDONLY,
        Access::ReadWrite => OFlag::O_RDWR,
    };
    let fd = match shm_open(name, flags, Mode::empty()) {
        Ok(fd) => fd,
        Err(Errno::ENOENT) => return Ok(None),
        Err(e) => return Err(CaptureError::shared_memory(format!("open {name}"), e)),
    };

    let file = File::from(fd);
    let len = file
        .metadata()
        .map_err(|e| CaptureError::shared_memory(format!("stat {name}"), io_errno(&e)))?
        .len() as usize;
    if len < min_len.max(1) {
        return Err(CaptureError::DescriptorNotReady(name.to_string()));
    }

    map(OwnedFd::from(file), name, len, access).map(Some)
}

/// Remove `name` so new instances cannot find it
///
/// Existing mappings stay valid. A name that is already gone is not an error.
pub fn unlink(name: &str) -> Result<()> {
    match shm_unlink(name) {
        Ok(()) | Err(Errno::ENOENT) => {
            debug!("Unlinked segment {}", name);
            Ok(())
        }
        Err(e) => Err(CaptureError::shared_memory(format!("unlink {name}"), e)),
    }
}

fn map(fd: OwnedFd, name: &str, len: usize, access: Access) -> Result<ProcessLifetime> {
    let length = NonZeroUsize::new(len)
        .ok_or_else(|| CaptureError::invalid_descriptor(format!("{name} is empty")))?;
    let prot = match access {
        Access::ReadOnly => ProtFlags::PROT_READ,
        Access::ReadWrite => ProtFlags::PROT_READ | ProtFlags::PROT_WRITE,
    };

    // SAFETY: a new MAP_SHARED mapping at a kernel-chosen address; it does
    // not alias any existing Rust allocation. The fd may close afterwards.
    let ptr = unsafe { mmap(None, length, prot, MapFlags::MAP_SHARED, &fd, 0) }
        .map_err(|e| CaptureError::shared_memory(format!("mmap {name}"), e))?;

    Ok(ProcessLifetime {
        name: name.to_string(),
        ptr: ptr.cast::<u8>(),
        len,
        access,
    })
}

/// Best-effort unlink after a failed create
fn discard(name: &str) {
    if let Err(e) = unlink(name) {
        warn!("Failed to remove half-created segment {}: {}", name, e);
    }
}

fn io_errno(err: &std::io::Error) -> Errno {
    Errno::from_raw(err.raw_os_error().unwrap_or(nix::libc::EIO))
}
