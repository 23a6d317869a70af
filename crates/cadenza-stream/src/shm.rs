//! Named shared-memory regions backing the cross-process rings.

use crate::error::{Error, Result};
use memmap2::MmapMut;
use std::cell::UnsafeCell;
use std::fs::OpenOptions;
use std::path::PathBuf;

/// A named, mapped shared-memory segment. `UnsafeCell` provides interior
/// mutability because the region is written through an immutable handle
/// from both sides of the process boundary. This is sound because:
/// 1. Each byte range has a single writer (ring protocol: producer owns
///    the write cursor and the region ahead of it, consumer owns the read
///    cursor).
/// 2. Cursor publication goes through atomics placed inside the region.
pub struct SharedRegion {
    mmap: UnsafeCell<MmapMut>,
    name: String,
    len: usize,
    /// Creator owns the backing file and unlinks it on drop.
    owns_memory: bool,
}

impl SharedRegion {
    pub fn create(name: &str, len: usize) -> Result<Self> {
        let path = Self::shm_path(name);
        let file = open_options(true)
            .open(&path)
            .and_then(|file| file.set_len(len as u64).map(|_| file))
            .map_err(|source| Error::SharedMemory {
                name: name.to_string(),
                source,
            })?;

        // SAFETY: the file was just created and sized; the mapping stays
        // alive for the lifetime of self.
        let mmap = unsafe { MmapMut::map_mut(&file) }.map_err(|source| Error::SharedMemory {
            name: name.to_string(),
            source,
        })?;

        Ok(Self {
            mmap: UnsafeCell::new(mmap),
            name: name.to_string(),
            len,
            owns_memory: true,
        })
    }

    pub fn open(name: &str, len: usize) -> Result<Self> {
        let path = Self::shm_path(name);
        let file = open_options(false)
            .open(&path)
            .map_err(|source| Error::SharedMemory {
                name: name.to_string(),
                source,
            })?;

        // SAFETY: mapping a file another process created; length is
        // validated below before any typed access.
        let mmap = unsafe { MmapMut::map_mut(&file) }.map_err(|source| Error::SharedMemory {
            name: name.to_string(),
            source,
        })?;
        if mmap.len() < len {
            return Err(Error::RegionTooSmall {
                needed: len,
                mapped: mmap.len(),
            });
        }

        Ok(Self {
            mmap: UnsafeCell::new(mmap),
            name: name.to_string(),
            len,
            owns_memory: false,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Base pointer of the mapping. Callers uphold the single-writer
    /// protocol documented on the type.
    pub fn as_ptr(&self) -> *mut u8 {
        // SAFETY: only the pointer is taken here; aliasing rules are
        // enforced by the ring protocol layered on top.
        unsafe { (*self.mmap.get()).as_mut_ptr() }
    }

    fn shm_path(name: &str) -> PathBuf {
        #[cfg(target_os = "linux")]
        let base = PathBuf::from("/dev/shm");

        #[cfg(not(target_os = "linux"))]
        let base = std::env::temp_dir();

        base.join(format!("cadenza_{name}"))
    }
}

fn open_options(create: bool) -> OpenOptions {
    let mut options = OpenOptions::new();
    options.read(true).write(true);
    if create {
        options.create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
    }
    options
}

// SAFETY: the mapping itself is shared memory and valid from any thread;
// mutation goes through the single-writer ring protocol (see struct docs),
// with cursor hand-off via atomics resident in the region.
unsafe impl Send for SharedRegion {}
unsafe impl Sync for SharedRegion {}

impl Drop for SharedRegion {
    fn drop(&mut self) {
        if self.owns_memory {
            let _ = std::fs::remove_file(Self::shm_path(&self.name));
        }
    }
}
