//! Single-producer/single-consumer byte ring over a shared region.
//!
//! The header holds absolute (monotone) read/write cursors; a cursor's
//! index into the data area is `cursor % capacity`. Only the producer
//! stores the write cursor and only the consumer stores the read cursor,
//! so no compare-and-swap is needed. Writes and reads never block and
//! never assume the peer is alive.

use crate::error::{Error, Result};
use crate::shm::SharedRegion;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[repr(C)]
struct ByteRingHeader {
    read: AtomicU64,
    write: AtomicU64,
    capacity: u64,
}

/// Bytes the header occupies at the front of the region.
pub const BYTE_RING_HEADER_LEN: usize = std::mem::size_of::<ByteRingHeader>();

/// Region size needed for a ring of `capacity` data bytes.
pub fn byte_ring_region_len(capacity: usize) -> usize {
    BYTE_RING_HEADER_LEN + capacity
}

fn validate_region(region: &SharedRegion) -> Result<usize> {
    let capacity = region
        .len()
        .checked_sub(BYTE_RING_HEADER_LEN)
        .unwrap_or(0);
    if capacity == 0 {
        return Err(Error::InvalidCapacity(capacity));
    }
    Ok(capacity)
}

// SAFETY (shared by both halves): the region outlives the handle via Arc,
// the header sits at offset 0 of a page-aligned mapping (AtomicU64
// alignment holds), and the data area is only touched between the cursor
// positions a given side owns.
fn header(region: &SharedRegion) -> &ByteRingHeader {
    unsafe { &*(region.as_ptr() as *const ByteRingHeader) }
}

fn data_ptr(region: &SharedRegion) -> *mut u8 {
    // SAFETY: region length was validated to exceed the header.
    unsafe { region.as_ptr().add(BYTE_RING_HEADER_LEN) }
}

/// Producer half.
pub struct ByteRingWriter {
    region: Arc<SharedRegion>,
    capacity: usize,
}

impl ByteRingWriter {
    /// Initializes the header of a freshly created region and takes the
    /// producer role.
    pub fn new(region: Arc<SharedRegion>) -> Result<Self> {
        let capacity = validate_region(&region)?;
        let hdr = header(&region);
        hdr.read.store(0, Ordering::Relaxed);
        hdr.write.store(0, Ordering::Relaxed);
        // Capacity is plain data, written once before the reader attaches.
        // SAFETY: sole writer during initialization.
        unsafe {
            let capacity_ptr = std::ptr::addr_of!(hdr.capacity) as *mut u64;
            capacity_ptr.write(capacity as u64);
        }
        Ok(Self { region, capacity })
    }

    /// Attaches to a region whose header another process initialized.
    pub fn attach(region: Arc<SharedRegion>) -> Result<Self> {
        let capacity = validate_region(&region)?;
        Ok(Self { region, capacity })
    }

    /// Bytes currently writable without overwriting unread data.
    pub fn free(&self) -> usize {
        let hdr = header(&self.region);
        let read = hdr.read.load(Ordering::Acquire);
        let write = hdr.write.load(Ordering::Relaxed);
        self.capacity - (write - read) as usize
    }

    /// Writes as much of `bytes` as fits and returns the count, splitting
    /// at the wrap boundary. Zero means full, not failure.
    pub fn try_write(&mut self, bytes: &[u8]) -> usize {
        let hdr = header(&self.region);
        let read = hdr.read.load(Ordering::Acquire);
        let write = hdr.write.load(Ordering::Relaxed);
        let free = self.capacity - (write - read) as usize;
        let count = bytes.len().min(free);
        if count == 0 {
            return 0;
        }

        let start = write as usize % self.capacity;
        let first = count.min(self.capacity - start);
        let data = data_ptr(&self.region);
        // SAFETY: [start, start+first) and [0, count-first) lie inside the
        // data area and ahead of the read cursor, which only we move past.
        unsafe {
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), data.add(start), first);
            std::ptr::copy_nonoverlapping(bytes.as_ptr().add(first), data, count - first);
        }
        hdr.write.store(write + count as u64, Ordering::Release);
        count
    }
}

/// Consumer half.
pub struct ByteRingReader {
    region: Arc<SharedRegion>,
    capacity: usize,
}

impl ByteRingReader {
    pub fn attach(region: Arc<SharedRegion>) -> Result<Self> {
        let capacity = validate_region(&region)?;
        Ok(Self { region, capacity })
    }

    /// Bytes currently readable.
    pub fn available(&self) -> usize {
        let hdr = header(&self.region);
        let write = hdr.write.load(Ordering::Acquire);
        let read = hdr.read.load(Ordering::Relaxed);
        (write - read) as usize
    }

    /// Reads up to `buf.len()` bytes and returns the count, splitting at
    /// the wrap boundary. Zero means empty, not failure.
    pub fn try_read(&mut self, buf: &mut [u8]) -> usize {
        let hdr = header(&self.region);
        let write = hdr.write.load(Ordering::Acquire);
        let read = hdr.read.load(Ordering::Relaxed);
        let available = (write - read) as usize;
        let count = buf.len().min(available);
        if count == 0 {
            return 0;
        }

        let start = read as usize % self.capacity;
        let first = count.min(self.capacity - start);
        let data = data_ptr(&self.region);
        // SAFETY: the range holds published bytes the producer will not
        // touch until we advance the read cursor.
        unsafe {
            std::ptr::copy_nonoverlapping(data.add(start), buf.as_mut_ptr(), first);
            std::ptr::copy_nonoverlapping(data, buf.as_mut_ptr().add(first), count - first);
        }
        hdr.read.store(read + count as u64, Ordering::Release);
        count
    }
}
