//! Lock-free primitives for real-time audio.

use crate::{Error, Ordering, Result};
use atomic_float::AtomicF32;
use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize};
use std::sync::Arc;

/// Cache-line aligned atomic f32, used for hot-swappable node parameters.
#[derive(Debug)]
#[repr(align(64))]
pub struct AtomicFloat {
    value: AtomicF32,
}

impl AtomicFloat {
    pub fn new(value: f32) -> Self {
        Self {
            value: AtomicF32::new(value),
        }
    }

    #[inline]
    pub fn get(&self) -> f32 {
        self.value.load(Ordering::Acquire)
    }

    #[inline]
    pub fn set(&self, value: f32) {
        self.value.store(value, Ordering::Release);
    }

    #[inline]
    pub fn swap(&self, value: f32) -> f32 {
        self.value.swap(value, Ordering::AcqRel)
    }
}

impl Clone for AtomicFloat {
    fn clone(&self) -> Self {
        Self::new(self.get())
    }
}

impl Default for AtomicFloat {
    fn default() -> Self {
        Self::new(0.0)
    }
}

/// Cache-line aligned atomic bool.
#[derive(Debug, Default)]
#[repr(align(64))]
pub struct AtomicFlag {
    value: AtomicBool,
}

impl AtomicFlag {
    pub fn new(value: bool) -> Self {
        Self {
            value: AtomicBool::new(value),
        }
    }

    #[inline]
    pub fn get(&self) -> bool {
        self.value.load(Ordering::Acquire)
    }

    #[inline]
    pub fn set(&self, value: bool) {
        self.value.store(value, Ordering::Release);
    }

    #[inline]
    pub fn swap(&self, value: bool) -> bool {
        self.value.swap(value, Ordering::AcqRel)
    }
}

/// Cache-line aligned monotone u64 counter (underruns, sequence numbers).
#[derive(Debug, Default)]
#[repr(align(64))]
pub struct AtomicCounter {
    value: AtomicU64,
}

impl AtomicCounter {
    pub fn new(value: u64) -> Self {
        Self {
            value: AtomicU64::new(value),
        }
    }

    #[inline]
    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Acquire)
    }

    #[inline]
    pub fn add(&self, n: u64) -> u64 {
        self.value.fetch_add(n, Ordering::AcqRel)
    }
}

#[repr(align(64))]
struct CacheAligned<T>(T);

struct Slot<T> {
    sequence: AtomicUsize,
    value: UnsafeCell<MaybeUninit<T>>,
}

/// Shared state of the bounded MPSC record ring.
///
/// Each slot carries a sequence number. A free slot at position `p` holds
/// sequence `p`; a full slot holds `p + 1`. Producers claim the head slot
/// by CAS and publish the constructed value with a release store of the
/// sequence, so the consumer observes either a fully constructed value or
/// none.
struct RingShared<T> {
    head: CacheAligned<AtomicUsize>,
    /// Written only by the single consumer; read by `Drop` to find the
    /// still-initialized range.
    tail: CacheAligned<AtomicUsize>,
    mask: usize,
    slots: Box<[Slot<T>]>,
}

// SAFETY: values move producer -> consumer exactly once; slot hand-off is
// ordered by the acquire/release sequence protocol.
unsafe impl<T: Send> Send for RingShared<T> {}
unsafe impl<T: Send> Sync for RingShared<T> {}

impl<T> Drop for RingShared<T> {
    fn drop(&mut self) {
        let mut tail = self.tail.0.load(Ordering::Acquire);
        let head = self.head.0.load(Ordering::Acquire);
        while tail < head {
            let slot = &self.slots[tail & self.mask];
            if slot.sequence.load(Ordering::Acquire) != tail.wrapping_add(1) {
                // Claimed but never published; nothing constructed there.
                break;
            }
            unsafe { (*slot.value.get()).assume_init_drop() };
            tail += 1;
        }
    }
}

/// Producer half of the record ring. Cheap to clone; any number of threads
/// may push.
pub struct RingProducer<T> {
    shared: Arc<RingShared<T>>,
}

impl<T> Clone for RingProducer<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T: Send> RingProducer<T> {
    /// Attempts to push. Returns the value back when the ring is full;
    /// a full ring is expected in normal operation, not a fault.
    pub fn try_push(&self, value: T) -> std::result::Result<(), T> {
        let shared = &*self.shared;
        let mut head = shared.head.0.load(Ordering::Relaxed);
        loop {
            let slot = &shared.slots[head & shared.mask];
            let sequence = slot.sequence.load(Ordering::Acquire);
            let lag = sequence as isize - head as isize;
            if lag == 0 {
                match shared.head.0.compare_exchange_weak(
                    head,
                    head.wrapping_add(1),
                    Ordering::Relaxed,
                    Ordering::Relaxed,
                ) {
                    Ok(_) => {
                        // SAFETY: the CAS granted exclusive ownership of this
                        // slot until the sequence store below.
                        unsafe { (*slot.value.get()).write(value) };
                        slot.sequence.store(head.wrapping_add(1), Ordering::Release);
                        return Ok(());
                    }
                    Err(current) => head = current,
                }
            } else if lag < 0 {
                return Err(value);
            } else {
                head = shared.head.0.load(Ordering::Relaxed);
            }
        }
    }
}

/// Consumer half of the record ring. Exactly one exists per ring.
pub struct RingConsumer<T> {
    shared: Arc<RingShared<T>>,
}

impl<T: Send> RingConsumer<T> {
    /// Attempts to pop. `None` means empty, not a fault.
    pub fn try_pop(&mut self) -> Option<T> {
        let shared = &*self.shared;
        let tail = shared.tail.0.load(Ordering::Relaxed);
        let slot = &shared.slots[tail & shared.mask];
        if slot.sequence.load(Ordering::Acquire) != tail.wrapping_add(1) {
            return None;
        }
        // SAFETY: the sequence match above proves the producer finished
        // constructing this value and will not touch the slot again until
        // it is republished as free.
        let value = unsafe { (*slot.value.get()).assume_init_read() };
        // Free the slot for the next wrap.
        slot.sequence
            .store(tail.wrapping_add(shared.slots.len()), Ordering::Release);
        shared.tail.0.store(tail.wrapping_add(1), Ordering::Release);
        Some(value)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        let shared = &*self.shared;
        let tail = shared.tail.0.load(Ordering::Relaxed);
        shared.slots[tail & shared.mask]
            .sequence
            .load(Ordering::Acquire)
            != tail.wrapping_add(1)
    }
}

/// Creates a bounded MPSC record ring. Capacity must be a power of two.
pub fn record_ring<T: Send>(capacity: usize) -> Result<(RingProducer<T>, RingConsumer<T>)> {
    if capacity == 0 || !capacity.is_power_of_two() {
        return Err(Error::InvalidRingCapacity(capacity));
    }
    let slots = (0..capacity)
        .map(|i| Slot {
            sequence: AtomicUsize::new(i),
            value: UnsafeCell::new(MaybeUninit::uninit()),
        })
        .collect::<Vec<_>>()
        .into_boxed_slice();
    let shared = Arc::new(RingShared {
        head: CacheAligned(AtomicUsize::new(0)),
        tail: CacheAligned(AtomicUsize::new(0)),
        mask: capacity - 1,
        slots,
    });
    Ok((
        RingProducer {
            shared: Arc::clone(&shared),
        },
        RingConsumer { shared },
    ))
}
