//! # Sample Handoff
//!
//! Single-producer, single-consumer lock-free queue carrying samples from an
//! acquisition thread to the detector thread, the way a sensor interrupt
//! hands samples to the main loop.
//!
//! ## Design
//!
//! - Cache-line aligned head/tail counters to avoid false sharing
//! - Power-of-two capacity for modulo via bitwise AND
//! - The producer never blocks in `try_push`: a full queue rejects the
//!   sample and counts an overrun
//! - Dropping the producer closes the queue
//! - Each handle can move to another thread but cannot be shared between
//!   threads, so there is only ever one writer and one reader
//!
//! ## Memory Ordering
//!
//! - Producer: Release store on head after writing the slot
//! - Consumer: Acquire load on head before reading the slot
//!
//! ## Example
//!
//! ```rust
//! use mbsd_core::Sample;
//! use mbsd_sim::handoff::channel;
//!
//! let (producer, consumer) = channel(4);
//! producer.try_push(Sample::new(0, 1, 2, 3)).unwrap();
//! drop(producer);
//! assert_eq!(consumer.pop(), Some(Sample::new(0, 1, 2, 3)));
//! assert!(consumer.is_finished());
//! ```

use mbsd_core::Sample;
use std::cell::{Cell, UnsafeCell};
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

const CACHE_LINE_SIZE: usize = 64;

#[repr(align(64))]
struct PaddedAtomicUsize {
    value: AtomicUsize,
    _pad: [u8; CACHE_LINE_SIZE - std::mem::size_of::<AtomicUsize>()],
}

impl PaddedAtomicUsize {
    fn new(v: usize) -> Self {
        Self {
            value: AtomicUsize::new(v),
            _pad: [0; CACHE_LINE_SIZE - std::mem::size_of::<AtomicUsize>()],
        }
    }
}

struct Shared {
    slots: Box<[UnsafeCell<Sample>]>,
    /// Write position (modified by producer)
    head: PaddedAtomicUsize,
    /// Read position (modified by consumer)
    tail: PaddedAtomicUsize,
    mask: usize,
    closed: AtomicBool,
    overruns: AtomicU64,
}

// Each slot is written only by the producer before the Release store on
// head, and read only by the consumer after the matching Acquire load.
unsafe impl Sync for Shared {}

impl Shared {
    fn capacity(&self) -> usize {
        self.mask + 1
    }

    fn len(&self) -> usize {
        let head = self.head.value.load(Ordering::Acquire);
        let tail = self.tail.value.load(Ordering::Acquire);
        head.wrapping_sub(tail)
    }
}

/// Create a queue holding at least `capacity` samples.
///
/// Capacity is rounded up to the next power of two, minimum 2.
pub fn channel(capacity: usize) -> (SampleProducer, SampleConsumer) {
    let capacity = capacity.max(2).next_power_of_two();
    let slots: Vec<UnsafeCell<Sample>> = (0..capacity)
        .map(|_| UnsafeCell::new(Sample::default()))
        .collect();

    let shared = Arc::new(Shared {
        slots: slots.into_boxed_slice(),
        head: PaddedAtomicUsize::new(0),
        tail: PaddedAtomicUsize::new(0),
        mask: capacity - 1,
        closed: AtomicBool::new(false),
        overruns: AtomicU64::new(0),
    });

    (
        SampleProducer {
            shared: Arc::clone(&shared),
            _unsync: PhantomData,
        },
        SampleConsumer {
            shared,
            _unsync: PhantomData,
        },
    )
}

/// Writing end of the queue.
///
/// `Send` but not `Sync`:
///
/// ```compile_fail
/// fn shared<T: Sync>() {}
/// shared::<mbsd_sim::handoff::SampleProducer>();
/// ```
pub struct SampleProducer {
    shared: Arc<Shared>,
    _unsync: PhantomData<Cell<()>>,
}

impl SampleProducer {
    /// Push a sample, returning it when the queue is full.
    pub fn try_push(&self, sample: Sample) -> Result<(), Sample> {
        let shared = &*self.shared;
        let head = shared.head.value.load(Ordering::Relaxed);
        let tail = shared.tail.value.load(Ordering::Acquire);

        if head.wrapping_sub(tail) >= shared.capacity() {
            shared.overruns.fetch_add(1, Ordering::Relaxed);
            return Err(sample);
        }

        unsafe {
            *shared.slots[head & shared.mask].get() = sample;
        }
        shared.head.value.store(head.wrapping_add(1), Ordering::Release);
        Ok(())
    }

    /// Push a sample, yielding until there is room.
    pub fn push_blocking(&self, mut sample: Sample) {
        loop {
            match self.try_push(sample) {
                Ok(()) => return,
                Err(rejected) => {
                    sample = rejected;
                    std::thread::yield_now();
                }
            }
        }
    }

    /// Rejected pushes so far.
    pub fn overruns(&self) -> u64 {
        self.shared.overruns.load(Ordering::Relaxed)
    }
}

impl Drop for SampleProducer {
    fn drop(&mut self) {
        self.shared.closed.store(true, Ordering::Release);
    }
}

/// Reading end of the queue.
///
/// `Send` but not `Sync`:
///
/// ```compile_fail
/// fn shared<T: Sync>() {}
/// shared::<mbsd_sim::handoff::SampleConsumer>();
/// ```
pub struct SampleConsumer {
    shared: Arc<Shared>,
    _unsync: PhantomData<Cell<()>>,
}

impl SampleConsumer {
    /// Pop the oldest sample.
    pub fn pop(&self) -> Option<Sample> {
        let shared = &*self.shared;
        let tail = shared.tail.value.load(Ordering::Relaxed);
        let head = shared.head.value.load(Ordering::Acquire);

        if tail == head {
            return None;
        }

        let sample = unsafe { *shared.slots[tail & shared.mask].get() };
        shared.tail.value.store(tail.wrapping_add(1), Ordering::Release);
        Some(sample)
    }

    /// True once the producer is gone and every sample has been popped.
    pub fn is_finished(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire) && self.shared.len() == 0
    }

    /// Samples waiting.
    pub fn len(&self) -> usize {
        self.shared.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.shared.capacity()
    }

    /// Samples the producer had to reject.
    pub fn overruns(&self) -> u64 {
        self.shared.overruns.load(Ordering::Relaxed)
    }
}
