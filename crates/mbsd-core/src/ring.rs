//! # Ring Buffer
//!
//! Fixed-capacity circular store of `i16` samples with independent read and
//! write cursors, used as the sliding window of every filter stage.
//!
//! ## Design
//!
//! - Capacity is a const generic, so the backing array and the wrap point can
//!   never disagree
//! - Cursors are plain indices into the owned array, always in `[0, N)`
//! - Forward operations advance a cursor and wrap to `0` past `N - 1`;
//!   reverse operations retreat and wrap to `N - 1` past `0`
//! - No fill level is tracked. Callers keep reads and writes in step with
//!   their own access pattern (a fixed-order filter reads and writes once per
//!   sample), and must not read more than they wrote since the last flush
//!
//! A sliding window is kept without moving elements: each cycle reads the
//! value about to be evicted and overwrites its slot with the newest one.
//!
//! ```text
//!  read ─┐        ┌─ write
//!        ▼        ▼
//!   ┌────┬────┬────┬────┐
//!   │ x0 │ x1 │ x2 │ x3 │   read == write once the window is full
//!   └────┴────┴────┴────┘
//! ```
//!
//! ## Example
//!
//! ```rust
//! use mbsd_core::ring::RingBuffer;
//!
//! let mut ring: RingBuffer<3> = RingBuffer::new();
//! for v in [1, 2, 3, 4] {
//!     ring.write_forward(v);
//! }
//! // Slot 0 was overwritten by the fourth write.
//! assert_eq!(ring.read_forward(), 4);
//! assert_eq!(ring.read_forward(), 2);
//! assert_eq!(ring.read_forward(), 3);
//! ```

use crate::error::RingError;

/// Circular buffer of `N` signed 16-bit values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RingBuffer<const N: usize> {
    /// Backing storage
    storage: [i16; N],
    /// Read cursor
    read: usize,
    /// Write cursor
    write: usize,
}

impl<const N: usize> RingBuffer<N> {
    /// Compile-time capacity.
    pub const CAPACITY: usize = N;

    /// Create a zeroed buffer with both cursors at the start.
    pub fn new() -> Self {
        const { assert!(N >= 1, "ring buffer capacity must be at least 1") };
        Self {
            storage: [0; N],
            read: 0,
            write: 0,
        }
    }

    /// Create a buffer seeded from caller-owned storage.
    ///
    /// Returns `CapacityMismatch` when `values` is not exactly `N` long.
    pub fn from_slice(values: &[i16]) -> Result<Self, RingError> {
        if values.len() != N {
            return Err(RingError::CapacityMismatch {
                expected: N,
                actual: values.len(),
            });
        }
        let mut ring = Self::new();
        ring.storage.copy_from_slice(values);
        Ok(ring)
    }

    /// Buffer capacity.
    #[inline]
    pub fn capacity(&self) -> usize {
        N
    }

    /// Reset both cursors to the first slot. Stored values are left in place.
    pub fn flush(&mut self) {
        self.read = 0;
        self.write = 0;
    }

    /// Flush, then write `value` into every slot.
    ///
    /// The write cursor wraps back to the start, so the buffer behaves as if
    /// `N` samples of `value` had already passed through it.
    pub fn prime(&mut self, value: i16) {
        self.flush();
        for _ in 0..N {
            self.write_forward(value);
        }
    }

    /// Store `value` at the write cursor, then advance it.
    #[inline]
    pub fn write_forward(&mut self, value: i16) {
        self.storage[self.write] = value;
        self.write = advance::<N>(self.write);
    }

    /// Store `value` at the write cursor, then retreat it.
    #[inline]
    pub fn write_reverse(&mut self, value: i16) {
        self.storage[self.write] = value;
        self.write = retreat::<N>(self.write);
    }

    /// Load the value at the read cursor, then advance it.
    #[inline]
    pub fn read_forward(&mut self) -> i16 {
        let value = self.storage[self.read];
        self.read = advance::<N>(self.read);
        value
    }

    /// Load the value at the read cursor, then retreat it.
    #[inline]
    pub fn read_reverse(&mut self) -> i16 {
        let value = self.storage[self.read];
        self.read = retreat::<N>(self.read);
        value
    }

    /// Value under the read cursor, without moving it.
    #[inline]
    pub fn peek(&self) -> i16 {
        self.storage[self.read]
    }

    /// Current read cursor.
    pub fn read_index(&self) -> usize {
        self.read
    }

    /// Current write cursor.
    pub fn write_index(&self) -> usize {
        self.write
    }

    /// Raw storage in slot order (not age order).
    pub fn as_slice(&self) -> &[i16] {
        &self.storage
    }
}

impl<const N: usize> Default for RingBuffer<N> {
    fn default() -> Self {
        Self::new()
    }
}

#[inline]
fn advance<const N: usize>(index: usize) -> usize {
    if index + 1 >= N {
        0
    } else {
        index + 1
    }
}

#[inline]
fn retreat<const N: usize>(index: usize) -> usize {
    if index == 0 {
        N - 1
    } else {
        index - 1
    }
}
