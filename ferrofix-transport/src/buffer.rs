//! Pooled read buffers.
//!
//! The session runner reads from the wire into a fixed-capacity buffer taken
//! from a [`BufferPool`] rather than allocating per message. Slots are
//! pre-allocated and recycled on release.

use bytes::BytesMut;
use parking_lot::Mutex;
use tracing::trace;

/// Pool of fixed-capacity byte buffers.
#[derive(Debug)]
pub struct BufferPool {
    /// Capacity of each slot.
    slot_capacity: usize,
    /// Free slots ready for reuse.
    free: Mutex<Vec<BytesMut>>,
}

impl BufferPool {
    /// Creates a pool with `slot_count` pre-allocated buffers of
    /// `slot_capacity` bytes each.
    #[must_use]
    pub fn new(slot_count: usize, slot_capacity: usize) -> Self {
        let free = (0..slot_count)
            .map(|_| BytesMut::with_capacity(slot_capacity))
            .collect();
        Self {
            slot_capacity,
            free: Mutex::new(free),
        }
    }

    /// Takes a buffer from the pool, allocating a fresh one if the pool is
    /// exhausted.
    #[must_use]
    pub fn acquire(&self) -> BytesMut {
        self.free
            .lock()
            .pop()
            .unwrap_or_else(|| BytesMut::with_capacity(self.slot_capacity))
    }

    /// Returns a buffer to the pool for reuse. Contents are cleared.
    pub fn release(&self, mut buf: BytesMut) {
        buf.clear();
        // Buffers that grew past the slot capacity are dropped instead of
        // letting the pool accumulate oversized slots.
        if buf.capacity() <= self.slot_capacity {
            self.free.lock().push(buf);
        } else {
            trace!(capacity = buf.capacity(), "dropping oversized buffer");
        }
    }

    /// Returns the number of free slots.
    #[must_use]
    pub fn available(&self) -> usize {
        self.free.lock().len()
    }

    /// Returns the per-slot capacity.
    #[must_use]
    pub const fn slot_capacity(&self) -> usize {
        self.slot_capacity
    }
}
