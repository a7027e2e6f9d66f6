//! Lossy broadcast ring buffer for wire-format IQ bytes
//!
//! One producer writes, any number of readers drain at their own pace. The
//! writer never waits for readers: a reader that falls more than one capacity
//! behind silently loses the overwritten bytes. Slots and the write cursor are
//! atomics so concurrent reads and writes never need a lock; the mutex/condvar
//! pair only carries the "new data may be available" wakeup.

use crossbeam::utils::CachePadded;
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;

/// Fixed-capacity byte ring with one write cursor
pub struct RingBuffer {
    slots: Box<[AtomicU8]>,
    /// Next byte to be written, always in `0..capacity`
    write_pos: CachePadded<AtomicUsize>,
    wake_lock: Mutex<()>,
    wake: Condvar,
}

impl RingBuffer {
    /// Create a ring holding `chunks` transfers of `chunk_bytes` each.
    ///
    /// Capacity is an exact multiple of the chunk so a chunk written at a
    /// chunk boundary never straddles the wrap.
    pub fn new(chunk_bytes: usize, chunks: usize) -> Self {
        assert!(chunk_bytes > 0 && chunks > 0, "ring buffer must not be empty");
        let capacity = chunk_bytes * chunks;
        Self {
            slots: (0..capacity).map(|_| AtomicU8::new(0)).collect(),
            write_pos: CachePadded::new(AtomicUsize::new(0)),
            wake_lock: Mutex::new(()),
            wake: Condvar::new(),
        }
    }

    /// Capacity in bytes
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Current write cursor
    pub fn write_pos(&self) -> usize {
        self.write_pos.load(Ordering::Acquire)
    }

    /// Copy `data` in at the write cursor, advance it and wake all readers.
    ///
    /// Unread data is overwritten without checking; this never blocks on
    /// readers. Only the wakeup briefly takes the signal mutex.
    pub fn write(&self, data: &[u8]) {
        let capacity = self.capacity();
        let mut pos = self.write_pos.load(Ordering::Relaxed);

        for &byte in data {
            self.slots[pos].store(byte, Ordering::Relaxed);
            pos += 1;
            if pos == capacity {
                pos = 0;
            }
        }

        self.write_pos.store(pos, Ordering::Release);

        let _guard = self.wake_lock.lock();
        self.wake.notify_all();
    }

    /// Bytes between `read_pos` and the write cursor, modulo capacity
    pub fn available(&self, read_pos: usize) -> usize {
        distance(read_pos, self.write_pos(), self.capacity())
    }
}

/// Forward distance from `from` to `to` on a ring of `capacity`
#[inline]
fn distance(from: usize, to: usize, capacity: usize) -> usize {
    (to + capacity - from) % capacity
}

/// Thread-safe handle to a ring buffer
pub type SharedRingBuffer = Arc<RingBuffer>;

/// One consumer's private view of the ring
pub struct RingReader {
    ring: SharedRingBuffer,
    read_pos: usize,
}

impl RingReader {
    /// Start reading at the current write cursor, so only data written from
    /// now on is seen.
    pub fn new(ring: SharedRingBuffer) -> Self {
        let read_pos = ring.write_pos();
        Self { ring, read_pos }
    }

    /// Current read cursor
    pub fn read_pos(&self) -> usize {
        self.read_pos
    }

    /// Bytes ready for this reader, always below capacity
    pub fn available(&self) -> usize {
        self.ring.available(self.read_pos)
    }

    /// Block until the producer has signalled and something is available.
    ///
    /// Checks under the signal mutex first, so a write between the check and
    /// the wait cannot be missed. Spurious wakeups just return.
    pub fn wait(&self) {
        let mut guard = self.ring.wake_lock.lock();
        if self.available() == 0 {
            self.ring.wake.wait(&mut guard);
        }
    }

    /// Replace `out` with everything available and advance past it.
    ///
    /// Returns the number of bytes copied. If the writer lapped this reader
    /// the copy contains whatever the slots hold now; there is no gap marker.
    pub fn drain_into(&mut self, out: &mut Vec<u8>) -> usize {
        out.clear();
        let capacity = self.ring.capacity();
        let available = self.available();
        out.reserve(available);

        let mut pos = self.read_pos;
        for _ in 0..available {
            out.push(self.ring.slots[pos].load(Ordering::Relaxed));
            pos += 1;
            if pos == capacity {
                pos = 0;
            }
        }

        self.read_pos = pos;
        available
    }
}
