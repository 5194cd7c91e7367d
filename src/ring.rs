//! Fixed-capacity byte queue shared between one producer and one consumer.
//!
//! The queue never blocks and never refuses a byte: when it is full the
//! oldest unread byte is discarded to make room. One slot is always kept
//! free so that `start == tail` unambiguously means empty, which leaves
//! `N - 1` usable bytes.
//!
//! # Contract
//!
//! Exactly one context may call [`RingBuffer::push`] and exactly one
//! context may call [`RingBuffer::pop`] at any time. The two may run
//! concurrently (an edge interrupt pushing while the caller pops, or the
//! caller pushing while the tick pops). Two concurrent producers, or two
//! concurrent consumers, are not supported and must be serialised by the
//! caller.

use core::sync::atomic::{AtomicU8, AtomicUsize, Ordering};

/// Default queue size, matching one page of serial traffic.
pub const DEFAULT_CAPACITY: usize = 4096;

#[allow(clippy::declare_interior_mutable_const)]
const EMPTY_SLOT: AtomicU8 = AtomicU8::new(0);

/// Overwrite-oldest circular byte queue.
pub struct RingBuffer<const N: usize = DEFAULT_CAPACITY> {
    slots: [AtomicU8; N],
    /// Index of the oldest unread byte. Moved by `pop`, and by `push`
    /// when it has to drop a byte.
    start: AtomicUsize,
    /// Index one past the newest byte. Only moved by `push`.
    tail: AtomicUsize,
}

impl<const N: usize> RingBuffer<N> {
    /// Create an empty queue.
    ///
    /// # Panics
    ///
    /// Panics at compile time (in const contexts) if `N < 2`.
    pub const fn new() -> Self {
        assert!(N >= 2, "ring buffer needs at least two slots");

        RingBuffer {
            slots: [EMPTY_SLOT; N],
            start: AtomicUsize::new(0),
            tail: AtomicUsize::new(0),
        }
    }

    #[inline]
    const fn next(index: usize) -> usize {
        (index + 1) % N
    }

    /// Append a byte. Producer side only.
    ///
    /// Returns `true` if the queue was full and an unread byte was
    /// discarded to make room.
    pub fn push(&self, value: u8) -> bool {
        let tail = self.tail.load(Ordering::Relaxed);
        let next_tail = Self::next(tail);

        // The slot at `tail` is never live, full or not.
        self.slots[tail].store(value, Ordering::Relaxed);

        let mut dropped = false;
        if self.start.load(Ordering::Acquire) == next_tail {
            // Full: push `start` past the oldest byte. If a pop got there
            // first the CAS fails and the queue simply was not full.
            dropped = self
                .start
                .compare_exchange(
                    next_tail,
                    Self::next(next_tail),
                    Ordering::AcqRel,
                    Ordering::Acquire,
                )
                .is_ok();
        }

        // Publish the byte only after `start` moved, so the queue never
        // looks empty in between.
        self.tail.store(next_tail, Ordering::Release);
        dropped
    }

    /// Remove the oldest byte. Consumer side only.
    pub fn pop(&self) -> Option<u8> {
        loop {
            let start = self.start.load(Ordering::Acquire);
            if start == self.tail.load(Ordering::Acquire) {
                return None;
            }

            let value = self.slots[start].load(Ordering::Relaxed);

            // A failed CAS means the producer dropped this byte while we
            // were reading it; try again from the new start.
            if self
                .start
                .compare_exchange(start, Self::next(start), Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return Some(value);
            }
        }
    }

    /// Discard everything currently queued. Consumer side only.
    pub fn clear(&self) {
        while self.pop().is_some() {}
    }

    /// Number of unread bytes. A snapshot; may be stale immediately.
    pub fn len(&self) -> usize {
        let start = self.start.load(Ordering::Acquire);
        let tail = self.tail.load(Ordering::Acquire);
        (tail + N - start) % N
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.start.load(Ordering::Acquire) == self.tail.load(Ordering::Acquire)
    }

    /// Maximum number of bytes the queue retains (`N - 1`).
    #[inline]
    pub const fn capacity(&self) -> usize {
        N - 1
    }
}

impl<const N: usize> Default for RingBuffer<N> {
    fn default() -> Self {
        Self::new()
    }
}
