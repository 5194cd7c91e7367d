//! Line counters.
//!
//! Dropped bytes and rejected frames are expected on a noisy line and are
//! never reported as errors. These counters are the only place they show
//! up. Every field is a free-running `u32` that wraps.

use core::sync::atomic::{AtomicU32, Ordering};

/// Counters shared by the edge, tick and caller contexts.
pub struct LineStats {
    rx_frames: AtomicU32,
    parity_errors: AtomicU32,
    rx_dropped: AtomicU32,
    tx_frames: AtomicU32,
    tx_dropped: AtomicU32,
}

/// Point-in-time copy of [`LineStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Bytes decoded from the line.
    pub rx_frames: u32,
    /// Candidate frames rejected for bad parity.
    pub parity_errors: u32,
    /// Received bytes overwritten before the caller read them.
    pub rx_dropped: u32,
    /// Bytes put on the line.
    pub tx_frames: u32,
    /// Queued bytes overwritten before they were sent.
    pub tx_dropped: u32,
}

impl LineStats {
    pub const fn new() -> Self {
        LineStats {
            rx_frames: AtomicU32::new(0),
            parity_errors: AtomicU32::new(0),
            rx_dropped: AtomicU32::new(0),
            tx_frames: AtomicU32::new(0),
            tx_dropped: AtomicU32::new(0),
        }
    }

    #[inline]
    pub(crate) fn rx_frame(&self) {
        self.rx_frames.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn parity_error(&self) {
        self.parity_errors.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn rx_dropped(&self) {
        self.rx_dropped.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn tx_frames(&self, n: u32) {
        self.tx_frames.fetch_add(n, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn tx_dropped(&self) {
        self.tx_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            rx_frames: self.rx_frames.load(Ordering::Relaxed),
            parity_errors: self.parity_errors.load(Ordering::Relaxed),
            rx_dropped: self.rx_dropped.load(Ordering::Relaxed),
            tx_frames: self.tx_frames.load(Ordering::Relaxed),
            tx_dropped: self.tx_dropped.load(Ordering::Relaxed),
        }
    }

    /// Zero every counter.
    pub fn reset(&self) {
        self.rx_frames.store(0, Ordering::Relaxed);
        self.parity_errors.store(0, Ordering::Relaxed);
        self.rx_dropped.store(0, Ordering::Relaxed);
        self.tx_frames.store(0, Ordering::Relaxed);
        self.tx_dropped.store(0, Ordering::Relaxed);
    }
}

impl Default for LineStats {
    fn default() -> Self {
        Self::new()
    }
}
