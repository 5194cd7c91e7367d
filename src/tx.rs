//! Tick-driven transmitter.
//!
//! The periodic tick is much coarser than a bit, so each tick sends a
//! batch of bytes back to back. Every level change is scheduled against
//! an absolute deadline (`previous deadline + hold`), never against
//! `now`, so late wake-ups do not stretch the rest of the frame.

use embedded_hal::digital::v2::OutputPin;

use crate::config::FrameFormat;
use crate::ring::RingBuffer;
use crate::rx::odd_ones;
use crate::time::{DeadlineWait, Instant};
use crate::Error;

pub struct TxScheduler<TX, W> {
    tx: TX,
    wait: W,
}

impl<TX, W, E> TxScheduler<TX, W>
where
    TX: OutputPin<Error = E>,
    W: DeadlineWait,
{
    pub fn new(tx: TX, wait: W) -> Self {
        TxScheduler { tx, wait }
    }

    pub fn free(self) -> (TX, W) {
        (self.tx, self.wait)
    }

    pub fn now(&self) -> Instant {
        self.wait.now()
    }

    /// Put the line in its resting (stop) state.
    pub fn idle(&mut self, format: &FrameFormat) -> Result<(), Error<E>> {
        self.set_level(format, true)
    }

    /// Send up to one tick's budget of bytes from `queue`.
    ///
    /// Returns the number of bytes put on the line. An empty queue ends
    /// the batch early.
    pub fn tick<const N: usize>(
        &mut self,
        format: &FrameFormat,
        queue: &RingBuffer<N>,
    ) -> Result<usize, Error<E>> {
        let budget = format.tick_budget();
        let mut deadline = self.wait.now();
        let mut sent = 0;

        while sent < budget {
            let byte = match queue.pop() {
                Some(byte) => byte,
                None => break,
            };

            // Interrupts stay masked for the whole frame to bound jitter.
            critical_section::with(|_| self.send_frame(format, byte, &mut deadline))?;
            sent += 1;
        }

        Ok(sent)
    }

    fn send_frame(
        &mut self,
        format: &FrameFormat,
        byte: u8,
        deadline: &mut Instant,
    ) -> Result<(), Error<E>> {
        let bit = format.bit_period_ns;

        // The line is already high: keep it there for the stop bits
        // the receiver needs ahead of a start bit, then start.
        self.hold_then_set(format, deadline, bit * u64::from(format.stop_bits()), false)?;

        // LSB first
        let mut bits = byte;
        for _ in 0..8 {
            self.hold_then_set(format, deadline, bit, bits & 1 == 1)?;
            bits >>= 1;
        }

        if format.parity {
            self.hold_then_set(format, deadline, bit, odd_ones(byte))?;
        }

        // Stop bit. Not waited out here; the next frame's lead-in or the
        // idle gap until the next tick covers it.
        self.hold_then_set(format, deadline, bit, true)
    }

    #[inline]
    fn hold_then_set(
        &mut self,
        format: &FrameFormat,
        deadline: &mut Instant,
        hold_ns: u64,
        level: bool,
    ) -> Result<(), Error<E>> {
        *deadline = *deadline + hold_ns;
        self.wait.wait_until(*deadline);
        self.set_level(format, level)
    }

    #[inline]
    fn set_level(&mut self, format: &FrameFormat, level: bool) -> Result<(), Error<E>> {
        if format.physical(level) {
            self.tx.set_high().map_err(Error::Bus)
        } else {
            self.tx.set_low().map_err(Error::Bus)
        }
    }
}
