//! Edge-driven receiver.
//!
//! The receive pin only reports level *changes*. Between two edges the
//! line held the previous level, so the decoder works out how many bit
//! periods passed and replays that level once per period into a bit
//! window, exactly as a sampling receiver would have seen it. After every
//! replayed bit the window is checked for a complete frame.

use embedded_hal::digital::v2::InputPin;

use crate::config::FrameFormat;
use crate::time::{Clock, Instant};

/// One observation from the receive pin: the physical level after an edge
/// and when it was seen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EdgeEvent {
    pub level: bool,
    pub timestamp: Instant,
}

impl EdgeEvent {
    pub const fn new(level: bool, timestamp: Instant) -> Self {
        EdgeEvent { level, timestamp }
    }
}

/// Why a candidate frame was thrown away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramingError {
    /// Start and stop bits lined up but the parity bit did not match.
    Parity,
}

/// Frame recogniser fed by line edges.
#[derive(Debug, Clone)]
pub struct RxDecoder {
    format: FrameFormat,
    /// Most recent `window_size` sampled levels, newest in the top bit.
    window: u32,
    /// Logical level the line has held since `last_seen`.
    level: bool,
    last_seen: Option<Instant>,
    /// Shifts left before the window is looked at again after a parity
    /// rejection.
    holdoff: u32,
}

impl RxDecoder {
    pub fn new(format: FrameFormat) -> Self {
        RxDecoder {
            format,
            window: format.idle_window(),
            level: true,
            last_seen: None,
            holdoff: 0,
        }
    }

    /// Forget all line history and adopt `format`.
    pub fn reset(&mut self, format: FrameFormat) {
        *self = RxDecoder::new(format);
    }

    pub fn format(&self) -> &FrameFormat {
        &self.format
    }

    /// Raw window contents, oldest bit in bit 0.
    pub fn window(&self) -> u32 {
        self.window
    }

    /// Handle one edge. Every completed or rejected frame is passed to
    /// `emit` in line order.
    pub fn on_edge<F>(&mut self, event: EdgeEvent, mut emit: F)
    where
        F: FnMut(Result<u8, FramingError>),
    {
        if let Some(last) = self.last_seen {
            // Round to the nearest period: 0.5 -> 1, 1.5 -> 2.
            let half = self.format.bit_period_ns / 2;
            let periods = (event.timestamp.nanos_since(last) + half) / self.format.bit_period_ns;
            self.replay(periods, &mut emit);
        }

        self.level = self.format.physical(event.level);
        self.last_seen = Some(event.timestamp);
    }

    /// Account for time passing without an edge.
    ///
    /// Replays only whole bit periods and carries the remainder forward, so
    /// calling this often does not change what later edges decode to.
    pub fn sync<F>(&mut self, now: Instant, mut emit: F)
    where
        F: FnMut(Result<u8, FramingError>),
    {
        let last = match self.last_seen {
            Some(last) => last,
            None => {
                self.last_seen = Some(now);
                return;
            }
        };

        let periods = now.nanos_since(last) / self.format.bit_period_ns;
        self.replay(periods, &mut emit);
        self.last_seen = Some(last + periods * self.format.bit_period_ns);
    }

    fn replay<F>(&mut self, periods: u64, emit: &mut F)
    where
        F: FnMut(Result<u8, FramingError>),
    {
        // More than a window's worth of one level looks the same as a
        // window's worth.
        let periods = periods.min(u64::from(self.format.window_size()));
        for _ in 0..periods {
            self.shift_in(self.level);
            if self.holdoff > 0 {
                self.holdoff -= 1;
                continue;
            }
            if let Some(frame) = self.extract() {
                emit(frame);
            }
        }
    }

    #[inline]
    fn shift_in(&mut self, level: bool) {
        self.window >>= 1;
        if level {
            self.window |= 1 << (self.format.window_size() - 1);
        }
    }

    /// Look for a frame in the window.
    fn extract(&mut self) -> Option<Result<u8, FramingError>> {
        let size = self.format.window_size();
        let lead = self.format.stop_bits();

        // Leading idle bits at the bottom, trailing stop bits at the top.
        let stop_mask = if self.format.two_stop_bits {
            0b11 | (0b11 << (size - 2))
        } else {
            0b1 | (1 << (size - 1))
        };
        let start_bit = 1 << lead;

        if self.window & (stop_mask | start_bit) != stop_mask {
            return None;
        }

        let data = (self.window >> (lead + 1)) as u8;

        if self.format.parity {
            let parity_bit = self.window & (1 << (lead + 9)) != 0;
            if parity_bit != odd_ones(data) {
                // The window still holds the rejected bits. The next real
                // stop bit is a full frame away, so nothing can complete
                // before then.
                self.holdoff = self.format.line_bits() - 1;
                return Some(Err(FramingError::Parity));
            }
        }

        self.window = self.format.idle_window();
        Some(Ok(data))
    }
}

/// Even parity bit for `data`: set when it has an odd number of ones.
#[inline]
pub(crate) fn odd_ones(data: u8) -> bool {
    data.count_ones() & 1 == 1
}

/// Reads the receive pin and clock together when the platform's edge
/// interrupt fires.
pub struct EdgeSampler<RX, C> {
    rx: RX,
    clock: C,
}

impl<RX, C, E> EdgeSampler<RX, C>
where
    RX: InputPin<Error = E>,
    C: Clock,
{
    pub fn new(rx: RX, clock: C) -> Self {
        EdgeSampler { rx, clock }
    }

    pub fn sample(&mut self) -> Result<EdgeEvent, E> {
        let timestamp = self.clock.now();
        let level = self.rx.is_high()?;
        Ok(EdgeEvent { level, timestamp })
    }

    pub fn free(self) -> (RX, C) {
        (self.rx, self.clock)
    }
}
