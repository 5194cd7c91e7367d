//! Line configuration and the frame geometry derived from it.

use crate::error::ConfigError;

/// Highest accepted baud rate. Keeps the bit period at a whole number of
/// nanoseconds with room for the busy-wait to keep up.
pub const MAX_BAUD: u32 = 1_000_000;

/// Baud rate a fresh session starts with.
pub const DEFAULT_BAUD: u32 = 9600;

/// Line time the transmitter may spend per tick before yielding.
pub const TICK_BUDGET_NS: u64 = 500_000;

const NANOS_PER_SEC: u64 = 1_000_000_000;

/// Platform identifier of a GPIO pin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PinId(pub u32);

impl From<u32> for PinId {
    fn from(n: u32) -> Self {
        PinId(n)
    }
}

/// User-facing line settings. Only changed while the session is stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineConfig {
    pub rx_pin: Option<PinId>,
    pub tx_pin: Option<PinId>,
    pub baud: u32,
    /// Append an even parity bit after the data bits.
    pub parity: bool,
    pub two_stop_bits: bool,
    /// Idle low instead of idle high; every level on the wire is flipped.
    pub inverting_logic: bool,
}

impl Default for LineConfig {
    fn default() -> Self {
        LineConfig {
            rx_pin: None,
            tx_pin: None,
            baud: DEFAULT_BAUD,
            parity: false,
            two_stop_bits: false,
            inverting_logic: false,
        }
    }
}

impl LineConfig {
    /// Check that the session could run with these settings.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.rx_pin.is_none() {
            return Err(ConfigError::RxPinUnset);
        }
        if self.tx_pin.is_none() {
            return Err(ConfigError::TxPinUnset);
        }
        check_baud(self.baud)
    }

    /// Frame geometry for the current settings. Pins are not consulted.
    pub fn frame_format(&self) -> FrameFormat {
        FrameFormat {
            bit_period_ns: NANOS_PER_SEC / u64::from(self.baud.max(1)),
            parity: self.parity,
            two_stop_bits: self.two_stop_bits,
            inverted: self.inverting_logic,
        }
    }
}

pub(crate) fn check_baud(baud: u32) -> Result<(), ConfigError> {
    if baud == 0 || baud > MAX_BAUD {
        Err(ConfigError::BaudOutOfRange(baud))
    } else {
        Ok(())
    }
}

/// Immutable snapshot of everything the encoder and decoder need to know
/// about a frame.
///
/// On the wire a frame is, oldest first:
///
/// ```text
/// idle(s) | start | d0 .. d7 | [parity] | stop(s)
/// ```
///
/// The receiver requires as many idle bits ahead of the start bit as
/// there are stop bits, since in a continuous stream those are the stop
/// bits of the previous frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameFormat {
    pub bit_period_ns: u64,
    pub parity: bool,
    pub two_stop_bits: bool,
    pub inverted: bool,
}

impl FrameFormat {
    #[inline]
    pub fn stop_bits(&self) -> u32 {
        if self.two_stop_bits {
            2
        } else {
            1
        }
    }

    #[inline]
    fn parity_bits(&self) -> u32 {
        self.parity as u32
    }

    /// Width of the receive bit window: leading idle, start, data,
    /// parity and trailing stop bits.
    #[inline]
    pub fn window_size(&self) -> u32 {
        self.stop_bits() + 1 + 8 + self.parity_bits() + self.stop_bits()
    }

    /// Bits one transmitted byte occupies on the line.
    #[inline]
    pub fn line_bits(&self) -> u32 {
        1 + 8 + self.parity_bits() + self.stop_bits()
    }

    /// Window value of a line that has been idle for a whole frame.
    #[inline]
    pub fn idle_window(&self) -> u32 {
        (1 << self.window_size()) - 1
    }

    /// Bytes the transmitter sends per tick. Always at least one.
    pub fn tick_budget(&self) -> usize {
        let bits_per_tick = TICK_BUDGET_NS / self.bit_period_ns;
        let bytes = bits_per_tick / u64::from(self.line_bits());
        (bytes as usize).max(1)
    }

    /// Map between logical and physical line level.
    #[inline]
    pub fn physical(&self, level: bool) -> bool {
        level ^ self.inverted
    }
}
