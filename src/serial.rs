//! `embedded-hal` serial traits over a running [`Session`].
//!
//! The traits take `&mut self`, but a session is shared between contexts,
//! so they are implemented for `&Session`:
//!
//! ```ignore
//! use embedded_hal::serial::Write;
//!
//! let mut port = &uart;
//! for byte in b"Hello, World!\r\n" {
//!     block!(Write::write(&mut port, *byte)).ok();
//! }
//! block!(port.flush()).ok();
//! ```
//!
//! Neither direction can fail: reads report `WouldBlock` until a byte has
//! been decoded and writes are always queued.

use core::convert::Infallible;

use embedded_hal::digital::v2::OutputPin;
use embedded_hal::serial;

use crate::session::Session;
use crate::time::{DeadlineWait, TickTimer};

impl<'a, TX, W, T, E, const N: usize> serial::Read<u8> for &'a Session<TX, W, T, N>
where
    TX: OutputPin<Error = E>,
    W: DeadlineWait,
    T: TickTimer,
{
    type Error = Infallible;

    fn read(&mut self) -> nb::Result<u8, Self::Error> {
        self.pop_rx().ok_or(nb::Error::WouldBlock)
    }
}

impl<'a, TX, W, T, E, const N: usize> serial::Write<u8> for &'a Session<TX, W, T, N>
where
    TX: OutputPin<Error = E>,
    W: DeadlineWait,
    T: TickTimer,
{
    type Error = Infallible;

    fn write(&mut self, byte: u8) -> nb::Result<(), Self::Error> {
        self.queue_tx(byte);
        Ok(())
    }

    /// Ready once the transmit queue is empty. The final frame may still
    /// be on the line when this returns.
    fn flush(&mut self) -> nb::Result<(), Self::Error> {
        if self.tx_pending() == 0 {
            Ok(())
        } else {
            Err(nb::Error::WouldBlock)
        }
    }
}

impl<'a, TX, W, T, E, const N: usize> embedded_hal::blocking::serial::write::Default<u8>
    for &'a Session<TX, W, T, N>
where
    TX: OutputPin<Error = E>,
    W: DeadlineWait,
    T: TickTimer,
{
}
