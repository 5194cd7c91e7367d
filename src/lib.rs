//! A [bit banging] UART over two GPIO pins, built on [`embedded-hal`].
//!
//! Unlike a blocking bitbang serial port, nothing here waits for a byte.
//! Receiving is driven by the platform's pin-change interrupt: every edge
//! on the receive pin goes to [`Session::on_edge`], which rebuilds the
//! sampled bit stream from edge timestamps and decodes frames into a
//! queue. Transmitting is driven by a periodic tick: [`Session::on_tick`]
//! takes a batch of queued bytes and clocks them out against absolute
//! deadlines. The application only touches two lock-free byte queues
//! through [`Session::read`] and [`Session::write`].
//!
//! Frames are 8 data bits, LSB first, with optional even parity, one or
//! two stop bits and optional inverted line levels.
//!
//! ## What the platform supplies
//!
//! - an [`OutputPin`](embedded_hal::digital::v2::OutputPin) for TX,
//! - a clock and precise wait ([`DeadlineWait`], e.g. [`BusyWait`]),
//! - a tick source ([`TickTimer`], e.g. [`CountDownTick`]),
//! - an edge interrupt on RX that reports `(level, timestamp)` pairs,
//!   for instance through an [`EdgeSampler`],
//! - an implementation of [`critical-section`] for masking interrupts
//!   while a frame is being sent.
//!
//! ## Usage examples
//!
//! See `demos/loopback.rs` in the crate sources for a host loopback
//! (`cargo run --example loopback`).
//!
//! [bit banging]: https://en.wikipedia.org/wiki/Bit_banging
//! [`embedded-hal`]: https://github.com/rust-embedded/embedded-hal
//! [`critical-section`]: https://github.com/rust-embedded/critical-section

#![cfg_attr(not(test), no_std)]

pub mod config;
pub mod error;
pub mod ring;
pub mod rx;
pub mod serial;
pub mod session;
pub mod stats;
pub mod time;
pub mod tx;

pub use config::{FrameFormat, LineConfig, PinId, MAX_BAUD};
pub use error::{ConfigError, Error, StateError};
pub use ring::RingBuffer;
pub use rx::{EdgeEvent, EdgeSampler, FramingError, RxDecoder};
pub use session::{RunState, Session};
pub use stats::{LineStats, StatsSnapshot};
pub use time::{BusyWait, Clock, CountDownTick, CountDownWait, DeadlineWait, Instant, TickTimer};
pub use tx::TxScheduler;
