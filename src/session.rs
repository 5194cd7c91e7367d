//! One software UART: configuration, queues and the run lifecycle.
//!
//! A session is shared by three contexts at once, so every operation
//! takes `&self`:
//!
//! - the platform's edge interrupt calls [`Session::on_edge`] (receive
//!   queue producer),
//! - the platform's tick callback calls [`Session::on_tick`] (transmit
//!   queue consumer, drives the line),
//! - the application calls [`Session::read`] and [`Session::write`]
//!   (receive consumer, transmit producer) and the control methods.
//!
//! State touched from interrupt context (the running frame format, the
//! decoder and the tick timer) lives in `critical_section::Mutex`es and is
//! only borrowed with interrupts masked. The `spin` locks on the
//! configuration and the scheduler are never taken by an interrupt
//! handler while the other side can hold them: `on_tick` only locks the
//! scheduler while running, and `start` only locks it while stopped.
//! `start` and `stop` must not race each other.

use core::cell::{Cell, RefCell};

use critical_section::Mutex as IrqMutex;
use embedded_hal::digital::v2::OutputPin;
use spin::Mutex;

use crate::config::{check_baud, FrameFormat, LineConfig, PinId};
use crate::error::{Error, StateError};
use crate::ring::{RingBuffer, DEFAULT_CAPACITY};
use crate::rx::{EdgeEvent, FramingError, RxDecoder};
use crate::stats::{LineStats, StatsSnapshot};
use crate::time::{DeadlineWait, Instant, TickTimer};
use crate::tx::TxScheduler;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Stopped,
    Running,
}

/// Software UART over one output pin and one edge-notified input pin.
///
/// `N` is the size of each byte queue; `N - 1` bytes fit.
pub struct Session<TX, W, T, const N: usize = DEFAULT_CAPACITY> {
    config: Mutex<LineConfig>,
    /// Format snapshot taken by `start`; `None` while stopped.
    active: IrqMutex<Cell<Option<FrameFormat>>>,
    rx_queue: RingBuffer<N>,
    tx_queue: RingBuffer<N>,
    decoder: IrqMutex<RefCell<RxDecoder>>,
    scheduler: Mutex<TxScheduler<TX, W>>,
    ticker: IrqMutex<RefCell<T>>,
    stats: LineStats,
}

impl<TX, W, T, E, const N: usize> Session<TX, W, T, N>
where
    TX: OutputPin<Error = E>,
    W: DeadlineWait,
    T: TickTimer,
{
    /// Open a session with the default configuration (9600 8N1, no pins).
    ///
    /// `tx` drives the transmit line, `wait` supplies the clock and the
    /// precise deadline wait, `ticker` schedules [`Session::on_tick`].
    pub fn new(tx: TX, wait: W, ticker: T) -> Self {
        let config = LineConfig::default();
        Session {
            decoder: IrqMutex::new(RefCell::new(RxDecoder::new(config.frame_format()))),
            config: Mutex::new(config),
            active: IrqMutex::new(Cell::new(None)),
            rx_queue: RingBuffer::new(),
            tx_queue: RingBuffer::new(),
            scheduler: Mutex::new(TxScheduler::new(tx, wait)),
            ticker: IrqMutex::new(RefCell::new(ticker)),
            stats: LineStats::new(),
        }
    }

    /// Close the session and hand the hardware back.
    pub fn release(self) -> (TX, W, T) {
        self.stop();
        let (tx, wait) = self.scheduler.into_inner().free();
        (tx, wait, self.ticker.into_inner().into_inner())
    }

    pub fn run_state(&self) -> RunState {
        if self.is_running() {
            RunState::Running
        } else {
            RunState::Stopped
        }
    }

    #[inline]
    pub fn is_running(&self) -> bool {
        self.active_format().is_some()
    }

    #[inline]
    fn active_format(&self) -> Option<FrameFormat> {
        critical_section::with(|cs| self.active.borrow(cs).get())
    }

    /// Copy of the current settings.
    pub fn config(&self) -> LineConfig {
        *self.config.lock()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    pub fn reset_stats(&self) {
        self.stats.reset();
    }

    fn reconfigure<F>(&self, f: F) -> Result<(), Error<E>>
    where
        F: FnOnce(&mut LineConfig),
    {
        let mut config = self.config.lock();
        if self.is_running() {
            return Err(StateError::Running.into());
        }
        f(&mut config);
        log::debug!("gpio uart reconfigured: {:?}", *config);
        Ok(())
    }

    pub fn baud(&self) -> u32 {
        self.config.lock().baud
    }

    pub fn set_baud(&self, baud: u32) -> Result<(), Error<E>> {
        if self.is_running() {
            return Err(StateError::Running.into());
        }
        check_baud(baud)?;
        self.reconfigure(|c| c.baud = baud)
    }

    pub fn rx_pin(&self) -> Option<PinId> {
        self.config.lock().rx_pin
    }

    pub fn set_rx_pin(&self, pin: PinId) -> Result<(), Error<E>> {
        self.reconfigure(|c| c.rx_pin = Some(pin))
    }

    pub fn tx_pin(&self) -> Option<PinId> {
        self.config.lock().tx_pin
    }

    pub fn set_tx_pin(&self, pin: PinId) -> Result<(), Error<E>> {
        self.reconfigure(|c| c.tx_pin = Some(pin))
    }

    pub fn inverting_logic(&self) -> bool {
        self.config.lock().inverting_logic
    }

    pub fn set_inverting_logic(&self, inverting: bool) -> Result<(), Error<E>> {
        self.reconfigure(|c| c.inverting_logic = inverting)
    }

    pub fn parity_bit(&self) -> bool {
        self.config.lock().parity
    }

    pub fn set_parity_bit(&self, parity: bool) -> Result<(), Error<E>> {
        self.reconfigure(|c| c.parity = parity)
    }

    pub fn second_stop_bit(&self) -> bool {
        self.config.lock().two_stop_bits
    }

    pub fn set_second_stop_bit(&self, two_stop_bits: bool) -> Result<(), Error<E>> {
        self.reconfigure(|c| c.two_stop_bits = two_stop_bits)
    }

    /// Validate the configuration and begin transmitting and receiving.
    ///
    /// The receive decoder starts from an idle line, the transmit pin is
    /// driven to idle and the tick timer is armed.
    pub fn start(&self) -> Result<(), Error<E>> {
        let config = self.config.lock();
        if self.is_running() {
            return Err(StateError::AlreadyRunning.into());
        }
        config.validate()?;
        let format = config.frame_format();

        critical_section::with(|cs| self.decoder.borrow_ref_mut(cs).reset(format));
        self.scheduler.lock().idle(&format)?;
        critical_section::with(|cs| {
            self.active.borrow(cs).set(Some(format));
            self.ticker.borrow_ref_mut(cs).arm();
        });

        log::info!(
            "gpio uart started: rx {:?} tx {:?} {} baud{}{}{}",
            config.rx_pin,
            config.tx_pin,
            config.baud,
            if config.parity { " even parity" } else { "" },
            if config.two_stop_bits { " 2 stop bits" } else { "" },
            if config.inverting_logic { " inverted" } else { "" },
        );
        Ok(())
    }

    /// Stop the tick. Does nothing if already stopped.
    ///
    /// Queued bytes are kept and go out after the next `start`.
    pub fn stop(&self) {
        let _config = self.config.lock();
        let was_running = critical_section::with(|cs| {
            let was_running = self.active.borrow(cs).take().is_some();
            if was_running {
                self.ticker.borrow_ref_mut(cs).disarm();
            }
            was_running
        });
        if was_running {
            log::info!("gpio uart stopped");
        }
    }

    /// Take up to `buf.len()` received bytes, oldest first. Never blocks.
    pub fn read(&self, buf: &mut [u8]) -> usize {
        let mut n = 0;
        for slot in buf.iter_mut() {
            match self.rx_queue.pop() {
                Some(byte) => {
                    *slot = byte;
                    n += 1;
                }
                None => break,
            }
        }
        n
    }

    /// Queue bytes for transmission. Never blocks and always accepts
    /// everything; if the queue is full the oldest unsent bytes are lost.
    pub fn write(&self, bytes: &[u8]) -> usize {
        for &byte in bytes {
            self.queue_tx(byte);
        }
        bytes.len()
    }

    #[inline]
    pub(crate) fn pop_rx(&self) -> Option<u8> {
        self.rx_queue.pop()
    }

    #[inline]
    pub(crate) fn queue_tx(&self, byte: u8) {
        if self.tx_queue.push(byte) {
            self.stats.tx_dropped();
            log::trace!("gpio uart tx queue full, oldest byte dropped");
        }
    }

    /// Bytes received and not yet read.
    pub fn rx_pending(&self) -> usize {
        self.rx_queue.len()
    }

    /// Bytes written and not yet sent.
    pub fn tx_pending(&self) -> usize {
        self.tx_queue.len()
    }

    fn deliver(&self, frame: Result<u8, FramingError>) {
        match frame {
            Ok(byte) => {
                self.stats.rx_frame();
                if self.rx_queue.push(byte) {
                    self.stats.rx_dropped();
                    log::trace!("gpio uart rx queue full, oldest byte dropped");
                }
            }
            Err(FramingError::Parity) => {
                self.stats.parity_error();
                log::trace!("gpio uart parity mismatch, frame discarded");
            }
        }
    }

    /// Run `f` on the decoder with interrupts masked, unless stopped.
    fn with_decoder<F>(&self, f: F)
    where
        F: FnOnce(&mut RxDecoder),
    {
        critical_section::with(|cs| {
            if self.active.borrow(cs).get().is_some() {
                f(&mut *self.decoder.borrow_ref_mut(cs));
            }
        });
    }

    /// Receive-pin edge handler. Ignored while stopped.
    pub fn on_edge(&self, event: EdgeEvent) {
        self.with_decoder(|decoder| decoder.on_edge(event, |frame| self.deliver(frame)));
    }

    /// Feed a batch of edges in order, as from a captured trace or a
    /// queue filled by the platform's interrupt handler.
    pub fn feed<I>(&self, events: I)
    where
        I: IntoIterator<Item = EdgeEvent>,
    {
        for event in events {
            self.on_edge(event);
        }
    }

    /// Bring the decoder up to `now` when no edge has arrived for a while.
    ///
    /// Without this the last byte of a burst is only decoded once the next
    /// edge arrives. `now` must come from the same clock as the edge
    /// timestamps.
    pub fn poll_rx(&self, now: Instant) {
        self.with_decoder(|decoder| decoder.sync(now, |frame| self.deliver(frame)));
    }

    /// Tick handler: send one batch of queued bytes and re-arm the tick.
    ///
    /// Returns the number of bytes sent. Does nothing while stopped.
    pub fn on_tick(&self) -> Result<usize, Error<E>> {
        let format = match self.active_format() {
            Some(format) => format,
            None => return Ok(0),
        };

        let sent = self.scheduler.lock().tick(&format, &self.tx_queue);
        match sent {
            Ok(n) => self.stats.tx_frames(n as u32),
            Err(_) => log::warn!("gpio uart tx pin error, batch abandoned"),
        }

        // Checked together with the re-arm so a concurrent stop() wins.
        critical_section::with(|cs| {
            if self.active.borrow(cs).get().is_some() {
                self.ticker.borrow_ref_mut(cs).arm();
            }
        });
        sent
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MAX_BAUD;
    use crate::error::ConfigError;
    use crate::time::Clock;
    use core::cell::Cell;
    use core::convert::Infallible;

    #[derive(Default)]
    struct NullPin;

    impl OutputPin for NullPin {
        type Error = Infallible;

        fn set_low(&mut self) -> Result<(), Infallible> {
            Ok(())
        }

        fn set_high(&mut self) -> Result<(), Infallible> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct FrozenClock;

    impl Clock for FrozenClock {
        fn now(&self) -> Instant {
            Instant::from_nanos(0)
        }
    }

    impl DeadlineWait for FrozenClock {
        fn wait_until(&mut self, _deadline: Instant) {}
    }

    #[derive(Default)]
    struct CountingTicker {
        armed: Cell<u32>,
        disarmed: Cell<u32>,
    }

    impl TickTimer for &CountingTicker {
        fn arm(&mut self) {
            self.armed.set(self.armed.get() + 1);
        }

        fn disarm(&mut self) {
            self.disarmed.set(self.disarmed.get() + 1);
        }
    }

    fn session(ticker: &CountingTicker) -> Session<NullPin, FrozenClock, &CountingTicker, 16> {
        Session::new(NullPin, FrozenClock, ticker)
    }

    #[test]
    fn test_start_requires_both_pins() {
        let ticker = CountingTicker::default();
        let uart = session(&ticker);

        assert_eq!(uart.start(), Err(Error::Configuration(ConfigError::RxPinUnset)));
        uart.set_rx_pin(PinId(3)).unwrap();
        assert_eq!(uart.start(), Err(Error::Configuration(ConfigError::TxPinUnset)));
        uart.set_tx_pin(PinId(4)).unwrap();
        assert_eq!(uart.start(), Ok(()));
        assert_eq!(uart.run_state(), RunState::Running);
        assert_eq!(ticker.armed.get(), 1);
    }

    #[test]
    fn test_setters_rejected_while_running() {
        let ticker = CountingTicker::default();
        let uart = session(&ticker);
        uart.set_rx_pin(PinId(3)).unwrap();
        uart.set_tx_pin(PinId(4)).unwrap();
        uart.start().unwrap();

        let busy = Err(Error::State(StateError::Running));
        assert_eq!(uart.set_baud(115_200), busy);
        assert_eq!(uart.set_rx_pin(PinId(7)), busy);
        assert_eq!(uart.set_tx_pin(PinId(8)), busy);
        assert_eq!(uart.set_parity_bit(true), busy);
        assert_eq!(uart.set_second_stop_bit(true), busy);
        assert_eq!(uart.set_inverting_logic(true), busy);
        assert_eq!(uart.config(), LineConfig {
            rx_pin: Some(PinId(3)),
            tx_pin: Some(PinId(4)),
            ..LineConfig::default()
        });

        assert_eq!(uart.start(), Err(Error::State(StateError::AlreadyRunning)));
    }

    #[test]
    fn test_stop_is_idempotent() {
        let ticker = CountingTicker::default();
        let uart = session(&ticker);
        uart.stop();
        assert_eq!(ticker.disarmed.get(), 0);

        uart.set_rx_pin(PinId(1)).unwrap();
        uart.set_tx_pin(PinId(2)).unwrap();
        uart.start().unwrap();
        uart.stop();
        uart.stop();
        assert_eq!(ticker.disarmed.get(), 1);
        assert_eq!(uart.run_state(), RunState::Stopped);

        uart.set_baud(300).unwrap();
        assert_eq!(uart.baud(), 300);
    }

    #[test]
    fn test_bad_baud_rejected_while_stopped() {
        let ticker = CountingTicker::default();
        let uart = session(&ticker);
        assert_eq!(
            uart.set_baud(0),
            Err(Error::Configuration(ConfigError::BaudOutOfRange(0)))
        );
        assert_eq!(uart.baud(), 9600);
    }

    #[test]
    fn test_tick_ignored_while_stopped() {
        let ticker = CountingTicker::default();
        let uart = session(&ticker);
        uart.write(b"abc");
        assert_eq!(uart.on_tick(), Ok(0));
        assert_eq!(uart.tx_pending(), 3);
        assert_eq!(ticker.armed.get(), 0);
    }

    #[test]
    fn test_tick_rearms_timer() {
        let ticker = CountingTicker::default();
        let uart = session(&ticker);
        uart.set_rx_pin(PinId(1)).unwrap();
        uart.set_tx_pin(PinId(2)).unwrap();
        uart.start().unwrap();

        assert_eq!(uart.on_tick(), Ok(0));
        assert_eq!(uart.on_tick(), Ok(0));
        assert_eq!(ticker.armed.get(), 3);
    }

    #[test]
    fn test_write_overflow_keeps_newest() {
        let ticker = CountingTicker::default();
        let uart = session(&ticker);
        let data: [u8; 20] = core::array::from_fn(|i| i as u8);
        assert_eq!(uart.write(&data), 20);
        assert_eq!(uart.tx_pending(), 15);
        assert_eq!(uart.stats().tx_dropped, 5);
    }

    #[test]
    fn test_set_baud_while_running_is_state_error() {
        let ticker = CountingTicker::default();
        let uart = session(&ticker);
        uart.set_rx_pin(PinId(1)).unwrap();
        uart.set_tx_pin(PinId(2)).unwrap();
        uart.start().unwrap();

        // Run state wins over range checking.
        assert_eq!(uart.set_baud(0), Err(Error::State(StateError::Running)));
        assert_eq!(
            uart.set_baud(MAX_BAUD + 1),
            Err(Error::State(StateError::Running))
        );
    }

    #[test]
    fn test_tick_runs_while_config_locked() {
        let ticker = CountingTicker::default();
        let uart = session(&ticker);
        uart.set_rx_pin(PinId(1)).unwrap();
        uart.set_tx_pin(PinId(2)).unwrap();
        uart.start().unwrap();
        uart.write(b"xy");

        // A getter interrupted by the tick.
        let _config = uart.config.lock();
        assert_eq!(uart.on_tick(), Ok(1));
        assert_eq!(ticker.armed.get(), 2);
    }

    #[test]
    fn test_edges_run_while_scheduler_locked() {
        let ticker = CountingTicker::default();
        let uart = session(&ticker);
        uart.set_rx_pin(PinId(1)).unwrap();
        uart.set_tx_pin(PinId(2)).unwrap();
        uart.start().unwrap();

        // An edge interrupt landing between two frames of a batch.
        let _scheduler = uart.scheduler.lock();
        uart.on_edge(EdgeEvent::new(false, Instant::from_nanos(1_000)));
        uart.poll_rx(Instant::from_nanos(2_000_000));
        assert_eq!(uart.stats().parity_errors, 0);
    }

    #[test]
    fn test_reset_stats() {
        let ticker = CountingTicker::default();
        let uart = session(&ticker);
        uart.write(&[0; 20]);
        assert_eq!(uart.stats().tx_dropped, 5);

        uart.reset_stats();
        assert_eq!(uart.stats(), StatsSnapshot::default());
    }

    #[test]
    fn test_release_stops() {
        let ticker = CountingTicker::default();
        let uart = session(&ticker);
        uart.set_rx_pin(PinId(1)).unwrap();
        uart.set_tx_pin(PinId(2)).unwrap();
        uart.start().unwrap();
        let (_pin, _wait, _ticker) = uart.release();
        assert_eq!(ticker.disarmed.get(), 1);
    }
}
