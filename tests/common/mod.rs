//! Simulated line for driving a session without hardware.
//!
//! The clock only moves when the transmitter waits for a deadline (it
//! jumps straight to it) or when a test advances it. The TX pin records
//! every level change with the simulated time, which is exactly the edge
//! stream an RX interrupt on the far end would see.

#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::convert::Infallible;
use std::rc::Rc;

use embedded_hal::digital::v2::OutputPin;
use gpio_uart::{Clock, DeadlineWait, EdgeEvent, FrameFormat, Instant, PinId, Session, TickTimer};

pub const TICK_NS: u64 = 1_000_000;

#[derive(Clone, Default)]
pub struct SimClock(Rc<Cell<u64>>);

impl SimClock {
    pub fn get(&self) -> u64 {
        self.0.get()
    }

    pub fn advance(&self, nanos: u64) {
        self.0.set(self.0.get() + nanos);
    }

    pub fn advance_to(&self, nanos: u64) {
        if nanos > self.0.get() {
            self.0.set(nanos);
        }
    }
}

impl Clock for SimClock {
    fn now(&self) -> Instant {
        Instant::from_nanos(self.0.get())
    }
}

pub struct SimWait(pub SimClock);

impl Clock for SimWait {
    fn now(&self) -> Instant {
        self.0.now()
    }
}

impl DeadlineWait for SimWait {
    fn wait_until(&mut self, deadline: Instant) {
        self.0.advance_to(deadline.as_nanos());
    }
}

/// TX pin that records level changes.
#[derive(Clone)]
pub struct ProbePin {
    clock: SimClock,
    level: Rc<Cell<bool>>,
    edges: Rc<RefCell<Vec<EdgeEvent>>>,
}

impl ProbePin {
    pub fn new(clock: SimClock) -> Self {
        ProbePin {
            clock,
            level: Rc::new(Cell::new(true)),
            edges: Rc::new(RefCell::new(Vec::new())),
        }
    }

    pub fn take_edges(&self) -> Vec<EdgeEvent> {
        self.edges.borrow_mut().drain(..).collect()
    }

    fn set(&mut self, level: bool) {
        if self.level.get() != level {
            self.level.set(level);
            self.edges
                .borrow_mut()
                .push(EdgeEvent::new(level, self.clock.now()));
        }
    }
}

impl OutputPin for ProbePin {
    type Error = Infallible;

    fn set_low(&mut self) -> Result<(), Infallible> {
        self.set(false);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Infallible> {
        self.set(true);
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct ManualTicker {
    pub armed: Rc<Cell<bool>>,
    pub arms: Rc<Cell<u32>>,
}

impl TickTimer for ManualTicker {
    fn arm(&mut self) {
        self.armed.set(true);
        self.arms.set(self.arms.get() + 1);
    }

    fn disarm(&mut self) {
        self.armed.set(false);
    }
}

pub type SimSession = Session<ProbePin, SimWait, ManualTicker>;

pub struct Rig {
    pub clock: SimClock,
    pub pin: ProbePin,
    pub ticker: ManualTicker,
    pub uart: SimSession,
}

impl Rig {
    pub fn new() -> Self {
        let clock = SimClock::default();
        clock.advance(1_000);
        let pin = ProbePin::new(clock.clone());
        let ticker = ManualTicker::default();
        let uart = Session::new(pin.clone(), SimWait(clock.clone()), ticker.clone());
        Rig {
            clock,
            pin,
            ticker,
            uart,
        }
    }

    /// Running session wired in loopback.
    pub fn started(baud: u32, parity: bool, two_stop_bits: bool, inverting: bool) -> Self {
        let rig = Rig::new();
        rig.uart.set_rx_pin(PinId(17)).unwrap();
        rig.uart.set_tx_pin(PinId(18)).unwrap();
        rig.uart.set_baud(baud).unwrap();
        rig.uart.set_parity_bit(parity).unwrap();
        rig.uart.set_second_stop_bit(two_stop_bits).unwrap();
        rig.uart.set_inverting_logic(inverting).unwrap();
        rig.uart.start().unwrap();
        rig.uart.feed(rig.pin.take_edges());
        rig
    }

    /// Fire one tick and deliver what it put on the line to the receiver.
    pub fn tick(&self) -> usize {
        let tick_start = self.clock.get();
        let sent = self.uart.on_tick().unwrap();
        self.uart.feed(self.pin.take_edges());
        self.clock.advance_to(tick_start + TICK_NS);
        sent
    }

    /// Tick until the transmit queue is empty, then let the line idle long
    /// enough for the last stop bit to be seen.
    pub fn drain(&self) {
        while self.uart.tx_pending() > 0 {
            self.tick();
        }
        let bit = self.uart.config().frame_format().bit_period_ns;
        self.clock.advance(3 * bit);
        self.uart.poll_rx(self.clock.now());
    }

    pub fn read_all(&self) -> Vec<u8> {
        let mut out = vec![0; self.uart.rx_pending()];
        let n = self.uart.read(&mut out);
        out.truncate(n);
        out
    }
}

/// Edges a transmitter would produce for `frames`, each `(byte,
/// flip_parity)`, starting from an idle line at `t0`. Returns the edges and
/// the time the line goes idle after the last frame.
pub fn line_trace(format: &FrameFormat, frames: &[(u8, bool)], t0: u64) -> (Vec<EdgeEvent>, u64) {
    let bit = format.bit_period_ns;
    let mut edges = Vec::new();
    let mut line = true;
    let mut t = t0;
    let mut set = |level: bool, t: u64, edges: &mut Vec<EdgeEvent>| {
        if level != line {
            edges.push(EdgeEvent::new(format.physical(level), Instant::from_nanos(t)));
            line = level;
        }
    };

    for &(byte, flip) in frames {
        t += bit * u64::from(format.stop_bits());
        set(false, t, &mut edges);
        for i in 0..8 {
            t += bit;
            set((byte >> i) & 1 == 1, t, &mut edges);
        }
        if format.parity {
            t += bit;
            set((byte.count_ones() % 2 == 1) ^ flip, t, &mut edges);
        }
        t += bit;
        set(true, t, &mut edges);
    }
    (edges, t)
}
