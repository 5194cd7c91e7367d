//! Loopback on the host: the TX pin is wired straight back to RX.
//!
//! The "edge interrupt" is a list the TX pin appends to, and the tick is
//! polled from the main loop instead of firing from a timer.
//!
//! ```text
//! cargo run --example loopback
//! ```

use std::cell::{Cell, RefCell};
use std::convert::Infallible;
use std::rc::Rc;
use std::time::Duration;

use embedded_hal::digital::v2::OutputPin;
use gpio_uart::{BusyWait, Clock, EdgeEvent, Error, Instant, PinId, Session, TickTimer};

#[derive(Clone, Copy)]
struct HostClock(std::time::Instant);

impl Clock for HostClock {
    fn now(&self) -> Instant {
        Instant::from_nanos(self.0.elapsed().as_nanos() as u64)
    }
}

struct WirePin {
    clock: HostClock,
    level: bool,
    edges: Rc<RefCell<Vec<EdgeEvent>>>,
}

impl WirePin {
    fn set(&mut self, level: bool) {
        if level != self.level {
            self.level = level;
            self.edges
                .borrow_mut()
                .push(EdgeEvent::new(level, self.clock.now()));
        }
    }
}

impl OutputPin for WirePin {
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
struct PolledTick(Rc<Cell<bool>>);

impl TickTimer for PolledTick {
    fn arm(&mut self) {
        self.0.set(true);
    }

    fn disarm(&mut self) {
        self.0.set(false);
    }
}

fn main() -> Result<(), Error<Infallible>> {
    let clock = HostClock(std::time::Instant::now());
    let edges = Rc::new(RefCell::new(Vec::new()));
    let tick = PolledTick::default();

    let tx = WirePin {
        clock,
        level: true,
        edges: edges.clone(),
    };
    let uart: Session<_, _, _> = Session::new(tx, BusyWait::new(clock), tick.clone());
    uart.set_rx_pin(PinId(4))?;
    uart.set_tx_pin(PinId(5))?;
    uart.set_parity_bit(true)?;
    uart.start()?;

    uart.write(b"Hello, World!\r\n");
    while uart.tx_pending() > 0 {
        if tick.0.replace(false) {
            uart.on_tick()?;
        }
        let seen: Vec<EdgeEvent> = edges.borrow_mut().drain(..).collect();
        uart.feed(seen);
    }

    // Let the last stop bit go by.
    std::thread::sleep(Duration::from_millis(1));
    uart.poll_rx(clock.now());

    let mut buf = [0u8; 64];
    let n = uart.read(&mut buf);
    print!("{}", String::from_utf8_lossy(&buf[..n]));
    println!("{:?}", uart.stats());

    let _ = uart.release();
    Ok(())
}
