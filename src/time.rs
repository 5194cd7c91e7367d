//! Clock, precise waiting and tick scheduling primitives.
//!
//! The transmitter needs sub-bit-period precision, which ordinary
//! scheduling cannot give, so waiting is done against absolute deadlines
//! through [`DeadlineWait`]. [`BusyWait`] polls the clock; platforms with
//! a free-running hardware timer can use [`CountDownWait`] or their own
//! implementation instead.

use core::ops::Add;
use core::time::Duration;

use embedded_hal::timer::{Cancel, CountDown, Periodic};
use nb::block;

/// Point on a monotonic clock, in nanoseconds since an arbitrary epoch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Instant(u64);

impl Instant {
    pub const fn from_nanos(nanos: u64) -> Self {
        Instant(nanos)
    }

    pub const fn as_nanos(self) -> u64 {
        self.0
    }

    /// Nanoseconds since `earlier`, or zero if `earlier` is in the future.
    #[inline]
    pub fn nanos_since(self, earlier: Instant) -> u64 {
        self.0.saturating_sub(earlier.0)
    }

    #[inline]
    pub fn saturating_duration_since(self, earlier: Instant) -> Duration {
        Duration::from_nanos(self.nanos_since(earlier))
    }
}

impl Add<u64> for Instant {
    type Output = Instant;

    fn add(self, nanos: u64) -> Instant {
        Instant(self.0 + nanos)
    }
}

impl Add<Duration> for Instant {
    type Output = Instant;

    fn add(self, d: Duration) -> Instant {
        Instant(self.0 + d.as_nanos() as u64)
    }
}

/// Monotonic time source.
pub trait Clock {
    fn now(&self) -> Instant;
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now(&self) -> Instant {
        (**self).now()
    }
}

/// Wait until an absolute deadline has passed.
///
/// Implementations must not return before `deadline`. Returning late is
/// tolerated (the next deadline is still computed from this one, so the
/// error does not accumulate) but shows up as jitter on the line.
pub trait DeadlineWait: Clock {
    fn wait_until(&mut self, deadline: Instant);
}

/// Spin on the clock until the deadline passes.
pub struct BusyWait<C> {
    clock: C,
}

impl<C: Clock> BusyWait<C> {
    pub fn new(clock: C) -> Self {
        BusyWait { clock }
    }

    pub fn free(self) -> C {
        self.clock
    }
}

impl<C: Clock> Clock for BusyWait<C> {
    #[inline]
    fn now(&self) -> Instant {
        self.clock.now()
    }
}

impl<C: Clock> DeadlineWait for BusyWait<C> {
    fn wait_until(&mut self, deadline: Instant) {
        while self.clock.now() < deadline {
            core::hint::spin_loop();
        }
    }
}

/// Sleep out the remaining time on a one-shot `CountDown` timer.
pub struct CountDownWait<C, T> {
    clock: C,
    timer: T,
}

impl<C, T> CountDownWait<C, T>
where
    C: Clock,
    T: CountDown,
    T::Time: From<Duration>,
{
    pub fn new(clock: C, timer: T) -> Self {
        CountDownWait { clock, timer }
    }

    pub fn free(self) -> (C, T) {
        (self.clock, self.timer)
    }
}

impl<C, T> Clock for CountDownWait<C, T>
where
    C: Clock,
{
    #[inline]
    fn now(&self) -> Instant {
        self.clock.now()
    }
}

impl<C, T> DeadlineWait for CountDownWait<C, T>
where
    C: Clock,
    T: CountDown,
    T::Time: From<Duration>,
{
    fn wait_until(&mut self, deadline: Instant) {
        let now = self.clock.now();
        if now >= deadline {
            return;
        }
        self.timer.start(deadline.saturating_duration_since(now));
        match block!(self.timer.wait()) {
            Ok(()) => {}
            Err(never) => match never {},
        }
        // Timers may round down; finish the last few nanoseconds by polling.
        while self.clock.now() < deadline {
            core::hint::spin_loop();
        }
    }
}

/// Periodic callback source driving the transmitter.
///
/// `arm` schedules the next tick; the platform then calls
/// [`Session::on_tick`](crate::Session::on_tick) when it fires.
pub trait TickTimer {
    fn arm(&mut self);
    fn disarm(&mut self);
}

/// [`TickTimer`] backed by a periodic `CountDown` that can be cancelled.
pub struct CountDownTick<T> {
    timer: T,
    period: Duration,
}

impl<T> CountDownTick<T>
where
    T: CountDown + Periodic + Cancel,
    T::Time: From<Duration>,
{
    pub fn new(timer: T, period: Duration) -> Self {
        CountDownTick { timer, period }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn free(self) -> T {
        self.timer
    }
}

impl<T> TickTimer for CountDownTick<T>
where
    T: CountDown + Periodic + Cancel,
    T::Time: From<Duration>,
{
    fn arm(&mut self) {
        self.timer.start(self.period);
    }

    fn disarm(&mut self) {
        // Cancelling a timer that already stopped is not a problem here.
        self.timer.cancel().ok();
    }
}
