//! fakes for driving the scheduler without hardware or real time
use chrono::{NaiveDate, NaiveDateTime};
use core::convert::Infallible;
use embedded_io_async::{ErrorKind, ErrorType, Write};
use embassy_time::{Duration, Instant};
use std::boxed::Box;
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::vec::Vec;

use crate::clock::Clock;
use crate::errors::{If482Error, If482Result};
use crate::pulse::{PulseSender, PulseSource};
use crate::telegram::SyncConfidence;
use crate::time_source::TimeSource;

pub fn datetime(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(y, mo, d)
        .and_then(|d| d.and_hms_opt(h, mi, s))
        .unwrap()
}

type SleepHook = Box<dyn FnMut(Instant)>;

/// Time only moves when a test (or a sleep/yield) moves it.
#[derive(Clone)]
pub struct FakeClock {
    now: Rc<Cell<Instant>>,
    /// each yield_now moves time forward this much
    yield_step: Rc<Cell<Duration>>,
    /// each sleep wakes up this much after its deadline
    oversleep: Rc<Cell<Duration>>,
    /// (called at, deadline)
    sleeps: Rc<RefCell<Vec<(Instant, Instant)>>>,
    on_wake: Rc<RefCell<Option<SleepHook>>>,
}

impl Default for FakeClock {
    fn default() -> Self {
        Self::starting_at(Instant::from_ticks(0))
    }
}

impl FakeClock {
    pub fn starting_at(now: Instant) -> Self {
        Self {
            now: Rc::new(Cell::new(now)),
            yield_step: Rc::new(Cell::new(Duration::from_millis(1))),
            oversleep: Rc::new(Cell::new(Duration::from_ticks(0))),
            sleeps: Rc::default(),
            on_wake: Rc::default(),
        }
    }

    pub fn advance(&self, d: Duration) {
        self.now.set(self.now.get() + d);
    }

    pub fn set_oversleep(&self, d: Duration) {
        self.oversleep.set(d);
    }

    /// run something at the moment a sleep finishes, before the sleeper sees the new time
    pub fn on_wake(&self, hook: impl FnMut(Instant) + 'static) {
        *self.on_wake.borrow_mut() = Some(Box::new(hook));
    }

    pub fn sleeps(&self) -> Vec<(Instant, Instant)> {
        self.sleeps.borrow().clone()
    }
}

impl Clock for FakeClock {
    fn now(&self) -> Instant {
        self.now.get()
    }

    async fn sleep_until(&self, deadline: Instant) {
        let now = self.now.get();

        self.sleeps.borrow_mut().push((now, deadline));

        let woke = now.max(deadline) + self.oversleep.get();
        self.now.set(woke);

        if let Some(hook) = self.on_wake.borrow_mut().as_mut() {
            hook(woke);
        }
    }

    async fn yield_now(&self) {
        self.advance(self.yield_step.get());
    }
}

/// a clock that never moves on. phase locking against this can't succeed
pub struct FrozenTime(pub NaiveDateTime);

impl TimeSource for FrozenTime {
    fn now(&self) -> NaiveDateTime {
        self.0
    }

    fn confidence(&self) -> SyncConfidence {
        SyncConfidence::Synced
    }
}

#[derive(Clone, Default)]
pub struct FakePulse {
    pub fail_with: Option<If482Error>,
    configured: Rc<Cell<bool>>,
    armed: Rc<Cell<bool>>,
}

impl FakePulse {
    pub fn failing(err: If482Error) -> Self {
        Self {
            fail_with: Some(err),
            ..Default::default()
        }
    }

    pub fn configured(&self) -> bool {
        self.configured.get()
    }

    pub fn armed(&self) -> bool {
        self.armed.get()
    }
}

impl<'a> PulseSource<'a> for FakePulse {
    fn configure(&mut self) -> If482Result<()> {
        if let Some(err) = self.fail_with {
            return Err(err);
        }
        self.configured.set(true);
        Ok(())
    }

    fn arm(&mut self, _edges: PulseSender<'a>) {
        self.armed.set(true);
    }
}

/// records every write together with the tick it happened at
#[derive(Clone, Default)]
pub struct FakeSink {
    clock: FakeClock,
    writes: Rc<RefCell<Vec<(Instant, Vec<u8>)>>>,
    fail: Rc<Cell<bool>>,
}

impl FakeSink {
    pub fn new(clock: FakeClock) -> Self {
        Self {
            clock,
            ..Default::default()
        }
    }

    pub fn set_fail(&self, fail: bool) {
        self.fail.set(fail);
    }

    pub fn writes(&self) -> Vec<(Instant, Vec<u8>)> {
        self.writes.borrow().clone()
    }
}

impl ErrorType for FakeSink {
    type Error = ErrorKind;
}

impl Write for FakeSink {
    async fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        if self.fail.get() {
            return Err(ErrorKind::BrokenPipe);
        }

        self.writes.borrow_mut().push((self.clock.now(), buf.to_vec()));

        Ok(buf.len())
    }

    async fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

/// a sink that can't fail, for when nobody looks at the output
pub struct NullSink;

impl ErrorType for NullSink {
    type Error = Infallible;
}

impl Write for NullSink {
    async fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        Ok(buf.len())
    }
}
