use chrono::{NaiveDate, NaiveDateTime, TimeDelta};
use core::cell::Cell;
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_time::{Duration, Instant};

use crate::clock::Clock;
use crate::pulse::PULSE_PERIOD;
use crate::telegram::SyncConfidence;

/// Wall clock time and how much we trust it.
pub trait TimeSource {
    /// local time, already shifted into the receiver's time zone
    fn now(&self) -> NaiveDateTime;

    fn confidence(&self) -> SyncConfidence;
}

impl<T: TimeSource + ?Sized> TimeSource for &T {
    fn now(&self) -> NaiveDateTime {
        (**self).now()
    }

    fn confidence(&self) -> SyncConfidence {
        (**self).confidence()
    }
}

#[derive(Clone, Copy, Debug)]
struct SyncPoint {
    time: NaiveDateTime,
    at: Instant,
    last_attempt_failed: bool,
}

/// Keeps the last good wall clock time together with the tick it was taken at.
///
/// `now()` is that time plus however many ticks have passed since. Whoever talks to the gps/rtc/ntp
/// calls `set` on success and `sync_failed` on failure, possibly from another task.
pub struct SyncedClock<C> {
    clock: C,
    max_age: Duration,
    sync: Mutex<CriticalSectionRawMutex, Cell<Option<SyncPoint>>>,
}

impl<C: Clock> SyncedClock<C> {
    pub const fn new(clock: C, max_age: Duration) -> Self {
        Self {
            clock,
            max_age,
            sync: Mutex::new(Cell::new(None)),
        }
    }

    /// `time` was the wall clock time at tick `at`
    pub fn set(&self, time: NaiveDateTime, at: Instant) {
        self.sync.lock(|sync| {
            sync.set(Some(SyncPoint {
                time,
                at,
                last_attempt_failed: false,
            }))
        });
    }

    /// Sync from a clock that only has whole seconds and rolls over on the pulse edges.
    ///
    /// `before` and `after` are the last edge seen right before and right after reading `time`.
    /// The second that was read started at that edge, so that is the sync point. If the read
    /// straddled an edge, or the edge is more than a period old, nothing is set and this returns
    /// false. Read again after the next edge.
    pub fn set_on_edge(
        &self,
        time: NaiveDateTime,
        before: Option<Instant>,
        after: Option<Instant>,
    ) -> bool {
        let Some(edge) = before else {
            return false;
        };

        if after != Some(edge) {
            return false;
        }

        if self.clock.now().saturating_duration_since(edge) >= PULSE_PERIOD {
            return false;
        }

        self.set(time, edge);

        true
    }

    /// keep running on the old sync point, but stop claiming it is fresh
    pub fn sync_failed(&self) {
        self.sync.lock(|sync| {
            if let Some(mut point) = sync.get() {
                point.last_attempt_failed = true;
                sync.set(Some(point));
            }
        });
    }

    pub fn is_set(&self) -> bool {
        self.sync.lock(|sync| sync.get().is_some())
    }
}

/// where an unsynced clock counts from. the telegram hides it anyway
fn unsynced_epoch() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2000, 1, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .unwrap_or_default()
}

fn to_delta(d: Duration) -> TimeDelta {
    TimeDelta::microseconds(d.as_micros() as i64)
}

impl<C: Clock> TimeSource for SyncedClock<C> {
    fn now(&self) -> NaiveDateTime {
        let now = self.clock.now();

        match self.sync.lock(Cell::get) {
            Some(point) => point.time + to_delta(now.saturating_duration_since(point.at)),
            None => unsynced_epoch() + TimeDelta::microseconds(now.as_micros() as i64),
        }
    }

    fn confidence(&self) -> SyncConfidence {
        let Some(point) = self.sync.lock(Cell::get) else {
            return SyncConfidence::Unsynced;
        };

        if point.last_attempt_failed
            || self.clock.now().saturating_duration_since(point.at) > self.max_age
        {
            SyncConfidence::StaleSync
        } else {
            SyncConfidence::Synced
        }
    }
}
