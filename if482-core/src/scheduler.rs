//! The synchronization scheduler: `Unlocked -> Locked -> Running`.
//!
//! `init` checks the config and the pulse hardware. `phase_lock` polls the time source until its
//! second rolls over and computes the shot offset once. `start` arms the pulse source and after
//! that every edge at tick `T` produces one telegram written at `T + shot_offset`.
use chrono::{TimeDelta, Timelike};
use core::convert::Infallible;
use embassy_time::{Duration, Instant};
use embedded_io_async::{Error as _, Write};

use crate::clock::Clock;
use crate::config::Config;
use crate::errors::{If482Error, If482Result};
use crate::logging::{debug, error, info, warn};
use crate::pulse::{PULSE_PERIOD, PulseSignal, PulseSource};
use crate::telegram::{Telegram, TimeSnapshot, encode_with_season};
use crate::time_source::TimeSource;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ScheduleState {
    /// tick when phase locking started
    pub reference_tick: Instant,
    /// from a pulse edge to the moment the telegram starts going out. fixed after phase lock, but
    /// it depends on where in the second the task started, so it differs from boot to boot
    pub shot_offset: Duration,
    pub last_wake: Option<Instant>,
}

/// `lock_tick - reference_tick - lead_time`, wrapped into `0..PULSE_PERIOD`
pub fn shot_offset(
    reference_tick: Instant,
    lock_tick: Instant,
    lead_time: Duration,
) -> If482Result<Duration> {
    if lead_time == Duration::from_ticks(0) || lead_time >= PULSE_PERIOD {
        return Err(If482Error::InvalidLeadTime);
    }

    let period = PULSE_PERIOD.as_ticks() as i128;
    let elapsed = lock_tick.saturating_duration_since(reference_tick).as_ticks() as i128;

    let offset = (elapsed - lead_time.as_ticks() as i128).rem_euclid(period);

    Ok(Duration::from_ticks(offset as u64))
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Skip {
    /// another edge came in while we waited for the shot
    NewerEdge,
    /// woke up this far past the deadline
    Late(Duration),
}

#[derive(Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Cycle {
    Sent(Telegram),
    Skipped(Skip),
    SendFailed,
}

struct Parts<'a, P, C, T, W> {
    config: Config,
    pulse: P,
    edges: &'a PulseSignal,
    clock: C,
    time: T,
    sink: W,
}

/// Configured, but not yet aligned to the time source.
pub struct Unlocked<'a, P, C, T, W> {
    parts: Parts<'a, P, C, T, W>,
}

/// Shot offset is known. The pulse source is not armed yet.
pub struct Locked<'a, P, C, T, W> {
    parts: Parts<'a, P, C, T, W>,
    state: ScheduleState,
}

/// Armed and sending one telegram per edge.
pub struct Running<'a, P, C, T, W> {
    parts: Parts<'a, P, C, T, W>,
    state: ScheduleState,
}

/// Set up the generator.
///
/// Returns `Ok(None)` if it is disabled in the config. If the pulse source can't be configured, the
/// error is returned and nothing exists that could send a telegram.
pub fn init<'a, P, C, T, W>(
    config: Config,
    mut pulse: P,
    edges: &'a PulseSignal,
    clock: C,
    time: T,
    sink: W,
) -> If482Result<Option<Unlocked<'a, P, C, T, W>>>
where
    P: PulseSource<'a>,
    C: Clock,
    T: TimeSource,
    W: Write,
{
    if !config.enabled {
        info!("IF482 disabled");
        return Ok(None);
    }

    config.validate()?;

    if let Err(err) = pulse.configure() {
        error!("IF482 initialization error: {}", err);
        return Err(err);
    }

    info!(
        "IF482 configured. lead time {} ms",
        config.lead_time.as_millis()
    );

    Ok(Some(Unlocked {
        parts: Parts {
            config,
            pulse,
            edges,
            clock,
            time,
            sink,
        },
    }))
}

impl<'a, P, C, T, W> Unlocked<'a, P, C, T, W>
where
    P: PulseSource<'a>,
    C: Clock,
    T: TimeSource,
    W: Write,
{
    /// Poll the time source until its second changes and take that tick as the phase reference.
    ///
    /// This is the only place that polls. It gives up after `phase_lock_timeout`.
    pub async fn phase_lock(self) -> If482Result<Locked<'a, P, C, T, W>> {
        let Parts {
            config,
            clock,
            time,
            ..
        } = &self.parts;

        let reference_tick = clock.now();
        let first_second = time.now().second();

        let lock_tick = loop {
            clock.yield_now().await;

            let second = time.now().second();
            let tick = clock.now();

            if second != first_second {
                break tick;
            }

            if tick.saturating_duration_since(reference_tick) > config.phase_lock_timeout {
                error!("IF482 time source never rolled over to a new second");
                return Err(If482Error::PhaseLockTimeout);
            }
        };

        let shot_offset = shot_offset(reference_tick, lock_tick, config.lead_time)?;

        info!(
            "IF482 phase locked after {} ms. shot offset {} ms",
            lock_tick.saturating_duration_since(reference_tick).as_millis(),
            shot_offset.as_millis()
        );

        Ok(Locked {
            parts: self.parts,
            state: ScheduleState {
                reference_tick,
                shot_offset,
                last_wake: None,
            },
        })
    }

    /// phase lock, arm, then send forever. only returns if phase locking fails
    pub async fn run(self) -> If482Result<Infallible> {
        let running = self.phase_lock().await?.start();

        Ok(running.run().await)
    }
}

impl<'a, P, C, T, W> Locked<'a, P, C, T, W>
where
    P: PulseSource<'a>,
    C: Clock,
    T: TimeSource,
    W: Write,
{
    pub fn state(&self) -> &ScheduleState {
        &self.state
    }

    /// Arm the pulse source. Any edge that slipped in before now is dropped.
    pub fn start(mut self) -> Running<'a, P, C, T, W> {
        let edges = self.parts.edges;

        edges.receiver().clear();
        self.parts.pulse.arm(edges.sender());

        info!("IF482 armed");

        Running {
            parts: self.parts,
            state: self.state,
        }
    }
}

impl<'a, P, C, T, W> Running<'a, P, C, T, W>
where
    P: PulseSource<'a>,
    C: Clock,
    T: TimeSource,
    W: Write,
{
    pub fn state(&self) -> &ScheduleState {
        &self.state
    }

    /// Wait for one edge and send the telegram for it.
    ///
    /// Blocks forever if no edge comes. A missing edge means a missing telegram, never a guessed
    /// one.
    pub async fn step(&mut self) -> Cycle {
        let edges = self.parts.edges.receiver();

        let wake = edges.wait().await;
        self.state.last_wake = Some(wake);

        let deadline = wake + self.state.shot_offset;
        self.parts.clock.sleep_until(deadline).await;

        if edges.pending() {
            warn!("IF482 newer edge arrived before the shot. skipping");
            return Cycle::Skipped(Skip::NewerEdge);
        }

        let late = self.parts.clock.now().saturating_duration_since(deadline);
        if late > self.parts.config.max_jitter {
            warn!("IF482 woke {} ms late. skipping", late.as_millis());
            return Cycle::Skipped(Skip::Late(late));
        }

        // the last byte lands right as the next second starts, so that is the second we describe
        let next = self.parts.time.now() + TimeDelta::seconds(1);

        let telegram = encode_with_season(
            TimeSnapshot::from(&next),
            self.parts.time.confidence(),
            self.parts.config.season,
        );

        debug!("IF482 = {}", telegram);

        match self.parts.sink.write_all(telegram.as_bytes()).await {
            Ok(()) => Cycle::Sent(telegram),
            Err(err) => {
                error!("IF482 send failed: {:?}", err.kind());
                Cycle::SendFailed
            }
        }
    }

    pub async fn run(mut self) -> Infallible {
        loop {
            self.step().await;
        }
    }
}
