//! Stand-in for the rtc square wave when there is no pulse hardware.
//!
//! A thread counts `clock_hz` ticks per period, the same way a hardware timer with a prescaler
//! would, and raises an edge on every system clock second boundary.
use embassy_time::Instant;
use if482_core::errors::{If482Error, If482Result};
use if482_core::pulse::{PulseSender, PulseSource};
use log::{debug, error, info};
use std::thread;
use std::time::{Duration, Instant as StdInstant, SystemTime, UNIX_EPOCH};

pub struct SynthesizedPulse {
    clock_hz: u32,
    arm_tx: Option<flume::Sender<PulseSender<'static>>>,
}

impl SynthesizedPulse {
    pub fn new(clock_hz: u32) -> Self {
        Self {
            clock_hz,
            arm_tx: None,
        }
    }

    /// `clock_hz` ticks of the synthesized timer. None if it can't be counted in nanoseconds
    pub fn period(clock_hz: u32) -> Option<Duration> {
        if clock_hz == 0 || clock_hz > 1_000_000_000 {
            return None;
        }

        let tick = Duration::from_nanos(1_000_000_000 / clock_hz as u64);

        Some(tick * clock_hz)
    }
}

/// how long until the system clock starts its next second
fn until_next_second() -> Duration {
    let subsec = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);

    Duration::from_nanos(1_000_000_000 - subsec as u64)
}

impl PulseSource<'static> for SynthesizedPulse {
    fn configure(&mut self) -> If482Result<()> {
        let period = Self::period(self.clock_hz).ok_or(If482Error::InvalidPulseClock)?;

        let (arm_tx, arm_rx) = flume::bounded::<PulseSender<'static>>(1);

        // the thread exists from here on, but sends nothing until it is armed
        thread::Builder::new()
            .name("if482-pulse".into())
            .spawn(move || {
                let Ok(edges) = arm_rx.recv() else {
                    debug!("pulse never armed");
                    return;
                };

                let mut next = StdInstant::now() + until_next_second();

                loop {
                    if let Some(wait) = next.checked_duration_since(StdInstant::now()) {
                        thread::sleep(wait);
                    }

                    edges.on_edge(Instant::now());

                    next += period;
                }
            })
            .map_err(|err| {
                error!("failed to start pulse thread: {err}");
                If482Error::PulseSourceUnavailable
            })?;

        info!("Starting IF482 pulse. {} Hz clock", self.clock_hz);

        self.arm_tx = Some(arm_tx);

        Ok(())
    }

    fn arm(&mut self, edges: PulseSender<'static>) {
        match self.arm_tx.take() {
            Some(arm_tx) => {
                if arm_tx.send(edges).is_err() {
                    error!("pulse thread is gone");
                }
            }
            None => error!("pulse armed before it was configured"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::SynthesizedPulse;
    use if482_core::errors::If482Error;
    use if482_core::pulse::{PulseSignal, PulseSource};
    use std::thread;
    use std::time::{Duration, Instant};

    #[test]
    fn test_period() {
        assert_eq!(SynthesizedPulse::period(10_000), Some(Duration::from_secs(1)));
        assert_eq!(SynthesizedPulse::period(1), Some(Duration::from_secs(1)));
        // 333_333_333ns ticks don't add up to a whole second
        assert_eq!(SynthesizedPulse::period(3), Some(Duration::from_nanos(999_999_999)));
        assert_eq!(SynthesizedPulse::period(0), None);
    }

    #[test]
    fn test_zero_hz_fails_configure() {
        let mut pulse = SynthesizedPulse::new(0);

        assert_eq!(pulse.configure(), Err(If482Error::InvalidPulseClock));
    }

    #[test_log::test]
    fn test_edges_only_after_arming() {
        static EDGES: PulseSignal = PulseSignal::new();

        let mut pulse = SynthesizedPulse::new(10_000);
        pulse.configure().unwrap();

        // a full second boundary goes by with nobody listening
        thread::sleep(Duration::from_millis(1_200));
        assert!(!EDGES.receiver().pending());

        pulse.arm(EDGES.sender());

        let give_up = Instant::now() + Duration::from_millis(2_500);
        while !EDGES.receiver().pending() && Instant::now() < give_up {
            thread::sleep(Duration::from_millis(10));
        }

        assert!(EDGES.receiver().pending());
    }
}
