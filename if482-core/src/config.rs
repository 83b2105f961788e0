use embassy_time::Duration;

use crate::errors::{If482Error, If482Result};
use crate::pulse::PULSE_PERIOD;
use crate::telegram::{Season, TELEGRAM_LEN};

/// slave clocks listen at 9600 baud, 7 data bits, even parity, 1 stop bit
pub const TELEGRAM_BAUD_RATE: u32 = 9600;

/// start bit + 7 data bits + parity + stop bit
pub const BITS_PER_CHAR: u32 = 10;

#[derive(Clone, Debug)]
pub struct Config {
    pub enabled: bool,
    /// how long before the next second boundary the telegram has to start going out
    pub lead_time: Duration,
    pub baud_rate: u32,
    /// ticks per pulse period when the pulse is synthesized from a timer instead of an rtc
    pub pulse_clock_hz: u32,
    pub season: Season,
    /// a shot later than this past its deadline is stale and gets skipped
    pub max_jitter: Duration,
    pub phase_lock_timeout: Duration,
    /// after this long without a good sync, the monitor character drops from 'A' to 'M'
    pub max_sync_age: Duration,
    /// UTC = 0; CET = 60; PST = -480
    pub time_zone_offset_minutes: i16,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            enabled: true,
            lead_time: telegram_airtime_ms(TELEGRAM_BAUD_RATE),
            baud_rate: TELEGRAM_BAUD_RATE,
            pulse_clock_hz: 10_000,
            season: Season::Local,
            max_jitter: Duration::from_millis(50),
            phase_lock_timeout: Duration::from_secs(2),
            max_sync_age: Duration::from_secs(12 * 60 * 60),
            time_zone_offset_minutes: 0,
        }
    }
}

impl Config {
    pub fn validate(&self) -> If482Result<()> {
        if self.lead_time == Duration::from_ticks(0) || self.lead_time >= PULSE_PERIOD {
            return Err(If482Error::InvalidLeadTime);
        }

        if self.pulse_clock_hz == 0 {
            return Err(If482Error::InvalidPulseClock);
        }

        Ok(())
    }
}

/// time on the wire for one full telegram
pub fn telegram_airtime(baud_rate: u32) -> Duration {
    let bits = (TELEGRAM_LEN as u64) * (BITS_PER_CHAR as u64);

    Duration::from_micros((bits * 1_000_000).div_ceil(baud_rate as u64))
}

/// same as `telegram_airtime`, rounded up to whole milliseconds
pub fn telegram_airtime_ms(baud_rate: u32) -> Duration {
    let bits = (TELEGRAM_LEN as u64) * (BITS_PER_CHAR as u64);

    Duration::from_millis((bits * 1_000).div_ceil(baud_rate as u64))
}
