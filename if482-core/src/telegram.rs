//! IF482 telegram encoding.
//!
//! ```text
//! Byte  Meaning             ASCII
//!  1    Start of telegram   O
//!  2    Monitoring          A / M / ?
//!  3    Time season         W / S / U / L
//!  4    Year tens           0 .. 9
//!  5    Year unit           0 .. 9
//!  6    Month tens          0 or 1
//!  7    Month unit          0 .. 9
//!  8    Day tens            0 .. 3
//!  9    Day unit            0 .. 9
//! 10    Day of week         1 .. 7
//! 11    Hours tens          0 .. 2
//! 12    Hours unit          0 .. 9
//! 13    Minutes tens        0 .. 5
//! 14    Minutes unit        0 .. 9
//! 15    Seconds tens        0 .. 5
//! 16    Seconds unit        0 .. 9
//! 17    End of telegram     CR
//! ```
use chrono::{Datelike, NaiveDateTime, Timelike};
use core::fmt;

pub const TELEGRAM_LEN: usize = 17;

pub const DIGITS_LEN: usize = 13;

/// sent instead of the date and time when we have no idea what time it is
pub const UNSYNCED_DIGITS: &[u8; DIGITS_LEN] = b"000000F000000";

pub const START: u8 = b'O';
pub const END: u8 = b'\r';

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SyncConfidence {
    /// time is set and was recently verified
    Synced,
    /// time was set, but the last verification failed or is too old
    StaleSync,
    /// time was never set
    Unsynced,
}

impl SyncConfidence {
    pub const fn monitor(self) -> u8 {
        match self {
            Self::Synced => b'A',
            Self::StaleSync => b'M',
            Self::Unsynced => b'?',
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Season {
    Standard,
    Summer,
    Utc,
    #[default]
    Local,
}

impl Season {
    pub const fn marker(self) -> u8 {
        match self {
            Self::Standard => b'W',
            Self::Summer => b'S',
            Self::Utc => b'U',
            Self::Local => b'L',
        }
    }
}

/// Broken down wall clock time. Only `year % 100` goes on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TimeSnapshot {
    pub year: u16,
    /// 1-12
    pub month: u8,
    /// 1-31
    pub day: u8,
    /// 1 = monday .. 7 = sunday
    pub weekday: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
}

impl From<&NaiveDateTime> for TimeSnapshot {
    fn from(t: &NaiveDateTime) -> Self {
        Self {
            year: t.year().clamp(0, 9999) as u16,
            month: t.month() as u8,
            day: t.day() as u8,
            weekday: t.weekday().number_from_monday() as u8,
            hour: t.hour() as u8,
            minute: t.minute() as u8,
            second: t.second() as u8,
        }
    }
}

impl TimeSnapshot {
    /// YY MM DD W HH MM SS
    pub fn digits(&self) -> [u8; DIGITS_LEN] {
        let two = |x: u8| [b'0' + x / 10 % 10, b'0' + x % 10];

        let [y0, y1] = two((self.year % 100) as u8);
        let [mo0, mo1] = two(self.month);
        let [d0, d1] = two(self.day);
        let [h0, h1] = two(self.hour);
        let [mi0, mi1] = two(self.minute);
        let [s0, s1] = two(self.second);

        [
            y0,
            y1,
            mo0,
            mo1,
            d0,
            d1,
            b'0' + self.weekday % 10,
            h0,
            h1,
            mi0,
            mi1,
            s0,
            s1,
        ]
    }
}

/// One complete IF482 telegram, CR included. Always exactly `TELEGRAM_LEN` bytes.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Telegram([u8; TELEGRAM_LEN]);

impl Telegram {
    pub fn as_bytes(&self) -> &[u8; TELEGRAM_LEN] {
        &self.0
    }

    pub fn monitor(&self) -> u8 {
        self.0[1]
    }

    pub fn digits(&self) -> &[u8] {
        &self.0[3..3 + DIGITS_LEN]
    }
}

/// the CR is shown as `<CR>` so that log lines stay on one line
impl fmt::Display for Telegram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for &b in &self.0[..TELEGRAM_LEN - 1] {
            write!(f, "{}", b as char)?;
        }
        f.write_str("<CR>")
    }
}

impl fmt::Debug for Telegram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Telegram({self})")
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for Telegram {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "{=[u8]:a}", &self.0[..TELEGRAM_LEN - 1])
    }
}

/// local time telegram
pub fn encode(time: TimeSnapshot, confidence: SyncConfidence) -> Telegram {
    encode_with_season(time, confidence, Season::Local)
}

pub fn encode_with_season(
    time: TimeSnapshot,
    confidence: SyncConfidence,
    season: Season,
) -> Telegram {
    let mut out = [0u8; TELEGRAM_LEN];

    out[0] = START;
    out[1] = confidence.monitor();
    out[2] = season.marker();

    // 'A' and 'M' both mean the receiver should accept the time
    match confidence {
        SyncConfidence::Synced | SyncConfidence::StaleSync => {
            out[3..3 + DIGITS_LEN].copy_from_slice(&time.digits())
        }
        SyncConfidence::Unsynced => out[3..3 + DIGITS_LEN].copy_from_slice(UNSYNCED_DIGITS),
    }

    out[TELEGRAM_LEN - 1] = END;

    Telegram(out)
}
