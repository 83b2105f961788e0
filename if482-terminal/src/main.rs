//! Drive an IF482 slave clock from a desktop.
//!
//! The wall clock comes from the operating system and the second pulse is synthesized by a timer
//! thread. Telegrams go to a serial port if one is given, otherwise to stdout.
mod pulse;
mod sink;

use anyhow::Context;
use chrono::{DateTime, FixedOffset, Local, NaiveDateTime, Offset, TimeDelta};
use clap::Parser;
use embassy_executor::Spawner;
use embassy_time::{Duration, Instant, Timer};
use if482_core::clock::EmbassyClock;
use if482_core::config::Config;
use if482_core::pulse::PulseSignal;
use if482_core::scheduler::{self, Unlocked};
use if482_core::telegram::Season;
use if482_core::time_source::SyncedClock;
use log::*;
use static_cell::StaticCell;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::pulse::SynthesizedPulse;
use crate::sink::TelegramSink;

type WallClock = SyncedClock<EmbassyClock>;

type Generator =
    Unlocked<'static, SynthesizedPulse, EmbassyClock, &'static WallClock, TelegramSink>;

static EDGES: PulseSignal = PulseSignal::new();

static WALL_CLOCK: StaticCell<WallClock> = StaticCell::new();

#[derive(Parser, Debug)]
#[command(version, about = "Send IF482 time telegrams to a slave clock")]
struct Args {
    /// serial port for the slave clock. telegrams are printed to stdout without one
    #[arg(long)]
    port: Option<String>,

    #[arg(long, default_value_t = 9600)]
    baud_rate: u32,

    /// defaults to the airtime of one telegram
    #[arg(long)]
    lead_time_ms: Option<u64>,

    /// ticks per second of the synthesized pulse timer
    #[arg(long, default_value_t = 10_000)]
    pulse_clock_hz: u32,

    /// minutes east of UTC. defaults to the system's current offset
    #[arg(long, allow_hyphen_values = true)]
    utc_offset_minutes: Option<i16>,

    /// send UTC and mark the telegrams as such
    #[arg(long)]
    utc: bool,

    /// never sync with the system clock. every telegram will be the "no time" placeholder
    #[arg(long)]
    no_sync: bool,

    #[arg(long, default_value_t = 60)]
    resync_secs: u64,

    #[arg(long)]
    disabled: bool,
}

impl Args {
    fn config(&self) -> Config {
        let mut config = Config {
            enabled: !self.disabled,
            baud_rate: self.baud_rate,
            pulse_clock_hz: self.pulse_clock_hz,
            ..Default::default()
        };

        config.lead_time = match self.lead_time_ms {
            Some(ms) => Duration::from_millis(ms),
            None => if482_core::config::telegram_airtime_ms(self.baud_rate.max(1)),
        };

        if self.utc {
            config.season = Season::Utc;
            config.time_zone_offset_minutes = 0;
        } else {
            config.time_zone_offset_minutes = self.utc_offset_minutes.unwrap_or_else(|| {
                (Local::now().offset().fix().local_minus_utc() / 60) as i16
            });
        }

        config
    }
}

/// wall clock time in the slave clock's zone. None if it doesn't fit a date
fn local_time(since_epoch: std::time::Duration, offset: FixedOffset) -> Option<NaiveDateTime> {
    let utc = DateTime::from_timestamp(since_epoch.as_secs() as i64, since_epoch.subsec_nanos())?;

    Some(utc.naive_utc() + TimeDelta::seconds(offset.local_minus_utc() as i64))
}

/// Feed the system clock into the wall clock every `every`.
#[embassy_executor::task]
async fn sync_task(wall_clock: &'static WallClock, offset: FixedOffset, every: Duration) {
    loop {
        let at = Instant::now();

        let local = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .ok()
            .and_then(|since_epoch| local_time(since_epoch, offset));

        match local {
            Some(local) => {
                if !wall_clock.is_set() {
                    info!("wall clock synced: {}", local);
                } else {
                    trace!("wall clock synced: {}", local);
                }

                wall_clock.set(local, at);
            }
            None => {
                warn!("system clock is before 1970");
                wall_clock.sync_failed();
            }
        }

        Timer::after(every).await;
    }
}

#[embassy_executor::task]
async fn if482_task(generator: Generator) {
    if let Err(err) = generator.run().await {
        error!("IF482 stopped: {}", err);
    }
}

fn start(spawner: Spawner) -> anyhow::Result<()> {
    let args = Args::parse();

    let config = args.config();

    let offset = FixedOffset::east_opt(config.time_zone_offset_minutes as i32 * 60)
        .context("utc offset out of range")?;

    let sink = match &args.port {
        Some(path) => TelegramSink::open_serial(path, config.baud_rate)?,
        None => TelegramSink::stdout(),
    };

    let wall_clock: &'static WallClock =
        WALL_CLOCK.init(SyncedClock::new(EmbassyClock, config.max_sync_age));

    let pulse = SynthesizedPulse::new(config.pulse_clock_hz);

    let Some(generator) = scheduler::init(config, pulse, &EDGES, EmbassyClock, wall_clock, sink)
        .context("IF482 initialization failed")?
    else {
        info!("nothing to do");
        std::process::exit(0);
    };

    if args.no_sync {
        warn!("not syncing the wall clock");
    } else {
        spawner.must_spawn(sync_task(
            wall_clock,
            offset,
            Duration::from_secs(args.resync_secs.max(1)),
        ));
    }

    spawner.must_spawn(if482_task(generator));

    debug!("all tasks spawned");

    Ok(())
}

#[embassy_executor::main]
async fn main(spawner: Spawner) {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_nanos()
        .init();

    info!("hello, world!");

    if let Err(err) = start(spawner) {
        error!("{:?}", err);
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::{Args, local_time};
    use chrono::{FixedOffset, NaiveDate, Timelike};
    use clap::Parser;
    use embassy_time::Duration;
    use if482_core::telegram::Season;

    fn parse(args: &[&str]) -> if482_core::config::Config {
        let argv = std::iter::once("if482-terminal").chain(args.iter().copied());
        let args = Args::try_parse_from(argv).unwrap();

        args.config()
    }

    #[test]
    fn test_utc_ignores_offset() {
        let config = parse(&["--utc", "--utc-offset-minutes", "60"]);

        assert_eq!(config.season, Season::Utc);
        assert_eq!(config.time_zone_offset_minutes, 0);
    }

    #[test]
    fn test_negative_offset() {
        let config = parse(&["--utc-offset-minutes", "-480"]);

        assert_eq!(config.season, Season::Local);
        assert_eq!(config.time_zone_offset_minutes, -480);
    }

    #[test]
    fn test_lead_time() {
        // one telegram at 9600 7E1 is just under 18ms on the wire
        let config = parse(&["--utc-offset-minutes", "0"]);
        assert_eq!(config.lead_time, Duration::from_millis(18));
        assert!(config.enabled);

        let config = parse(&["--utc-offset-minutes", "0", "--baud-rate", "19200"]);
        assert_eq!(config.lead_time, Duration::from_millis(9));

        let config = parse(&["--utc-offset-minutes", "0", "--lead-time-ms", "25"]);
        assert_eq!(config.lead_time, Duration::from_millis(25));
    }

    #[test]
    fn test_disabled() {
        assert!(!parse(&["--utc-offset-minutes", "0", "--disabled"]).enabled);
    }

    #[test]
    fn test_local_time_offsets() {
        // 2016-08-06 17:04:00.250 UTC
        let since_epoch = std::time::Duration::from_millis(1_470_503_040_250);

        let utc = local_time(since_epoch, FixedOffset::east_opt(0).unwrap()).unwrap();
        assert_eq!(utc.date(), NaiveDate::from_ymd_opt(2016, 8, 6).unwrap());
        assert_eq!((utc.hour(), utc.minute()), (17, 4));
        assert_eq!(utc.nanosecond(), 250_000_000);

        let cest = local_time(since_epoch, FixedOffset::east_opt(120 * 60).unwrap()).unwrap();
        assert_eq!((cest.hour(), cest.minute()), (19, 4));

        let pst = local_time(since_epoch, FixedOffset::west_opt(480 * 60).unwrap()).unwrap();
        assert_eq!((pst.hour(), pst.minute()), (9, 4));

        // 18 hours west is still the day before
        let far_west = local_time(since_epoch, FixedOffset::west_opt(18 * 60 * 60).unwrap()).unwrap();
        assert_eq!(far_west.date(), NaiveDate::from_ymd_opt(2016, 8, 5).unwrap());
    }
}
