//! DS3231 on a shared I2C bus. It is both the pulse (1 Hz square wave on INT/SQW) and the wall
//! clock the telegrams are built from.
use chrono::{NaiveDateTime, TimeDelta};
use ds323x::{DateTimeAccess, Ds323x, SqWFreq};
use embassy_stm32::exti::ExtiInput;
use embassy_stm32::i2c::I2c;
use embassy_stm32::mode::Blocking;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::mutex::Mutex;
use embassy_sync::signal::Signal;
use embassy_time::{Duration, Instant, Timer};
use if482_core::clock::EmbassyClock;
use if482_core::errors::{If482Error, If482Result};
use if482_core::logging::{debug, error, info, warn};
use if482_core::pulse::{EdgeStamp, PulseSender, PulseSource};
use if482_core::time_source::SyncedClock;

pub type I2cBus = Mutex<CriticalSectionRawMutex, I2c<'static, Blocking>>;

/// the edge task waits here until the scheduler arms the pulse
pub type ArmSlot = Signal<CriticalSectionRawMutex, PulseSender<'static>>;

pub type WallClock = SyncedClock<EmbassyClock>;

const SYNC_TRIES: u32 = 5;
const SYNC_RETRY: Duration = Duration::from_millis(300);

pub struct Ds3231Pulse {
    bus: &'static I2cBus,
    arm: &'static ArmSlot,
}

impl Ds3231Pulse {
    pub fn new(bus: &'static I2cBus, arm: &'static ArmSlot) -> Self {
        Self { bus, arm }
    }
}

impl PulseSource<'static> for Ds3231Pulse {
    fn configure(&mut self) -> If482Result<()> {
        // someone else is mid transaction. don't wait on them during init
        let Ok(mut i2c) = self.bus.try_lock() else {
            return Err(If482Error::BusBusy);
        };

        let mut rtc = Ds323x::new_ds3231(&mut *i2c);

        rtc.set_square_wave_frequency(SqWFreq::_1Hz)
            .and_then(|_| rtc.use_int_sqw_output_as_square_wave())
            .map_err(|_| If482Error::PulseSourceUnavailable)?;

        info!("DS3231 square wave at 1 Hz");

        Ok(())
    }

    fn arm(&mut self, edges: PulseSender<'static>) {
        self.arm.signal(edges);
    }
}

/// Forward every falling edge of the square wave. This is the only producer of pulse edges.
///
/// Edges are stamped from the start so the rtc can be read against them. They only reach the
/// scheduler once it has armed the pulse.
#[embassy_executor::task]
pub async fn sqw_task(
    mut sqw: ExtiInput<'static>,
    arm: &'static ArmSlot,
    stamp: &'static EdgeStamp,
) {
    let mut edges = None;

    loop {
        sqw.wait_for_falling_edge().await;

        let tick = Instant::now();

        stamp.mark(tick);

        if edges.is_none() {
            edges = arm.try_take();

            if edges.is_some() {
                debug!("sqw armed");
            }
        }

        if let Some(edges) = &edges {
            edges.on_edge(tick);
        }
    }
}

/// Read the DS3231 into the wall clock every `every`.
///
/// The rtc keeps UTC and only has whole seconds. Its seconds roll over on the square wave's
/// falling edge, so each read is pinned to the edge before it. `utc_offset` shifts it into the
/// slave clock's zone.
#[embassy_executor::task]
pub async fn sync_task(
    bus: &'static I2cBus,
    stamp: &'static EdgeStamp,
    wall_clock: &'static WallClock,
    utc_offset: TimeDelta,
    every: Duration,
) {
    loop {
        let mut tries = 0;

        loop {
            let before = stamp.last();

            match read_rtc(bus).await {
                Ok(time) => {
                    if wall_clock.set_on_edge(time + utc_offset, before, stamp.last()) {
                        info!("wall clock synced from DS3231");
                        break;
                    }
                }
                Err(err) => warn!("DS3231 read failed: {}", err),
            }

            tries += 1;
            if tries >= SYNC_TRIES {
                warn!("no usable DS3231 read after {} tries", tries);
                wall_clock.sync_failed();
                break;
            }

            // land somewhere else in the second
            Timer::after(SYNC_RETRY).await;
        }

        Timer::after(every).await;
    }
}

async fn read_rtc(bus: &I2cBus) -> If482Result<NaiveDateTime> {
    let mut i2c = bus.lock().await;

    let mut rtc = Ds323x::new_ds3231(&mut *i2c);

    // the oscillator stop flag means the time registers are garbage until someone sets them
    match rtc.has_been_stopped() {
        Ok(false) => {}
        Ok(true) => {
            error!("DS3231 oscillator was stopped. time is not valid");
            return Err(If482Error::TimeSourceRead);
        }
        Err(_) => return Err(If482Error::TimeSourceRead),
    }

    rtc.datetime().map_err(|_| If482Error::TimeSourceRead)
}
