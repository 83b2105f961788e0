//! IF482 generator for a STM32F411 with a DS3231 rtc.
//!
//! - DS3231 on I2C1 (PB8 SCL, PB9 SDA). its INT/SQW pin goes to PA0
//! - slave clock on USART1 TX (PA9) at 9600 7E1
#![no_std]
#![no_main]

mod rtc;

use chrono::TimeDelta;
use embassy_executor::Spawner;
use embassy_stm32::{
    bind_interrupts,
    exti::ExtiInput,
    gpio::Pull,
    i2c::I2c,
    peripherals,
    time::Hertz,
    usart::{self, BufferedUart, BufferedUartTx, DataBits, Parity, StopBits},
};
use embassy_sync::{mutex::Mutex, signal::Signal};
use embassy_time::Duration;
use if482_core::clock::EmbassyClock;
use if482_core::config::Config;
use if482_core::logging::{error, info};
use if482_core::pulse::{EdgeStamp, PulseSignal};
use if482_core::scheduler::{self, Unlocked};
use if482_core::time_source::SyncedClock;
use static_cell::StaticCell;
use {defmt_rtt as _, panic_probe as _};

use crate::rtc::{ArmSlot, Ds3231Pulse, I2cBus, WallClock};

type Generator =
    Unlocked<'static, Ds3231Pulse, EmbassyClock, &'static WallClock, BufferedUartTx<'static>>;

/// the DS3231 drifts a couple of ppm. no need to read it often
const RTC_SYNC_INTERVAL: Duration = Duration::from_secs(10 * 60);

static EDGES: PulseSignal = PulseSignal::new();
static ARM: ArmSlot = Signal::new();
static SQW_EDGES: EdgeStamp = EdgeStamp::new();

bind_interrupts!(struct Irqs {
    USART1 => usart::BufferedInterruptHandler<peripherals::USART1>;
});

#[embassy_executor::task]
async fn if482_task(generator: Generator) {
    if let Err(err) = generator.run().await {
        error!("IF482 stopped: {}", err);
    }
}

#[embassy_executor::main]
async fn main(spawner: Spawner) {
    let p = embassy_stm32::init(Default::default());

    info!("Hello World!");

    let config = Config::default();

    static TX_BUF: StaticCell<[u8; 64]> = StaticCell::new();
    static RX_BUF: StaticCell<[u8; 16]> = StaticCell::new();
    static I2C_BUS: StaticCell<I2cBus> = StaticCell::new();
    static WALL_CLOCK: StaticCell<WallClock> = StaticCell::new();

    // the stm32 counts the parity bit as a data bit. 8 here is 7 on the wire
    let mut uart_config = usart::Config::default();
    uart_config.baudrate = config.baud_rate;
    uart_config.data_bits = DataBits::DataBits8;
    uart_config.parity = Parity::ParityEven;
    uart_config.stop_bits = StopBits::STOP1;

    let uart = match BufferedUart::new(
        p.USART1,
        Irqs,
        p.PA10,
        p.PA9,
        TX_BUF.init([0u8; 64]),
        RX_BUF.init([0u8; 16]),
        uart_config,
    ) {
        Ok(x) => x,
        Err(err) => {
            error!("failed to create USART1 for the slave clock: {}", err);
            return;
        }
    };

    // nothing talks back
    let (uart_tx, _uart_rx) = uart.split();

    let i2c = I2c::new_blocking(p.I2C1, p.PB8, p.PB9, Hertz(100_000), Default::default());

    let i2c_bus: &'static I2cBus = I2C_BUS.init(Mutex::new(i2c));

    // INT/SQW is open drain
    let sqw = ExtiInput::new(p.PA0, p.EXTI0, Pull::Up);

    let wall_clock: &'static WallClock =
        WALL_CLOCK.init(SyncedClock::new(EmbassyClock, config.max_sync_age));

    let utc_offset = TimeDelta::minutes(config.time_zone_offset_minutes as i64);

    let pulse = Ds3231Pulse::new(i2c_bus, &ARM);

    // runs before any task could be holding the bus
    let generator = match scheduler::init(config, pulse, &EDGES, EmbassyClock, wall_clock, uart_tx)
    {
        Ok(Some(x)) => x,
        Ok(None) => return,
        Err(err) => {
            error!("IF482 failed to start: {}", err);
            return;
        }
    };

    spawner.must_spawn(rtc::sqw_task(sqw, &ARM, &SQW_EDGES));
    spawner.must_spawn(rtc::sync_task(
        i2c_bus,
        &SQW_EDGES,
        wall_clock,
        utc_offset,
        RTC_SYNC_INTERVAL,
    ));
    spawner.must_spawn(if482_task(generator));

    info!("all tasks started");
}
