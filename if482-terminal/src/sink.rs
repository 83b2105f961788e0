//! Where telegrams go on a desktop: a serial port to a real slave clock, or stdout.
use anyhow::Context;
use log::info;
use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};
use std::io::{self, Write as _};
use std::time::Duration;

pub enum TelegramSink {
    /// CR without LF, so a terminal keeps overwriting the same line
    Stdout(io::Stdout),
    Serial(Box<dyn SerialPort>),
}

impl TelegramSink {
    pub fn stdout() -> Self {
        Self::Stdout(io::stdout())
    }

    /// IF482 receivers want 7 data bits, even parity, 1 stop bit
    pub fn open_serial(path: &str, baud_rate: u32) -> anyhow::Result<Self> {
        let port = serialport::new(path, baud_rate)
            .data_bits(DataBits::Seven)
            .parity(Parity::Even)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(Duration::from_millis(100))
            .open()
            .with_context(|| format!("failed to open serial port {path}"))?;

        info!("Opened serial port: {} at {} baud 7E1", path, baud_rate);

        Ok(Self::Serial(port))
    }
}

impl embedded_io_async::ErrorType for TelegramSink {
    type Error = io::Error;
}

impl embedded_io_async::Write for TelegramSink {
    async fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        match self {
            Self::Stdout(out) => {
                // stdout is line buffered and telegrams don't end in a newline
                out.write_all(buf)?;
                out.flush()?;
                Ok(buf.len())
            }
            Self::Serial(port) => port.write(buf),
        }
    }

    async fn flush(&mut self) -> Result<(), Self::Error> {
        match self {
            Self::Stdout(out) => out.flush(),
            Self::Serial(port) => port.flush(),
        }
    }
}
