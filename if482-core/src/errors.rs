use thiserror::Error;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum If482Error {
    /// the bus shared with the pulse source (usually i2c to the rtc) is held by someone else
    #[error("pulse source bus busy")]
    BusBusy,
    #[error("pulse source unavailable")]
    PulseSourceUnavailable,
    #[error("lead time must be non-zero and shorter than one pulse period")]
    InvalidLeadTime,
    #[error("pulse clock rate must be non-zero")]
    InvalidPulseClock,
    #[error("time source never rolled over to a new second")]
    PhaseLockTimeout,
    /// the wall clock couldn't be read. the time source keeps running on its last sync
    #[error("time source read failed")]
    TimeSourceRead,
}

impl If482Error {
    /// errors that mean the generator must not be started
    pub fn is_initialization_failure(&self) -> bool {
        matches!(
            self,
            Self::BusBusy
                | Self::PulseSourceUnavailable
                | Self::InvalidLeadTime
                | Self::InvalidPulseClock
        )
    }
}

pub type If482Result<T> = Result<T, If482Error>;
