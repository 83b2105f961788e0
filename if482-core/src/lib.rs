//! IF482 time telegram generator.
//!
//! Phase-locks to a precise 1 Hz pulse and writes one 17 byte telegram per second so that its
//! last byte reaches the slave clock right before the second it describes begins.
#![cfg_attr(not(any(test, feature = "std")), no_std)]

pub mod clock;
pub mod config;
pub mod errors;
pub mod logging;
pub mod pulse;
pub mod scheduler;
pub mod telegram;
pub mod time_source;

#[cfg(test)]
mod test_support;
