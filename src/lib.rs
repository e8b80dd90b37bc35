//! This crate polls EMI energy meters over Modbus RTU and republishes each
//! configured reading to an MQTT broker.
//!
//! A fixed set of named data loads (a voltage, an energy counter, the device
//! clock, ...) is sampled, each on its own interval. Every tick the due loads
//! are read, decoded into a value and published as one batch under a single
//! broker session. A failing load is logged and retried on its next interval
//! without affecting the others.
//!
//! Supported data types:
//! * `Float16` - one register, scaled by a power of ten.
//! * `Float32` - two registers, high word first.
//! * `Unsigned` - one raw register.
//! * `String` - an octet string of configured length.
//! * `Clock` - the meter's real-time clock, published as an RFC 3339 timestamp.
//!
//! The serial port used for meter comms is usually configured like so:
//! * Baud rate: 9600
//! * Data bits: 8
//! * Stop bits: 1
//! * Parity: None

pub mod acquisition;
pub mod clock;
pub mod config;
pub mod decode;
pub mod error;
pub mod logging;
pub mod publish;
pub mod register;
pub mod scaling;
pub mod scheduler;
pub mod serial;
pub mod transport;
pub mod types;

pub use error::{Error, Result};

#[cfg(test)]
mod mock;
#[cfg(test)]
mod mock_serial;
