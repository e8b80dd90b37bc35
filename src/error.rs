//! Our error types for the bridge.

use thiserror::Error;

pub type Result<T> = core::result::Result<T, Error>;

/// Top level error, split by the three ways a data load can fail.
#[derive(Error, Debug)]
pub enum Error {
    /// A configuration defect. Retrying will not help.
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
    #[error("Publish error: {0}")]
    Publish(#[from] PublishError),
}

impl Error {
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }
}

/// Failures reading registers from the field device.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Serial communication error: {0:?}")]
    Serial(embedded_io::ErrorKind),
    #[error("Modbus protocol error: {0}")]
    Modbus(rmodbus::ErrorKind),
    #[error("Response does not fit the frame buffer")]
    BufferOverflow,
    #[error("Invalid response received")]
    InvalidResponse,
    #[error("Device clock holds an invalid date or time")]
    InvalidClock,
    #[error("Unable to open serial device: {0}")]
    Open(String),
}

impl From<rmodbus::ErrorKind> for TransportError {
    fn from(err: rmodbus::ErrorKind) -> Self {
        TransportError::Modbus(err)
    }
}

/// Failures talking to the message broker.
#[derive(Error, Debug)]
pub enum PublishError {
    #[error("Unable to connect to broker: {0}")]
    Connect(String),
    #[error("Unable to publish message: {0}")]
    Send(String),
    #[error("Not connected to broker")]
    NotConnected,
}
