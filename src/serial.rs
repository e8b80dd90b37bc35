//! `serialport` adapter exposing [embedded_io::Read] & [embedded_io::Write].

use std::time::Duration;

use serialport::SerialPort;
use tracing::info;

use crate::{
    config::{ModbusConfiguration, Parity},
    error::TransportError,
};

/// An open serial line to the meter.
pub struct SerialInterface(Box<dyn SerialPort>);

#[derive(Debug)]
pub struct IoError(std::io::Error);

impl core::fmt::Display for IoError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for IoError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.0)
    }
}

impl embedded_io::Error for IoError {
    fn kind(&self) -> embedded_io::ErrorKind {
        io_error_kind(self.0.kind())
    }
}

fn io_error_kind(kind: std::io::ErrorKind) -> embedded_io::ErrorKind {
    use embedded_io::ErrorKind as E;
    use std::io::ErrorKind as Io;
    match kind {
        Io::NotFound => E::NotFound,
        Io::PermissionDenied => E::PermissionDenied,
        Io::BrokenPipe => E::BrokenPipe,
        Io::InvalidInput => E::InvalidInput,
        Io::InvalidData => E::InvalidData,
        Io::TimedOut => E::TimedOut,
        Io::Interrupted => E::Interrupted,
        Io::Unsupported => E::Unsupported,
        Io::OutOfMemory => E::OutOfMemory,
        _ => E::Other,
    }
}

impl embedded_io::ErrorType for SerialInterface {
    type Error = IoError;
}

impl embedded_io::Read for SerialInterface {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        std::io::Read::read(&mut self.0, buf).map_err(IoError)
    }
}

impl embedded_io::Write for SerialInterface {
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        std::io::Write::write(&mut self.0, buf).map_err(IoError)
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        std::io::Write::flush(&mut self.0).map_err(IoError)
    }
}

impl SerialInterface {
    /// Open the serial device described by the Modbus settings.
    pub fn open(config: &ModbusConfiguration) -> Result<Self, TransportError> {
        let port = serialport::new(&config.device, config.baud_rate)
            .data_bits(data_bits(config.data_bits)?)
            .stop_bits(stop_bits(config.stop_bits)?)
            .parity(match config.parity {
                Parity::None => serialport::Parity::None,
                Parity::Even => serialport::Parity::Even,
                Parity::Odd => serialport::Parity::Odd,
            })
            .timeout(Duration::from_millis(config.response_timeout_ms()))
            .open()
            .map_err(|e| TransportError::Open(format!("{}: {}", config.device, e)))?;

        info!(
            device = %config.device,
            baud_rate = config.baud_rate,
            "Opened serial device"
        );
        Ok(Self(port))
    }
}

fn data_bits(bits: u8) -> Result<serialport::DataBits, TransportError> {
    match bits {
        5 => Ok(serialport::DataBits::Five),
        6 => Ok(serialport::DataBits::Six),
        7 => Ok(serialport::DataBits::Seven),
        8 => Ok(serialport::DataBits::Eight),
        _ => Err(TransportError::Open(format!("unsupported data bits {bits}"))),
    }
}

fn stop_bits(bits: u8) -> Result<serialport::StopBits, TransportError> {
    match bits {
        1 => Ok(serialport::StopBits::One),
        2 => Ok(serialport::StopBits::Two),
        _ => Err(TransportError::Open(format!("unsupported stop bits {bits}"))),
    }
}

/// Names of the serial ports present on this machine.
pub fn available_ports() -> Result<Vec<String>, TransportError> {
    serialport::available_ports()
        .map(|ports| ports.into_iter().map(|p| p.port_name).collect())
        .map_err(|e| TransportError::Open(e.to_string()))
}
