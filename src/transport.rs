//! Register transport: typed reads from the field device.
//!
//! [`RegisterTransport`] is the only view the acquisition pipeline has of the
//! meter. [`ModbusRtu`] implements it over any interface which implements
//! [embedded_io::Read] & [embedded_io::Write], framing requests with `rmodbus`.

use embedded_io::Error as _;
use tracing::trace;

use crate::{
    clock::EmiClock,
    error::TransportError,
    register::{CLOCK_REGISTER, CLOCK_REGISTER_COUNT, MAX_OCTET_STRING_LEN, registers_for_bytes},
    scaling::Scaler,
};

/// Size of the frame buffers. A Modbus RTU frame never exceeds 256 bytes.
const FRAME_LEN: usize = 256;

/// Typed register reads offered by the field device.
pub trait RegisterTransport {
    /// Read one 16-bit register and apply `scaler`.
    fn read_float16(&mut self, address: u16, scaler: Scaler) -> Result<f64, TransportError>;

    /// Read two registers as one 32-bit value, high word first.
    fn read_float32(&mut self, address: u16) -> Result<f64, TransportError>;

    /// Read one raw 16-bit register.
    fn read_unsigned(&mut self, address: u16) -> Result<u16, TransportError>;

    /// Read `length` bytes starting at `address`.
    fn read_octet_string(&mut self, address: u16, length: u16) -> Result<Vec<u8>, TransportError>;

    /// Read the device real-time clock.
    fn read_clock(&mut self) -> Result<EmiClock, TransportError>;
}

/// Modbus RTU client for EMI meters.
///
/// Every read is a "read input registers" (`0x04`) request to a single slave.
pub struct ModbusRtu<S: embedded_io::Read + embedded_io::Write> {
    interface: S,
    /// Most EMI meters answer on unit ID 0x01.
    unit_id: u8,
    /// Trace every frame sent and received.
    debug: bool,
}

impl<S: embedded_io::Read + embedded_io::Write> ModbusRtu<S> {
    pub fn new(interface: S, unit_id: u8) -> Self {
        Self {
            interface,
            unit_id,
            debug: false,
        }
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Read `count` consecutive input registers.
    pub fn read_input_registers(
        &mut self,
        address: u16,
        count: u16,
    ) -> Result<heapless::Vec<u16, 128>, TransportError> {
        let mut buff: heapless::Vec<u8, FRAME_LEN> = heapless::Vec::new();
        let mut req = rmodbus::client::ModbusRequest::new(self.unit_id, rmodbus::ModbusProto::Rtu);
        req.generate_get_inputs(address, count, &mut buff)?;

        if self.debug {
            trace!(frame = ?buff.as_slice(), "modbus request");
        }
        self.interface
            .write_all(&buff)
            .map_err(|e| TransportError::Serial(e.kind()))?;

        // Reuse same buffer when reading back
        buff.clear();

        // Keep reading until we have the whole frame or the interface runs dry
        let mut temp_buf = [0u8; 32];
        while buff.len() < expected_frame_len(&buff) {
            match self.interface.read(&mut temp_buf) {
                Ok(0) => break,
                Ok(bytes_read) => {
                    if buff.extend_from_slice(&temp_buf[..bytes_read]).is_err() {
                        return Err(TransportError::BufferOverflow);
                    }
                }
                Err(e) => {
                    // A timeout after a partial frame is left for the parser to reject
                    if matches!(
                        e.kind(),
                        embedded_io::ErrorKind::Other | embedded_io::ErrorKind::TimedOut
                    ) && !buff.is_empty()
                    {
                        break;
                    }
                    return Err(TransportError::Serial(e.kind()));
                }
            }
        }

        if self.debug {
            trace!(frame = ?buff.as_slice(), "modbus response");
        }
        if buff.is_empty() {
            return Err(TransportError::InvalidResponse);
        }

        let mut registers: heapless::Vec<u16, 128> = heapless::Vec::new();
        req.parse_u16(&buff, &mut registers)?;
        if registers.len() < usize::from(count) {
            return Err(TransportError::InvalidResponse);
        }
        Ok(registers)
    }

    /// Read `count` registers and flatten them to bytes, high byte first.
    fn read_bytes(&mut self, address: u16, count: u16) -> Result<Vec<u8>, TransportError> {
        let registers = self.read_input_registers(address, count)?;
        Ok(registers.iter().flat_map(|r| r.to_be_bytes()).collect())
    }

    /// Give back the underlying interface.
    pub fn into_inner(self) -> S {
        self.interface
    }
}

/// Length of the response frame, judged from the bytes received so far.
///
/// Until the byte count is known this asks for the shortest possible frame.
fn expected_frame_len(frame: &[u8]) -> usize {
    const EXCEPTION_LEN: usize = 5;
    match frame {
        [_, func, ..] if func & 0x80 != 0 => EXCEPTION_LEN,
        [_, _, byte_count, ..] => 5 + usize::from(*byte_count),
        _ => EXCEPTION_LEN,
    }
}

impl<S: embedded_io::Read + embedded_io::Write> RegisterTransport for ModbusRtu<S> {
    fn read_float16(&mut self, address: u16, scaler: Scaler) -> Result<f64, TransportError> {
        let raw = self.read_unsigned(address)?;
        Ok(scaler.apply(f64::from(raw)))
    }

    fn read_float32(&mut self, address: u16) -> Result<f64, TransportError> {
        let registers = self.read_input_registers(address, 2)?;
        let raw = (u32::from(registers[0]) << 16) | u32::from(registers[1]);
        Ok(Scaler::UNIT.apply(f64::from(raw)))
    }

    fn read_unsigned(&mut self, address: u16) -> Result<u16, TransportError> {
        let registers = self.read_input_registers(address, 1)?;
        registers.first().copied().ok_or(TransportError::InvalidResponse)
    }

    fn read_octet_string(&mut self, address: u16, length: u16) -> Result<Vec<u8>, TransportError> {
        if length == 0 {
            return Ok(Vec::new());
        }
        if length > MAX_OCTET_STRING_LEN {
            return Err(TransportError::BufferOverflow);
        }
        let mut bytes = self.read_bytes(address, registers_for_bytes(length))?;
        bytes.truncate(usize::from(length));
        Ok(bytes)
    }

    fn read_clock(&mut self) -> Result<EmiClock, TransportError> {
        let bytes = self.read_bytes(CLOCK_REGISTER, CLOCK_REGISTER_COUNT)?;
        let wire: &[u8; EmiClock::WIRE_LEN] = bytes
            .get(..EmiClock::WIRE_LEN)
            .and_then(|b| b.try_into().ok())
            .ok_or(TransportError::InvalidResponse)?;
        Ok(EmiClock::from_wire_bytes(wire))
    }
}
