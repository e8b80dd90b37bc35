//! A scripted serial line standing in for the meter in unit tests.

use std::collections::VecDeque;

use thiserror::Error;

/// Serial line whose replies are queued up front.
///
/// Every write is recorded. Reads hand out the queued bytes, at most `chunk`
/// at a time, and time out once the queue is empty.
#[derive(Default)]
pub struct MockSerial {
    sent: Vec<u8>,
    pending: VecDeque<u8>,
    /// Largest read returned in one call. `0` means no limit.
    chunk: usize,
    broken: bool,
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineError {
    /// Nothing left to read before the timeout.
    #[error("No reply before timeout")]
    Silent,
    /// The line is gone.
    #[error("Serial line broken")]
    Broken,
}

impl embedded_io::Error for LineError {
    fn kind(&self) -> embedded_io::ErrorKind {
        match self {
            LineError::Silent => embedded_io::ErrorKind::TimedOut,
            LineError::Broken => embedded_io::ErrorKind::BrokenPipe,
        }
    }
}

impl embedded_io::ErrorType for MockSerial {
    type Error = LineError;
}

impl embedded_io::Write for MockSerial {
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        if self.broken {
            return Err(LineError::Broken);
        }
        self.sent.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        if self.broken {
            return Err(LineError::Broken);
        }
        Ok(())
    }
}

impl embedded_io::Read for MockSerial {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        if self.broken {
            return Err(LineError::Broken);
        }
        if self.pending.is_empty() {
            return Err(LineError::Silent);
        }
        let limit = if self.chunk == 0 { usize::MAX } else { self.chunk };
        let count = buf.len().min(self.pending.len()).min(limit);
        for (slot, byte) in buf.iter_mut().zip(self.pending.drain(..count)) {
            *slot = byte;
        }
        Ok(count)
    }
}

impl MockSerial {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver replies in pieces of at most `chunk` bytes.
    pub fn with_chunk(mut self, chunk: usize) -> Self {
        self.chunk = chunk;
        self
    }

    /// Queue bytes for the bridge to read.
    pub fn respond_with(&mut self, bytes: &[u8]) {
        self.pending.extend(bytes);
    }

    /// Make every further read and write fail.
    pub fn break_line(&mut self) {
        self.broken = true;
    }

    /// Everything written so far.
    pub fn written_data(&self) -> &[u8] {
        &self.sent
    }
}

/// Modbus CRC-16 (polynomial 0xA001, initial value 0xFFFF).
pub fn crc16(data: &[u8]) -> u16 {
    data.iter().fold(0xFFFF_u16, |crc, &byte| {
        (0..8).fold(crc ^ u16::from(byte), |crc, _| {
            if crc & 1 != 0 { (crc >> 1) ^ 0xA001 } else { crc >> 1 }
        })
    })
}

/// Append the CRC to a frame body, low byte first as sent on the line.
pub fn rtu_frame(body: &[u8]) -> Vec<u8> {
    let mut frame = body.to_vec();
    frame.extend_from_slice(&crc16(body).to_le_bytes());
    frame
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_io::{Error as _, Read, Write};

    #[test]
    fn test_crc_known_frames() {
        // CRC calculated using: https://homepages.plus.net/dougrice/dev/modbus/crc.html
        assert_eq!(
            rtu_frame(&[0x01, 0x03, 0x00, 0x20, 0x00, 0x01]),
            [0x01, 0x03, 0x00, 0x20, 0x00, 0x01, 0x85, 0xC0]
        );
        assert_eq!(
            rtu_frame(&[0x01, 0x03, 0x02, 0x56, 0x78]),
            [0x01, 0x03, 0x02, 0x56, 0x78, 0x87, 0xC6]
        );
    }

    #[test]
    fn test_writes_are_recorded() {
        let mut line = MockSerial::new();
        line.write_all(&[0x01, 0x04]).unwrap();
        line.write_all(&[0x00, 0x0C]).unwrap();
        assert_eq!(line.written_data(), &[0x01, 0x04, 0x00, 0x0C]);
    }

    #[test]
    fn test_reply_in_chunks_then_silence() {
        let mut line = MockSerial::new().with_chunk(3);
        line.respond_with(&[1, 2, 3, 4, 5]);

        let mut buf = [0u8; 8];
        assert_eq!(line.read(&mut buf).unwrap(), 3);
        assert_eq!(&buf[..3], &[1, 2, 3]);
        assert_eq!(line.read(&mut buf).unwrap(), 2);
        assert_eq!(&buf[..2], &[4, 5]);

        let err = line.read(&mut buf).unwrap_err();
        assert_eq!(err, LineError::Silent);
        assert_eq!(err.kind(), embedded_io::ErrorKind::TimedOut);
    }

    #[test]
    fn test_broken_line() {
        let mut line = MockSerial::new();
        line.respond_with(b"data");
        line.break_line();

        assert_eq!(line.write(b"x"), Err(LineError::Broken));
        assert!(line.flush().is_err());
        assert!(line.written_data().is_empty());
        assert_eq!(line.read(&mut [0u8; 4]), Err(LineError::Broken));
        assert_eq!(LineError::Broken.kind(), embedded_io::ErrorKind::BrokenPipe);
        assert_eq!(LineError::Broken.to_string(), "Serial line broken");
    }
}
