//! Register addressing on EMI meters.

use crate::error::{Error, Result};

/// Input register holding the device clock structure.
pub const CLOCK_REGISTER: u16 = 0x0001;

/// Number of input registers covering the clock structure (12 bytes).
pub const CLOCK_REGISTER_COUNT: u16 = 6;

/// Largest octet string we request in a single read.
///
/// A Modbus RTU response carries at most 250 data bytes.
pub const MAX_OCTET_STRING_LEN: u16 = 250;

/// Resolve a register address written as a hex literal.
///
/// Both `"1A"` and `"0x1A"` resolve to `26`. Anything that is not a hex
/// number within 16 bits is rejected.
pub fn parse_address(text: &str) -> Result<u16> {
    let trimmed = text.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);

    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(Error::config(format!(
            "address {text:?} is not a valid hexadecimal number"
        )));
    }

    u16::from_str_radix(digits, 16)
        .map_err(|_| Error::config(format!("address {text:?} does not fit in 16 bits")))
}

/// Number of registers needed to carry `len` bytes.
pub const fn registers_for_bytes(len: u16) -> u16 {
    len.div_ceil(2)
}
