//! Decimal scalers applied to raw register readings.
//!
//! EMI meters publish most quantities as plain integers together with a
//! scaler, a power of ten that restores the physical value. With a scaler of
//! `-2` the raw reading `98` means `0.98`; with a scaler of `0` the reading is
//! taken as is.

use crate::error::{Error, Result};

/// A decimal exponent that fits in a signed byte, as the meter expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Scaler(i8);

impl Scaler {
    /// No scaling.
    pub const UNIT: Scaler = Scaler(0);

    pub const fn new(exponent: i8) -> Self {
        Self(exponent)
    }

    pub const fn exponent(&self) -> i8 {
        self.0
    }

    /// Apply this scaler to a raw reading.
    ///
    /// Negative exponents divide by the exact power of ten rather than
    /// multiplying by its inexact reciprocal, so `98 @ -2` is the `f64`
    /// closest to `0.98`.
    pub fn apply(&self, raw: f64) -> f64 {
        if self.0 == 0 {
            return raw;
        }
        let factor = 10f64.powi(i32::from(self.0.unsigned_abs()));
        if self.0 < 0 { raw / factor } else { raw * factor }
    }
}

impl TryFrom<i32> for Scaler {
    type Error = Error;

    fn try_from(value: i32) -> Result<Self> {
        i8::try_from(value)
            .map(Scaler)
            .map_err(|_| Error::config(format!("scaler {value} is outside [-128, 127]")))
    }
}
