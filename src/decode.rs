//! Turns a data load into a [`Measurement`] by reading the registers its type
//! calls for.

use crate::{
    error::{Error, Result},
    scaling::Scaler,
    transport::RegisterTransport,
    types::{DataLoadDescriptor, DataLoadType, Measurement},
};

/// Read and decode one data load.
///
/// Configuration defects (an out of range scaler, an unset type) are reported
/// before anything is sent to the device.
pub fn decode<T: RegisterTransport + ?Sized>(
    descriptor: &DataLoadDescriptor,
    transport: &mut T,
) -> Result<Measurement> {
    let address = descriptor.address;
    let measurement = match descriptor.data_type {
        DataLoadType::Float16 => {
            let scaler = Scaler::try_from(descriptor.scaler)?;
            Measurement::Float(transport.read_float16(address, scaler)?)
        }
        DataLoadType::Float32 => Measurement::Float(transport.read_float32(address)?),
        DataLoadType::Unsigned => Measurement::Unsigned(transport.read_unsigned(address)?),
        DataLoadType::String => {
            let bytes = transport.read_octet_string(address, descriptor.string_length)?;
            Measurement::Text(octets_to_string(&bytes))
        }
        DataLoadType::Clock => Measurement::Timestamp(transport.read_clock()?.to_utc()?),
        DataLoadType::Unset => {
            return Err(Error::config(format!(
                "unsupported data type for data load {:?}",
                descriptor.name
            )));
        }
    };
    Ok(measurement)
}

/// Text carried by an octet string. It ends at the first NUL byte.
fn octets_to_string(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}
