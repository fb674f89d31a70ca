/*! Fixed width destination field appended to every layer.
*/

use std::convert::TryFrom;
use std::fmt;

use thiserror::Error;

/// Width of the destination field in bytes.
pub const DESTINATION_FIELD_SIZE: usize = 10;

/// Error that can happen when decoding a destination field.
#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum DestinationError {
    /// Field doesn't have exactly `DESTINATION_FIELD_SIZE` bytes.
    #[error("Destination field must be 10 bytes, got {0}")]
    InvalidLength(usize),
    /// Field contains something other than decimal digits.
    #[error("Destination field contains non digit characters")]
    NotDigits,
    /// Decoded number doesn't fit a port.
    #[error("Destination {0} is not a valid port")]
    PortOutOfRange(u64),
}

/** Next hop of a layer identified by its port.

Serialized form is the port written as 10 decimal digits padded with zeros
from the left, e.g. port `4002` is `0000004002`. The field is always the last
`DESTINATION_FIELD_SIZE` bytes of a decrypted layer so it can be split off
without a delimiter.
*/
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct Destination(pub u16);

impl Destination {
    /// Port this destination points to.
    pub fn port(self) -> u16 {
        self.0
    }

    /// Encode the destination as a fixed width field.
    pub fn encode(self) -> [u8; DESTINATION_FIELD_SIZE] {
        let mut field = [b'0'; DESTINATION_FIELD_SIZE];
        let mut port = self.0;
        for byte in field.iter_mut().rev() {
            *byte = b'0' + (port % 10) as u8;
            port /= 10;
            if port == 0 {
                break;
            }
        }
        field
    }

    /** Decode the destination from a fixed width field.

    Returns `Error` in case of failure:

    - field length differs from `DESTINATION_FIELD_SIZE`
    - field contains non digit characters
    - decoded number is bigger than `u16::MAX`
    */
    pub fn decode(field: &[u8]) -> Result<Destination, DestinationError> {
        if field.len() != DESTINATION_FIELD_SIZE {
            return Err(DestinationError::InvalidLength(field.len()));
        }
        let value = field.iter().try_fold(0u64, |acc, &byte| {
            if byte.is_ascii_digit() {
                Ok(acc * 10 + u64::from(byte - b'0'))
            } else {
                Err(DestinationError::NotDigits)
            }
        })?;
        u16::try_from(value)
            .map(Destination)
            .map_err(|_| DestinationError::PortOutOfRange(value))
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:010}", self.0)
    }
}
