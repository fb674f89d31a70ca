/*! Errors enum for onion packets.
*/

use nom::error::ErrorKind;
use onion_binary_io::FromBytes;
use onion_crypto::CryptoError;
use thiserror::Error;

use crate::destination::DestinationError;

/// Error that can happen when calling `get_payload` or `open_*` of a
/// `WrappedMessage`.
#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum GetPayloadError {
    /// Sealed layer key can't be opened with our secret key.
    #[error("Open sealed layer key error: {0}")]
    OpenKey(CryptoError),
    /// Layer can't be decrypted with the recovered layer key.
    #[error("Decrypt payload error: {0}")]
    Decrypt(CryptoError),
    /// Decrypted layer is too short to contain destination field.
    #[error("Decrypted payload is too short: {len} bytes")]
    TooShort {
        /// Length of decrypted payload.
        len: usize,
    },
    /// Destination field can't be decoded.
    #[error("Invalid destination field: {0}")]
    Destination(DestinationError),
}

/// Error that can happen when parsing a packet from raw bytes.
#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum DeserializeError {
    /// Not enough data to parse the packet.
    #[error("Incomplete packet of {len} bytes")]
    Incomplete {
        /// Length of received data.
        len: usize,
    },
    /// Data can't be parsed.
    #[error("Deserialize packet error: {error:?}")]
    Invalid {
        /// Parsing error.
        error: ErrorKind,
    },
    /// Packet is followed by unexpected bytes.
    #[error("Packet is followed by {0} trailing bytes")]
    Trailing(usize),
}

/// Parse a packet that must occupy the whole `input`.
pub fn parse_exact<T: FromBytes>(input: &[u8]) -> Result<T, DeserializeError> {
    match T::from_bytes(input) {
        Ok((rest, _)) if !rest.is_empty() => Err(DeserializeError::Trailing(rest.len())),
        Ok((_, value)) => Ok(value),
        Err(nom::Err::Incomplete(_)) => Err(DeserializeError::Incomplete { len: input.len() }),
        Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => Err(DeserializeError::Invalid { error: e.code }),
    }
}
