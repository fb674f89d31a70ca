/*! Binary I/O traits shared by the onion relay crates.

Deserialization is built on `nom`, serialization appends to a `BytesMut`.
*/

#![forbid(unsafe_code)]

pub use bytes::{BufMut, BytesMut};
pub use nom::IResult;

use nom::bytes::streaming::take;
use nom::combinator::map_res;
use nom::number::streaming::{be_u32, be_u8};
use nom::error::{Error as NomError, ErrorKind as NomErrorKind};

#[cfg(feature = "crypto")]
mod crypto;

/// The trait provides method to deserialize struct from raw bytes
pub trait FromBytes: Sized {
    /// Deserialize struct using `nom` from raw bytes
    fn from_bytes(input: &[u8]) -> IResult<&[u8], Self>;
}

/// The trait provides method to serialize struct into raw bytes
pub trait ToBytes {
    /// Serialize struct appending its bytes to `buf`
    fn to_bytes(&self, buf: &mut BytesMut);

    /// Serialize struct into a new `Vec`
    fn to_vec(&self) -> Vec<u8> {
        let mut buf = BytesMut::new();
        self.to_bytes(&mut buf);
        buf.to_vec()
    }
}

/// Parse a byte string prefixed with its length as big endian `u32`.
pub fn length_prefixed(input: &[u8]) -> IResult<&[u8], &[u8]> {
    let (input, len) = be_u32(input)?;
    take(len as usize)(input)
}

/// Write a byte string prefixed with its length as big endian `u32`.
pub fn put_length_prefixed(buf: &mut BytesMut, data: &[u8]) {
    buf.put_u32(data.len() as u32);
    buf.put_slice(data);
}

/// Parse a length prefixed UTF-8 string.
pub fn length_prefixed_string(input: &[u8]) -> IResult<&[u8], String> {
    map_res(length_prefixed, |bytes: &[u8]| String::from_utf8(bytes.to_vec()))(input)
}

/// Parse an optional value encoded as a presence byte (`0` or `1`)
/// followed by the value itself.
pub fn optional<'a, T, F>(mut parser: F) -> impl FnMut(&'a [u8]) -> IResult<&'a [u8], Option<T>>
    where F: FnMut(&'a [u8]) -> IResult<&'a [u8], T>
{
    move |input: &'a [u8]| {
        let (input, present) = be_u8(input)?;
        match present {
            0 => Ok((input, None)),
            1 => {
                let (input, value) = parser(input)?;
                Ok((input, Some(value)))
            },
            _ => Err(nom::Err::Error(NomError::new(input, NomErrorKind::Switch))),
        }
    }
}

/// Write an optional value as a presence byte followed by the value.
pub fn put_optional<T, F>(buf: &mut BytesMut, value: Option<&T>, mut put: F)
    where T: ?Sized, F: FnMut(&mut BytesMut, &T)
{
    match value {
        Some(value) => {
            buf.put_u8(1);
            put(buf, value);
        },
        None => buf.put_u8(0),
    }
}
