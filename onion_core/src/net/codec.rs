/*! Codecs for framing `Request` and `Response` packets using tokio-io

Every packet is preceded by its length:

Length   | Content
-------- | ------
`4`      | Length of packet as big endian `u32`
variable | `Request` or `Response`

*/

use std::io::Error as IoError;

use bytes::{Buf, BufMut, BytesMut};
use onion_binary_io::*;
use onion_packet::*;
use thiserror::Error;
use tokio_util::codec::{Decoder, Encoder};

/// Size of the length prefix of a frame.
pub const FRAME_HEADER_SIZE: usize = 4;

/// Error that can happen when decoding a packet from bytes.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// Error indicates that we received too big packet.
    #[error("Packet should not be longer than {} bytes: {} bytes", MAX_PACKET_SIZE, len)]
    TooBigPacket {
        /// Length of received packet.
        len: usize,
    },
    /// Error indicates that received packet can't be parsed.
    #[error("Deserialize packet error: {}, packet length: {}", error, packet.len())]
    Deserialize {
        /// Parsing error.
        error: DeserializeError,
        /// Received packet.
        packet: Vec<u8>,
    },
    /// General IO error that can happen with TCP socket.
    #[error("IO Error: {0}")]
    Io(IoError),
}

impl DecodeError {
    pub(crate) fn too_big_packet(len: usize) -> DecodeError {
        DecodeError::TooBigPacket { len }
    }

    pub(crate) fn deserialize(error: DeserializeError, packet: Vec<u8>) -> DecodeError {
        DecodeError::Deserialize { error, packet }
    }
}

/// Error that can happen when encoding a packet to bytes.
#[derive(Debug, Error)]
pub enum EncodeError {
    /// Error indicates that packet is too big to be sent.
    #[error("Packet should not be longer than {} bytes: {} bytes", MAX_PACKET_SIZE, len)]
    TooBigPacket {
        /// Length of serialized packet.
        len: usize,
    },
    /// General IO error that can happen with TCP socket.
    #[error("IO Error: {0}")]
    Io(IoError),
}

impl From<IoError> for DecodeError {
    fn from(error: IoError) -> DecodeError {
        DecodeError::Io(error)
    }
}

impl From<IoError> for EncodeError {
    fn from(error: IoError) -> EncodeError {
        EncodeError::Io(error)
    }
}

fn decode_frame<T: FromBytes>(buf: &mut BytesMut) -> Result<Option<T>, DecodeError> {
    if buf.len() < FRAME_HEADER_SIZE {
        return Ok(None);
    }

    let len = (&buf[..FRAME_HEADER_SIZE]).get_u32() as usize;
    if len > MAX_PACKET_SIZE {
        return Err(DecodeError::too_big_packet(len));
    }

    if buf.len() < FRAME_HEADER_SIZE + len {
        buf.reserve(FRAME_HEADER_SIZE + len - buf.len());
        return Ok(None);
    }

    buf.advance(FRAME_HEADER_SIZE);
    let frame = buf.split_to(len);
    parse_exact::<T>(&frame)
        .map(Some)
        .map_err(|error| DecodeError::deserialize(error, frame.to_vec()))
}

fn encode_frame<T: ToBytes>(packet: &T, buf: &mut BytesMut) -> Result<(), EncodeError> {
    let packet = packet.to_vec();
    if packet.len() > MAX_PACKET_SIZE {
        return Err(EncodeError::TooBigPacket { len: packet.len() });
    }

    buf.reserve(FRAME_HEADER_SIZE + packet.len());
    buf.put_u32(packet.len() as u32);
    buf.extend_from_slice(&packet);
    Ok(())
}

/// Codec used by services: decodes `Request` and encodes `Response`.
#[derive(Clone, Copy, Debug, Default)]
pub struct ServerCodec;

impl Decoder for ServerCodec {
    type Item = Request;
    type Error = DecodeError;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        decode_frame(buf)
    }
}

impl Encoder<Response> for ServerCodec {
    type Error = EncodeError;

    fn encode(&mut self, response: Response, buf: &mut BytesMut) -> Result<(), Self::Error> {
        encode_frame(&response, buf)
    }
}

/// Codec used by clients: encodes `Request` and decodes `Response`.
#[derive(Clone, Copy, Debug, Default)]
pub struct ClientCodec;

impl Decoder for ClientCodec {
    type Item = Response;
    type Error = DecodeError;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        decode_frame(buf)
    }
}

impl Encoder<Request> for ClientCodec {
    type Error = EncodeError;

    fn encode(&mut self, request: Request, buf: &mut BytesMut) -> Result<(), Self::Error> {
        encode_frame(&request, buf)
    }
}
