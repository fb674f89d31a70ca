/*! Response packets sent back to the caller of a request.
*/

use std::fmt;

use nom::combinator::map;
use nom::error::{make_error, ErrorKind as NomErrorKind};
use nom::multi::length_count;
use nom::number::streaming::{be_u16, be_u32, be_u8};
use onion_binary_io::*;

use crate::node_record::NodeRecord;

/// Kind of failure reported to the immediate caller of a request.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum ErrorKind {
    /// Fewer than 3 distinct relays are registered.
    InsufficientNodes = 1,
    /// Registry can't be reached.
    RegistryUnavailable = 2,
    /// Layer key can't be opened or layer can't be decrypted.
    CryptoFailure = 3,
    /// Relay keys are not loaded yet.
    KeyUnavailable = 4,
    /// Message can't be parsed.
    MalformedMessage = 5,
    /// Next hop can't be reached or answered with an error.
    ForwardingFailure = 6,
    /// Relay with the same id is already registered.
    DuplicateNode = 7,
}

impl ErrorKind {
    fn from_u8(code: u8) -> Option<ErrorKind> {
        match code {
            1 => Some(ErrorKind::InsufficientNodes),
            2 => Some(ErrorKind::RegistryUnavailable),
            3 => Some(ErrorKind::CryptoFailure),
            4 => Some(ErrorKind::KeyUnavailable),
            5 => Some(ErrorKind::MalformedMessage),
            6 => Some(ErrorKind::ForwardingFailure),
            7 => Some(ErrorKind::DuplicateNode),
            _ => None,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match *self {
            ErrorKind::InsufficientNodes => "insufficient nodes",
            ErrorKind::RegistryUnavailable => "registry unavailable",
            ErrorKind::CryptoFailure => "crypto failure",
            ErrorKind::KeyUnavailable => "key unavailable",
            ErrorKind::MalformedMessage => "malformed message",
            ErrorKind::ForwardingFailure => "forwarding failure",
            ErrorKind::DuplicateNode => "duplicate node",
        };
        f.write_str(name)
    }
}

impl FromBytes for ErrorKind {
    fn from_bytes(input: &[u8]) -> IResult<&[u8], Self> {
        let (rest, code) = be_u8(input)?;
        match ErrorKind::from_u8(code) {
            Some(kind) => Ok((rest, kind)),
            None => Err(nom::Err::Error(make_error(input, NomErrorKind::Switch))),
        }
    }
}

/** Last values seen by a relay or a user.

Relays fill `last_received_encrypted`, `last_received_decrypted` and
`last_destination`, users fill `last_received_message` and
`last_sent_message`.

Serialized form is every field as an optional value in declaration order.
*/
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct DiagnosticsSnapshot {
    /// Last `WrappedMessage` received by a relay
    pub last_received_encrypted: Option<Vec<u8>>,
    /// Inner payload of the last layer peeled by a relay
    pub last_received_decrypted: Option<Vec<u8>>,
    /// Port the last peeled layer was sent to
    pub last_destination: Option<u16>,
    /// Last plaintext delivered to a user
    pub last_received_message: Option<String>,
    /// Last plaintext sent by a user
    pub last_sent_message: Option<String>,
}

impl FromBytes for DiagnosticsSnapshot {
    fn from_bytes(input: &[u8]) -> IResult<&[u8], Self> {
        let (input, last_received_encrypted) = optional(length_prefixed)(input)?;
        let (input, last_received_decrypted) = optional(length_prefixed)(input)?;
        let (input, last_destination) = optional(be_u16)(input)?;
        let (input, last_received_message) = optional(length_prefixed_string)(input)?;
        let (input, last_sent_message) = optional(length_prefixed_string)(input)?;
        Ok((input, DiagnosticsSnapshot {
            last_received_encrypted: last_received_encrypted.map(<[u8]>::to_vec),
            last_received_decrypted: last_received_decrypted.map(<[u8]>::to_vec),
            last_destination,
            last_received_message,
            last_sent_message,
        }))
    }
}

impl ToBytes for DiagnosticsSnapshot {
    fn to_bytes(&self, buf: &mut BytesMut) {
        put_optional(buf, self.last_received_encrypted.as_deref(), put_length_prefixed);
        put_optional(buf, self.last_received_decrypted.as_deref(), put_length_prefixed);
        put_optional(buf, self.last_destination.as_ref(), |buf, port| buf.put_u16(*port));
        put_optional(buf, self.last_received_message.as_deref(), |buf, s: &str| put_length_prefixed(buf, s.as_bytes()));
        put_optional(buf, self.last_sent_message.as_deref(), |buf, s: &str| put_length_prefixed(buf, s.as_bytes()));
    }
}

/** Response to a `Request`.

Serialized form:

Length   | Content
-------- | ------
`1`      | Kind of the response
variable | Body of the response

Kinds:

Kind   | Response       | Body
------ | -------------- | ------
`0x81` | `Live`         | empty
`0x82` | `Registered`   | empty
`0x83` | `NodeRegistry` | `u32` count followed by `NodeRecord`s
`0x84` | `Forwarded`    | empty
`0x85` | `Delivered`    | empty
`0x86` | `Received`     | empty
`0x87` | `Sent`         | empty
`0x88` | `Diagnostics`  | `DiagnosticsSnapshot`
`0xff` | `Error`        | `u8` error code, length prefixed UTF-8 message

*/
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Response {
    /// Service is running.
    Live,
    /// Relay was added to the registry.
    Registered,
    /// All registered relays ordered by node id.
    NodeRegistry(Vec<NodeRecord>),
    /// Peeled layer was accepted by the next relay.
    Forwarded,
    /// Final plaintext was accepted by the recipient user.
    Delivered,
    /// User stored delivered message.
    Received,
    /// Wrapped message was accepted by the first relay of the circuit.
    Sent,
    /// Diagnostics of a relay or a user.
    Diagnostics(DiagnosticsSnapshot),
    /// Request failed.
    Error {
        /// Kind of failure
        kind: ErrorKind,
        /// Human readable description
        message: String,
    },
}

impl Response {
    /// Create `Response::Error` from anything printable.
    pub fn error<E: fmt::Display>(kind: ErrorKind, error: E) -> Response {
        Response::Error { kind, message: error.to_string() }
    }

    fn kind(&self) -> u8 {
        match *self {
            Response::Live => 0x81,
            Response::Registered => 0x82,
            Response::NodeRegistry(_) => 0x83,
            Response::Forwarded => 0x84,
            Response::Delivered => 0x85,
            Response::Received => 0x86,
            Response::Sent => 0x87,
            Response::Diagnostics(_) => 0x88,
            Response::Error { .. } => 0xff,
        }
    }
}

impl FromBytes for Response {
    fn from_bytes(input: &[u8]) -> IResult<&[u8], Self> {
        let (input, kind) = be_u8(input)?;
        match kind {
            0x81 => Ok((input, Response::Live)),
            0x82 => Ok((input, Response::Registered)),
            0x83 => map(length_count(be_u32, NodeRecord::from_bytes), Response::NodeRegistry)(input),
            0x84 => Ok((input, Response::Forwarded)),
            0x85 => Ok((input, Response::Delivered)),
            0x86 => Ok((input, Response::Received)),
            0x87 => Ok((input, Response::Sent)),
            0x88 => map(DiagnosticsSnapshot::from_bytes, Response::Diagnostics)(input),
            0xff => {
                let (input, kind) = ErrorKind::from_bytes(input)?;
                let (input, message) = length_prefixed_string(input)?;
                Ok((input, Response::Error { kind, message }))
            },
            _ => Err(nom::Err::Error(make_error(input, NomErrorKind::Switch))),
        }
    }
}

impl ToBytes for Response {
    fn to_bytes(&self, buf: &mut BytesMut) {
        buf.put_u8(self.kind());
        match *self {
            Response::Live | Response::Registered | Response::Forwarded | Response::Delivered
                | Response::Received | Response::Sent => {},
            Response::NodeRegistry(ref nodes) => {
                buf.put_u32(nodes.len() as u32);
                for node in nodes {
                    node.to_bytes(buf);
                }
            },
            Response::Diagnostics(ref snapshot) => snapshot.to_bytes(buf),
            Response::Error { kind, ref message } => {
                buf.put_u8(kind as u8);
                put_length_prefixed(buf, message.as_bytes());
            },
        }
    }
}
