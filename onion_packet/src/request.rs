/*! Request packets received by the registry, relays and users.
*/

use nom::combinator::map;
use nom::error::{make_error, ErrorKind};
use nom::number::streaming::{be_u32, be_u8};
use onion_binary_io::*;

use crate::node_record::NodeRecord;

/** Request sent to one of the services of the network.

Serialized form:

Length   | Content
-------- | ------
`1`      | Kind of the request
variable | Body of the request

Kinds:

Kind   | Request           | Body
------ | ----------------- | ------
`0x01` | `Status`          | empty
`0x02` | `RegisterNode`    | `NodeRecord`
`0x03` | `GetNodeRegistry` | empty
`0x04` | `OnionMessage`    | length prefixed `WrappedMessage` bytes
`0x05` | `DeliverMessage`  | length prefixed UTF-8 message
`0x06` | `SendMessage`     | length prefixed UTF-8 message, `u32` user id
`0x07` | `GetDiagnostics`  | empty

*/
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Request {
    /// Liveness check, answered with `Response::Live`.
    Status,
    /// Register relay's `PublicKey` in the registry.
    RegisterNode(NodeRecord),
    /// Ask the registry for all registered relays.
    GetNodeRegistry,
    /// Onion layer for a relay. The payload is kept raw since parsing it is
    /// the first step of peeling.
    OnionMessage {
        /// Serialized `WrappedMessage`
        payload: Vec<u8>,
    },
    /// Final plaintext delivered to a user by the exit relay.
    DeliverMessage {
        /// Plaintext message
        message: String,
    },
    /// Ask a user to send a message to another user through a circuit.
    SendMessage {
        /// Plaintext message
        message: String,
        /// Recipient user id
        destination_user_id: u32,
    },
    /// Ask a relay or a user for its diagnostics snapshot.
    GetDiagnostics,
}

impl Request {
    fn kind(&self) -> u8 {
        match *self {
            Request::Status => 0x01,
            Request::RegisterNode(_) => 0x02,
            Request::GetNodeRegistry => 0x03,
            Request::OnionMessage { .. } => 0x04,
            Request::DeliverMessage { .. } => 0x05,
            Request::SendMessage { .. } => 0x06,
            Request::GetDiagnostics => 0x07,
        }
    }
}

impl FromBytes for Request {
    fn from_bytes(input: &[u8]) -> IResult<&[u8], Self> {
        let (input, kind) = be_u8(input)?;
        match kind {
            0x01 => Ok((input, Request::Status)),
            0x02 => map(NodeRecord::from_bytes, Request::RegisterNode)(input),
            0x03 => Ok((input, Request::GetNodeRegistry)),
            0x04 => map(length_prefixed, |payload: &[u8]| Request::OnionMessage {
                payload: payload.to_vec(),
            })(input),
            0x05 => map(length_prefixed_string, |message| Request::DeliverMessage { message })(input),
            0x06 => {
                let (input, message) = length_prefixed_string(input)?;
                let (input, destination_user_id) = be_u32(input)?;
                Ok((input, Request::SendMessage { message, destination_user_id }))
            },
            0x07 => Ok((input, Request::GetDiagnostics)),
            _ => Err(nom::Err::Error(make_error(input, ErrorKind::Switch))),
        }
    }
}

impl ToBytes for Request {
    fn to_bytes(&self, buf: &mut BytesMut) {
        buf.put_u8(self.kind());
        match *self {
            Request::Status | Request::GetNodeRegistry | Request::GetDiagnostics => {},
            Request::RegisterNode(ref record) => record.to_bytes(buf),
            Request::OnionMessage { ref payload } => put_length_prefixed(buf, payload),
            Request::DeliverMessage { ref message } => put_length_prefixed(buf, message.as_bytes()),
            Request::SendMessage { ref message, destination_user_id } => {
                put_length_prefixed(buf, message.as_bytes());
                buf.put_u32(destination_user_id);
            },
        }
    }
}
