/*!
Packets of the onion relay protocol.

[`WrappedMessage`] and [`LayerPayload`] describe a single onion layer,
[`Request`] and [`Response`] are the packets exchanged between the registry,
relays and users.
*/

#![forbid(unsafe_code)]

pub mod destination;
pub mod errors;
pub mod layer;
pub mod node_record;
pub mod request;
pub mod response;

pub use self::destination::*;
pub use self::errors::*;
pub use self::layer::*;
pub use self::node_record::*;
pub use self::request::*;
pub use self::response::*;

/// Maximum size in bytes of a single serialized packet.
pub const MAX_PACKET_SIZE: usize = 16 * 1024 * 1024;
