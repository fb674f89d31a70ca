/*! NodeRecord structure
*/

use nom::number::streaming::be_u32;
use onion_binary_io::*;
use onion_crypto::PublicKey;

/** Relay entry of the registry: node identifier and the long term
`PublicKey` that layer keys are sealed to.

Serialized form:

Length | Content
------ | ------
`4`    | Node id as big endian `u32`
`32`   | `PublicKey`

*/
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct NodeRecord {
    /// Identifier of the relay, its port is derived from it
    pub node_id: u32,
    /// `PublicKey` of the relay
    pub pk: PublicKey,
}

impl NodeRecord {
    /// Create new `NodeRecord`.
    pub fn new(node_id: u32, pk: PublicKey) -> Self {
        NodeRecord { node_id, pk }
    }
}

impl FromBytes for NodeRecord {
    fn from_bytes(input: &[u8]) -> IResult<&[u8], Self> {
        let (input, node_id) = be_u32(input)?;
        let (input, pk) = PublicKey::from_bytes(input)?;
        Ok((input, NodeRecord { node_id, pk }))
    }
}

impl ToBytes for NodeRecord {
    fn to_bytes(&self, buf: &mut BytesMut) {
        buf.put_u32(self.node_id);
        self.pk.to_bytes(buf);
    }
}
