/*! Circuit selection and layered encryption on the sender side.
*/

use std::collections::BTreeMap;

use onion_binary_io::ToBytes;
use onion_crypto::CryptoError;
use onion_packet::*;
use rand::seq::SliceRandom;
use rand::{CryptoRng, Rng, RngCore};
use thiserror::Error;

use crate::config::PortLayout;

/// Number of relays in a circuit.
pub const CIRCUIT_LEN: usize = 3;

/// Error that can happen when building a circuit or wrapping a message.
#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum CircuitError {
    /// Fewer than `CIRCUIT_LEN` distinct relays are known.
    #[error("Need {} distinct nodes to build a circuit, {available} available", CIRCUIT_LEN)]
    InsufficientNodes {
        /// Number of distinct relays.
        available: usize,
    },
    /// Relay id has no port.
    #[error("Node id {0} has no port")]
    InvalidNodeId(u32),
    /// Layer can't be encrypted.
    #[error("Encrypt layer error: {0}")]
    Crypto(CryptoError),
}

impl CircuitError {
    /// Kind of this error on the wire.
    pub fn kind(&self) -> ErrorKind {
        match *self {
            CircuitError::InsufficientNodes { .. } => ErrorKind::InsufficientNodes,
            CircuitError::InvalidNodeId(_) => ErrorKind::MalformedMessage,
            CircuitError::Crypto(_) => ErrorKind::CryptoFailure,
        }
    }
}

/// Ordered relays a message passes through. Always `CIRCUIT_LEN` relays with
/// distinct node ids.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Circuit {
    nodes: Vec<NodeRecord>,
}

impl Circuit {
    /** Pick `CIRCUIT_LEN` distinct relays uniformly at random.

    Records with repeated node id are collapsed to the first one before
    sampling.

    Returns `Error` in case of failure:

    - fewer than `CIRCUIT_LEN` distinct relays
    */
    pub fn select<R: Rng + ?Sized>(rng: &mut R, nodes: &[NodeRecord]) -> Result<Circuit, CircuitError> {
        let mut distinct = BTreeMap::new();
        for node in nodes {
            distinct.entry(node.node_id).or_insert(node);
        }
        let distinct = distinct.into_values().collect::<Vec<_>>();

        if distinct.len() < CIRCUIT_LEN {
            return Err(CircuitError::InsufficientNodes { available: distinct.len() });
        }

        let nodes = distinct
            .choose_multiple(rng, CIRCUIT_LEN)
            .map(|&node| node.clone())
            .collect();
        Ok(Circuit { nodes })
    }

    /// Relays of the circuit from entry to exit.
    pub fn nodes(&self) -> &[NodeRecord] {
        &self.nodes
    }

    /// First relay of the circuit.
    pub fn entry(&self) -> &NodeRecord {
        &self.nodes[0]
    }

    /** Wrap `message` in one layer per relay, from the exit relay to the
    entry relay. The exit layer points to `destination`, every other layer
    points to the port of the following relay.

    Returns `Error` in case of failure:

    - relay id has no port
    - fails to encrypt a layer
    */
    pub fn wrap<R: RngCore + CryptoRng>(
        &self,
        rng: &mut R,
        ports: &PortLayout,
        message: &[u8],
        destination: Destination,
    ) -> Result<WrappedMessage, CircuitError> {
        let (entry, rest) = self.nodes.split_first()
            .ok_or(CircuitError::InsufficientNodes { available: 0 })?;

        let mut inner = message.to_vec();
        let mut destination = destination;
        for node in rest.iter().rev() {
            let layer = WrappedMessage::new(rng, &node.pk, &LayerPayload { inner, destination })
                .map_err(CircuitError::Crypto)?;
            inner = layer.to_vec();
            destination = ports.relay_port(node.node_id)
                .map(Destination)
                .ok_or(CircuitError::InvalidNodeId(node.node_id))?;
        }

        WrappedMessage::new(rng, &entry.pk, &LayerPayload { inner, destination })
            .map_err(CircuitError::Crypto)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use onion_crypto::{RelayKeyPair, SecretKey};
    use rand::thread_rng;

    use super::*;

    fn relays(ids: &[u32]) -> Vec<(NodeRecord, SecretKey)> {
        let mut rng = thread_rng();
        ids.iter()
            .map(|&id| {
                let keys = RelayKeyPair::generate(&mut rng);
                (NodeRecord::new(id, keys.pk), keys.sk)
            })
            .collect()
    }

    #[test]
    fn select_distinct_nodes() {
        let relays = relays(&[1, 2, 3, 4]);
        let records: Vec<_> = relays.iter().map(|(record, _)| record.clone()).collect();
        let mut rng = thread_rng();

        for _ in 0..100 {
            let circuit = Circuit::select(&mut rng, &records).unwrap();
            let ids: HashSet<_> = circuit.nodes().iter().map(|node| node.node_id).collect();
            assert_eq!(circuit.nodes().len(), CIRCUIT_LEN);
            assert_eq!(ids.len(), CIRCUIT_LEN);
            assert!(ids.iter().all(|id| (1..=4).contains(id)));
        }
    }

    #[test]
    fn select_uses_every_node() {
        let relays = relays(&[1, 2, 3, 4]);
        let records: Vec<_> = relays.iter().map(|(record, _)| record.clone()).collect();
        let mut rng = thread_rng();

        let mut seen = HashSet::new();
        for _ in 0..200 {
            let circuit = Circuit::select(&mut rng, &records).unwrap();
            seen.insert(circuit.entry().node_id);
        }
        assert_eq!(seen.len(), 4);
    }

    #[test]
    fn select_insufficient_nodes() {
        let relays = relays(&[1, 2]);
        let records: Vec<_> = relays.iter().map(|(record, _)| record.clone()).collect();
        let error = Circuit::select(&mut thread_rng(), &records).unwrap_err();
        assert_eq!(error, CircuitError::InsufficientNodes { available: 2 });
        assert_eq!(error.kind(), ErrorKind::InsufficientNodes);

        assert_eq!(
            Circuit::select(&mut thread_rng(), &[]),
            Err(CircuitError::InsufficientNodes { available: 0 })
        );
    }

    #[test]
    fn select_deduplicates() {
        let relays = relays(&[1, 1, 2, 2]);
        let records: Vec<_> = relays.iter().map(|(record, _)| record.clone()).collect();
        assert_eq!(
            Circuit::select(&mut thread_rng(), &records),
            Err(CircuitError::InsufficientNodes { available: 2 })
        );
    }

    #[test]
    fn wrap_and_peel() {
        let relays = relays(&[1, 2, 3, 4]);
        let records: Vec<_> = relays.iter().map(|(record, _)| record.clone()).collect();
        let ports = PortLayout::default();
        let mut rng = thread_rng();

        let circuit = Circuit::select(&mut rng, &records).unwrap();
        let destination = Destination(ports.user_port(7).unwrap());
        let mut message = circuit.wrap(&mut rng, &ports, b"hi", destination).unwrap();

        let secret_key = |id: u32| &relays.iter().find(|(record, _)| record.node_id == id).unwrap().1;

        for (i, node) in circuit.nodes().iter().enumerate() {
            let layer = message.get_payload(secret_key(node.node_id)).unwrap();
            if i + 1 < CIRCUIT_LEN {
                let next = &circuit.nodes()[i + 1];
                assert_eq!(layer.destination, Destination(ports.relay_port(next.node_id).unwrap()));
                message = parse_exact::<WrappedMessage>(&layer.inner).unwrap();
            } else {
                assert_eq!(layer.destination, Destination(3007));
                assert_eq!(layer.inner, b"hi".to_vec());
            }
        }
    }

    #[test]
    fn wrap_layers_need_their_own_keys() {
        let relays = relays(&[1, 2, 3]);
        let records: Vec<_> = relays.iter().map(|(record, _)| record.clone()).collect();
        let ports = PortLayout::default();
        let mut rng = thread_rng();

        let circuit = Circuit::select(&mut rng, &records).unwrap();
        let message = circuit.wrap(&mut rng, &ports, b"hi", Destination(3001)).unwrap();

        let entry = circuit.entry().node_id;
        for (record, sk) in &relays {
            let result = message.get_payload(sk);
            assert_eq!(result.is_ok(), record.node_id == entry);
        }
    }

    #[test]
    fn wrap_invalid_node_id() {
        let relays = relays(&[1, 2, 5000]);
        let records: Vec<_> = relays.iter().map(|(record, _)| record.clone()).collect();
        let ports = PortLayout::default();
        let mut rng = thread_rng();

        let circuit = Circuit::select(&mut rng, &records).unwrap();
        let result = circuit.wrap(&mut rng, &ports, b"hi", Destination(3001));
        if circuit.entry().node_id == 5000 {
            assert!(result.is_ok());
        } else {
            assert_eq!(result, Err(CircuitError::InvalidNodeId(5000)));
        }
    }
}
