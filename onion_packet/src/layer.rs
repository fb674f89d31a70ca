/*! WrappedMessage packet with LayerPayload
*/

use nom::combinator::{rest, rest_len, verify};
use onion_binary_io::*;
use onion_crypto::*;
use rand::{CryptoRng, RngCore};

use crate::destination::*;
use crate::errors::*;
use crate::MAX_PACKET_SIZE;

/// Encrypted layer should contain nonce, authentication tag and at least the
/// destination field.
pub const LAYER_MIN_SIZE: usize = NONCE_SIZE + MAC_SIZE + DESTINATION_FIELD_SIZE;

/** Single onion layer as it travels between hops.

Each layer is encrypted with its own `LayerKey`, and the key is sealed to the
`PublicKey` of the relay that should peel this layer.

Serialized form:

Length    | Content
--------- | ------
`4`       | Length of sealed key as big endian `u32`
`104`     | Sealed `LayerKey`
variable  | Encrypted layer

where encrypted layer is `Nonce` followed by encrypted
[`LayerPayload`](./struct.LayerPayload.html)

*/
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct WrappedMessage {
    /// `LayerKey` sealed to the relay `PublicKey`
    pub sealed_key: Vec<u8>,
    /// Encrypted `LayerPayload`
    pub payload: Vec<u8>,
}

impl FromBytes for WrappedMessage {
    fn from_bytes(input: &[u8]) -> IResult<&[u8], Self> {
        let (input, _) = verify(rest_len, |len: &usize| *len <= MAX_PACKET_SIZE)(input)?;
        let (input, sealed_key) = verify(length_prefixed, |key: &[u8]| key.len() == SEALED_KEY_SIZE)(input)?;
        let (input, payload) = verify(rest, |payload: &[u8]| payload.len() >= LAYER_MIN_SIZE)(input)?;
        Ok((input, WrappedMessage {
            sealed_key: sealed_key.to_vec(),
            payload: payload.to_vec(),
        }))
    }
}

impl ToBytes for WrappedMessage {
    fn to_bytes(&self, buf: &mut BytesMut) {
        put_length_prefixed(buf, &self.sealed_key);
        buf.put_slice(&self.payload);
    }
}

impl WrappedMessage {
    /** Create new `WrappedMessage` that can be peeled only by the owner of
    the `SecretKey` matching `relay_pk`.

    Returns `Error` in case of failure:

    - fails to encrypt the layer
    - fails to seal the layer key
    */
    pub fn new<R: RngCore + CryptoRng>(rng: &mut R, relay_pk: &PublicKey, payload: &LayerPayload) -> Result<WrappedMessage, CryptoError> {
        let layer_key = LayerKey::generate(rng);
        let payload = layer_key.encrypt(rng, &payload.to_vec())?;
        let sealed_key = seal_layer_key(rng, relay_pk, &layer_key)?;
        Ok(WrappedMessage { sealed_key, payload })
    }

    /** Recover `LayerKey` of this layer.

    Returns `Error` in case of failure:

    - sealed key wasn't sealed for `sk`
    - sealed key is corrupted
    */
    pub fn open_key(&self, sk: &SecretKey) -> Result<LayerKey, GetPayloadError> {
        open_layer_key(sk, &self.sealed_key).map_err(GetPayloadError::OpenKey)
    }

    /** Decrypt the layer with recovered `LayerKey` and split it into inner
    payload and destination.

    Returns `Error` in case of failure:

    - fails to decrypt
    - decrypted layer is shorter than destination field
    - destination field is invalid
    */
    pub fn open_layer(&self, layer_key: &LayerKey) -> Result<LayerPayload, GetPayloadError> {
        let decrypted = layer_key.decrypt(&self.payload).map_err(GetPayloadError::Decrypt)?;
        LayerPayload::from_plaintext(decrypted)
    }

    /// Peel this layer with relay's `SecretKey`.
    pub fn get_payload(&self, sk: &SecretKey) -> Result<LayerPayload, GetPayloadError> {
        let layer_key = self.open_key(sk)?;
        self.open_layer(&layer_key)
    }
}

/** Unencrypted content of an onion layer.

Inner payload should be sent to the hop listening on `destination`. For
intermediate hops it's a serialized `WrappedMessage`, for the exit hop it's
the final plaintext.

Serialized form:

Length   | Content
-------- | ------
variable | Inner payload
`10`     | `Destination`

*/
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LayerPayload {
    /// Payload for the next hop
    pub inner: Vec<u8>,
    /// Next hop
    pub destination: Destination,
}

impl ToBytes for LayerPayload {
    fn to_bytes(&self, buf: &mut BytesMut) {
        buf.put_slice(&self.inner);
        buf.put_slice(&self.destination.encode());
    }
}

impl LayerPayload {
    /** Split decrypted layer into inner payload and destination. The
    destination is always the last `DESTINATION_FIELD_SIZE` bytes.

    Returns `Error` in case of failure:

    - plaintext is shorter than `DESTINATION_FIELD_SIZE`
    - destination field is invalid
    */
    pub fn from_plaintext(mut plaintext: Vec<u8>) -> Result<LayerPayload, GetPayloadError> {
        let len = plaintext.len();
        if len < DESTINATION_FIELD_SIZE {
            return Err(GetPayloadError::TooShort { len });
        }
        let destination = Destination::decode(&plaintext[len - DESTINATION_FIELD_SIZE..])
            .map_err(GetPayloadError::Destination)?;
        plaintext.truncate(len - DESTINATION_FIELD_SIZE);
        Ok(LayerPayload { inner: plaintext, destination })
    }
}

#[cfg(test)]
mod tests {
    use rand::thread_rng;

    use super::*;

    fn payload(inner: &[u8], port: u16) -> LayerPayload {
        LayerPayload { inner: inner.to_vec(), destination: Destination(port) }
    }

    #[test]
    fn wrapped_message_encode_decode() {
        let message = WrappedMessage {
            sealed_key: vec![42; SEALED_KEY_SIZE],
            payload: vec![43; LAYER_MIN_SIZE + 5],
        };
        let bytes = message.to_vec();
        assert_eq!(&bytes[..4], &(SEALED_KEY_SIZE as u32).to_be_bytes()[..]);
        assert_eq!(parse_exact::<WrappedMessage>(&bytes), Ok(message));
    }

    #[test]
    fn wrapped_message_inconsistent_key_length() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&1000u32.to_be_bytes());
        bytes.extend_from_slice(&[0; 200]);
        assert!(parse_exact::<WrappedMessage>(&bytes).is_err());

        let mut bytes = Vec::new();
        bytes.extend_from_slice(&8u32.to_be_bytes());
        bytes.extend_from_slice(&[0; 200]);
        assert!(matches!(
            parse_exact::<WrappedMessage>(&bytes),
            Err(DeserializeError::Invalid { .. })
        ));
    }

    #[test]
    fn wrapped_message_short_layer() {
        let message = WrappedMessage {
            sealed_key: vec![42; SEALED_KEY_SIZE],
            payload: vec![43; LAYER_MIN_SIZE - 1],
        };
        assert!(parse_exact::<WrappedMessage>(&message.to_vec()).is_err());
    }

    #[test]
    fn wrapped_message_too_short_for_prefix() {
        assert_eq!(
            parse_exact::<WrappedMessage>(&[0, 0]),
            Err(DeserializeError::Incomplete { len: 2 })
        );
    }

    #[test]
    fn layer_payload_split() {
        let layer = LayerPayload::from_plaintext(b"hi0000003007".to_vec()).unwrap();
        assert_eq!(layer, payload(b"hi", 3007));

        let layer = LayerPayload::from_plaintext(b"0000004001".to_vec()).unwrap();
        assert_eq!(layer, payload(b"", 4001));
    }

    #[test]
    fn layer_payload_too_short() {
        assert_eq!(
            LayerPayload::from_plaintext(b"000003007".to_vec()),
            Err(GetPayloadError::TooShort { len: 9 })
        );
    }

    #[test]
    fn layer_payload_invalid_destination() {
        assert_eq!(
            LayerPayload::from_plaintext(b"hello world".to_vec()),
            Err(GetPayloadError::Destination(DestinationError::NotDigits))
        );
    }

    #[test]
    fn wrapped_message_get_payload() {
        let mut rng = thread_rng();
        let relay = RelayKeyPair::generate(&mut rng);
        let layer = payload(b"secret", 3001);

        let message = WrappedMessage::new(&mut rng, &relay.pk, &layer).unwrap();
        assert_eq!(message.sealed_key.len(), SEALED_KEY_SIZE);
        assert_eq!(message.get_payload(&relay.sk).unwrap(), layer);
    }

    #[test]
    fn wrapped_message_get_payload_wrong_key() {
        let mut rng = thread_rng();
        let relay = RelayKeyPair::generate(&mut rng);
        let eve = RelayKeyPair::generate(&mut rng);
        let message = WrappedMessage::new(&mut rng, &relay.pk, &payload(b"secret", 3001)).unwrap();

        assert!(matches!(message.get_payload(&eve.sk), Err(GetPayloadError::OpenKey(_))));
    }

    #[test]
    fn wrapped_message_get_payload_tampered_layer() {
        let mut rng = thread_rng();
        let relay = RelayKeyPair::generate(&mut rng);
        let mut message = WrappedMessage::new(&mut rng, &relay.pk, &payload(b"secret", 3001)).unwrap();
        let last = message.payload.len() - 1;
        message.payload[last] ^= 0xff;

        assert_eq!(message.get_payload(&relay.sk), Err(GetPayloadError::Decrypt(CryptoError::Decrypt)));
    }

    #[test]
    fn nested_layers_peel_in_order() {
        let mut rng = thread_rng();
        let first = RelayKeyPair::generate(&mut rng);
        let second = RelayKeyPair::generate(&mut rng);

        let inner = WrappedMessage::new(&mut rng, &second.pk, &payload(b"hi", 3007)).unwrap();
        let outer = WrappedMessage::new(&mut rng, &first.pk, &payload(&inner.to_vec(), 4002)).unwrap();
        let bytes = outer.to_vec();

        let outer = parse_exact::<WrappedMessage>(&bytes).unwrap();
        let peeled = outer.get_payload(&first.sk).unwrap();
        assert_eq!(peeled.destination, Destination(4002));
        assert!(outer.get_payload(&second.sk).is_err());

        let inner = parse_exact::<WrappedMessage>(&peeled.inner).unwrap();
        let peeled = inner.get_payload(&second.sk).unwrap();
        assert_eq!(peeled, payload(b"hi", 3007));
    }
}
