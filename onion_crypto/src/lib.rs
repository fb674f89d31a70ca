/*! Key material and primitives used to build onion layers.

Every layer of a wrapped message is encrypted with a fresh symmetric
[`LayerKey`] (XSalsa20Poly1305). The layer key itself is sealed to the
relay's long term `PublicKey` using an ephemeral key pair and `SalsaBox`, so
only the owner of the matching `SecretKey` can recover it.
*/

#![forbid(unsafe_code)]

use crypto_box::SalsaBox;
use crypto_box::aead::generic_array::GenericArray;
use rand::{CryptoRng, RngCore};
use thiserror::Error;
use xsalsa20poly1305::XSalsa20Poly1305;
use xsalsa20poly1305::aead::{Aead, AeadCore, KeyInit};
use zeroize::Zeroizing;

pub use crypto_box::{PublicKey, SecretKey, KEY_SIZE};

/// Size of nonce used by both `SalsaBox` and `XSalsa20Poly1305`.
pub const NONCE_SIZE: usize = 24;
/// Size of authentication tag appended to every ciphertext.
pub const MAC_SIZE: usize = 16;
/// Size of symmetric key used to encrypt a single layer.
pub const LAYER_KEY_SIZE: usize = 32;
/// Size of sealed `LayerKey`: ephemeral `PublicKey`, nonce and encrypted key.
/// It doesn't depend on the recipient's key.
pub const SEALED_KEY_SIZE: usize = KEY_SIZE + NONCE_SIZE + LAYER_KEY_SIZE + MAC_SIZE;

/// Error that can happen while handling key material or encrypted data.
#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum CryptoError {
    /// Key has wrong length.
    #[error("Invalid key length: expected {expected}, got {got}")]
    InvalidKeyLength {
        /// Expected length in bytes.
        expected: usize,
        /// Actual length in bytes.
        got: usize,
    },
    /// Sealed `LayerKey` has wrong length.
    #[error("Invalid sealed key length: {0}")]
    InvalidSealedKey(usize),
    /// Ciphertext is too short to contain nonce and tag.
    #[error("Ciphertext is too short: {0} bytes")]
    CiphertextTooShort(usize),
    /// Encryption failed.
    #[error("Encryption error")]
    Encrypt,
    /// Decryption failed: wrong key or tampered data.
    #[error("Decryption error")]
    Decrypt,
}

/// Long term key pair of a relay. It lives in memory only for the whole
/// lifetime of the relay.
#[derive(Clone)]
pub struct RelayKeyPair {
    /// Public key that is announced to the registry.
    pub pk: PublicKey,
    /// Secret key used to open sealed layer keys.
    pub sk: SecretKey,
}

impl RelayKeyPair {
    /// Generate new random key pair.
    pub fn generate<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        let sk = SecretKey::generate(rng);
        let pk = sk.public_key();
        RelayKeyPair { pk, sk }
    }
}

/// Export `PublicKey` as upper case hex string.
pub fn export_public_key(pk: &PublicKey) -> String {
    hex::encode(pk.as_bytes()).to_uppercase()
}

/** Symmetric key of one onion layer.

The key is generated for a single layer of a single message and is zeroed
when dropped.
*/
#[derive(Clone)]
pub struct LayerKey(Zeroizing<[u8; LAYER_KEY_SIZE]>);

impl LayerKey {
    /// Generate new random `LayerKey`.
    pub fn generate<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        let mut key = Zeroizing::new([0; LAYER_KEY_SIZE]);
        rng.fill_bytes(&mut key[..]);
        LayerKey(key)
    }

    /// Create `LayerKey` from raw bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, CryptoError> {
        let key: [u8; LAYER_KEY_SIZE] = bytes.try_into()
            .map_err(|_| CryptoError::InvalidKeyLength { expected: LAYER_KEY_SIZE, got: bytes.len() })?;
        Ok(LayerKey(Zeroizing::new(key)))
    }

    /// Raw bytes of the key.
    pub fn as_bytes(&self) -> &[u8; LAYER_KEY_SIZE] {
        &self.0
    }

    fn cipher(&self) -> XSalsa20Poly1305 {
        XSalsa20Poly1305::new(GenericArray::from_slice(&self.0[..]))
    }

    /** Encrypt data with this key.

    Output is random nonce followed by ciphertext with authentication tag.
    */
    pub fn encrypt<R: RngCore + CryptoRng>(&self, rng: &mut R, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let nonce = XSalsa20Poly1305::generate_nonce(&mut *rng);
        let ciphertext = self.cipher().encrypt(&nonce, plaintext)
            .map_err(|_| CryptoError::Encrypt)?;

        let mut output = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        output.extend_from_slice(nonce.as_slice());
        output.extend_from_slice(&ciphertext);
        Ok(output)
    }

    /** Decrypt data produced by [`LayerKey::encrypt`].

    Returns `Error` in case of failure:

    - data is shorter than nonce and tag
    - fails to decrypt
    */
    pub fn decrypt(&self, data: &[u8]) -> Result<Vec<u8>, CryptoError> {
        if data.len() < NONCE_SIZE + MAC_SIZE {
            return Err(CryptoError::CiphertextTooShort(data.len()));
        }
        let (nonce, ciphertext) = data.split_at(NONCE_SIZE);
        self.cipher().decrypt(GenericArray::from_slice(nonce), ciphertext)
            .map_err(|_| CryptoError::Decrypt)
    }
}

/** Seal `LayerKey` so that only the owner of `recipient`'s secret key can open
it.

Serialized form:

Length   | Content
-------- | ------
`32`     | Ephemeral `PublicKey`
`24`     | Nonce
`48`     | Encrypted `LayerKey` with tag
*/
pub fn seal_layer_key<R: RngCore + CryptoRng>(rng: &mut R, recipient: &PublicKey, key: &LayerKey) -> Result<Vec<u8>, CryptoError> {
    let ephemeral_sk = SecretKey::generate(rng);
    let ephemeral_pk = ephemeral_sk.public_key();
    let salsa_box = SalsaBox::new(recipient, &ephemeral_sk);
    let nonce = SalsaBox::generate_nonce(&mut *rng);
    let encrypted = salsa_box.encrypt(&nonce, &key.as_bytes()[..])
        .map_err(|_| CryptoError::Encrypt)?;

    let mut sealed = Vec::with_capacity(SEALED_KEY_SIZE);
    sealed.extend_from_slice(ephemeral_pk.as_bytes());
    sealed.extend_from_slice(nonce.as_slice());
    sealed.extend_from_slice(&encrypted);
    Ok(sealed)
}

/** Open `LayerKey` sealed with [`seal_layer_key`].

Returns `Error` in case of failure:

- sealed key has wrong length
- fails to decrypt, e.g. it was sealed for another relay
*/
pub fn open_layer_key(sk: &SecretKey, sealed: &[u8]) -> Result<LayerKey, CryptoError> {
    if sealed.len() != SEALED_KEY_SIZE {
        return Err(CryptoError::InvalidSealedKey(sealed.len()));
    }
    let (ephemeral_pk, rest) = sealed.split_at(KEY_SIZE);
    let (nonce, encrypted) = rest.split_at(NONCE_SIZE);
    let ephemeral_pk: [u8; KEY_SIZE] = ephemeral_pk.try_into()
        .map_err(|_| CryptoError::InvalidSealedKey(sealed.len()))?;
    let salsa_box = SalsaBox::new(&PublicKey::from(ephemeral_pk), sk);
    let key = Zeroizing::new(
        salsa_box.decrypt(GenericArray::from_slice(nonce), encrypted)
            .map_err(|_| CryptoError::Decrypt)?
    );
    LayerKey::from_slice(&key)
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use rand::thread_rng;

    #[test]
    fn layer_key_encrypt_decrypt() {
        let mut rng = thread_rng();
        let key = LayerKey::generate(&mut rng);
        let encrypted = key.encrypt(&mut rng, b"hello onion").unwrap();
        assert_eq!(encrypted.len(), NONCE_SIZE + b"hello onion".len() + MAC_SIZE);
        assert_eq!(key.decrypt(&encrypted).unwrap(), b"hello onion".to_vec());
    }

    #[test]
    fn layer_key_encrypt_empty() {
        let mut rng = thread_rng();
        let key = LayerKey::generate(&mut rng);
        let encrypted = key.encrypt(&mut rng, &[]).unwrap();
        assert!(key.decrypt(&encrypted).unwrap().is_empty());
    }

    #[test]
    fn layer_key_decrypt_wrong_key() {
        let mut rng = thread_rng();
        let key = LayerKey::generate(&mut rng);
        let eve_key = LayerKey::generate(&mut rng);
        let encrypted = key.encrypt(&mut rng, b"secret").unwrap();
        assert_eq!(eve_key.decrypt(&encrypted), Err(CryptoError::Decrypt));
    }

    #[test]
    fn layer_key_decrypt_tampered() {
        let mut rng = thread_rng();
        let key = LayerKey::generate(&mut rng);
        let mut encrypted = key.encrypt(&mut rng, b"secret").unwrap();
        let last = encrypted.len() - 1;
        encrypted[last] ^= 0x01;
        assert_eq!(key.decrypt(&encrypted), Err(CryptoError::Decrypt));
    }

    #[test]
    fn layer_key_decrypt_too_short() {
        let key = LayerKey::generate(&mut thread_rng());
        assert_eq!(key.decrypt(&[0; 10]), Err(CryptoError::CiphertextTooShort(10)));
    }

    #[test]
    fn layer_key_from_slice_invalid() {
        assert!(matches!(
            LayerKey::from_slice(&[1, 2, 3]),
            Err(CryptoError::InvalidKeyLength { expected: LAYER_KEY_SIZE, got: 3 })
        ));
    }

    #[test]
    fn seal_open_layer_key() {
        let mut rng = thread_rng();
        let relay = RelayKeyPair::generate(&mut rng);
        let key = LayerKey::generate(&mut rng);
        let sealed = seal_layer_key(&mut rng, &relay.pk, &key).unwrap();
        assert_eq!(sealed.len(), SEALED_KEY_SIZE);

        let opened = open_layer_key(&relay.sk, &sealed).unwrap();
        assert_eq!(opened.as_bytes(), key.as_bytes());
    }

    #[test]
    fn open_layer_key_wrong_relay() {
        let mut rng = thread_rng();
        let relay = RelayKeyPair::generate(&mut rng);
        let eve = RelayKeyPair::generate(&mut rng);
        let key = LayerKey::generate(&mut rng);
        let sealed = seal_layer_key(&mut rng, &relay.pk, &key).unwrap();

        assert!(matches!(open_layer_key(&eve.sk, &sealed), Err(CryptoError::Decrypt)));
    }

    #[test]
    fn open_layer_key_invalid_length() {
        let relay = RelayKeyPair::generate(&mut thread_rng());
        assert!(matches!(
            open_layer_key(&relay.sk, &[0; SEALED_KEY_SIZE - 1]),
            Err(CryptoError::InvalidSealedKey(len)) if len == SEALED_KEY_SIZE - 1
        ));
    }

    #[test]
    fn export_public_key_hex() {
        let pk = PublicKey::from([0xab; KEY_SIZE]);
        assert_eq!(export_public_key(&pk), "AB".repeat(KEY_SIZE));
    }
}
