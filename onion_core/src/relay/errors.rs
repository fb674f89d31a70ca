/*! Errors enum for relays.
*/

use onion_packet::*;
use thiserror::Error;

use crate::net::client::ClientError;
use crate::net::server::ServeError;
use crate::registry::RegistryClient;

/// Error that can happen when handling `OnionMessage` request.
#[derive(Debug, Error)]
pub enum HandleMessageError {
    /// Wrapped message can't be parsed.
    #[error("Invalid wrapped message: {0}")]
    Deserialize(DeserializeError),
    /// Relay keys are not generated yet.
    #[error("Relay keys are not loaded")]
    KeyUnavailable,
    /// Layer can't be peeled.
    #[error("Peel layer error: {0}")]
    GetPayload(GetPayloadError),
    /// Destination port is neither a relay nor a user.
    #[error("Destination port {0} is neither a relay nor a user")]
    InvalidDestination(u16),
    /// Final payload is not a valid UTF-8 string.
    #[error("Final payload is not valid UTF-8")]
    InvalidUtf8,
}

impl HandleMessageError {
    /// Kind of this error on the wire.
    pub fn kind(&self) -> ErrorKind {
        match *self {
            HandleMessageError::Deserialize(_) => ErrorKind::MalformedMessage,
            HandleMessageError::KeyUnavailable => ErrorKind::KeyUnavailable,
            HandleMessageError::GetPayload(GetPayloadError::OpenKey(_))
                | HandleMessageError::GetPayload(GetPayloadError::Decrypt(_)) => ErrorKind::CryptoFailure,
            HandleMessageError::GetPayload(_) => ErrorKind::MalformedMessage,
            HandleMessageError::InvalidDestination(_) => ErrorKind::MalformedMessage,
            HandleMessageError::InvalidUtf8 => ErrorKind::MalformedMessage,
        }
    }
}

/// Next hop can't be reached or refused the inner payload. Stays with the
/// relay that made the call.
#[derive(Debug, Error)]
#[error("Pass on to port {port} error: {error}")]
pub struct PassOnError {
    /// Port of the next hop.
    pub port: u16,
    /// Network error.
    pub error: ClientError,
}

/// Error that can happen when starting a relay.
#[derive(Debug, Error)]
pub enum StartError {
    /// Node id has no port.
    #[error("Node id {0} has no port")]
    InvalidNodeId(u32),
    /// Listener can't be bound.
    #[error("Bind error: {0}")]
    Bind(ServeError),
    /// Registry refused the relay or can't be reached.
    #[error("Register at {registry:?} error: {error}")]
    Register {
        /// Registry the relay tried to register at.
        registry: RegistryClient,
        /// Network error.
        error: ClientError,
    },
}

/// Error that can happen when running a relay.
#[derive(Debug, Error)]
pub enum RunError {
    /// Relay failed to start.
    #[error("Start relay error: {0}")]
    Start(StartError),
    /// Relay stopped accepting connections.
    #[error("Serve error: {0}")]
    Serve(ServeError),
}
