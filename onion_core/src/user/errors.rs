/*! Errors enum for users.
*/

use onion_packet::ErrorKind;
use thiserror::Error;

use crate::circuit::CircuitError;
use crate::net::client::ClientError;
use crate::net::server::ServeError;

/// Error that can happen when sending a message through a circuit.
#[derive(Debug, Error)]
pub enum SendMessageError {
    /// Recipient user id has no port.
    #[error("User id {0} has no port")]
    InvalidUserId(u32),
    /// Registry can't be reached.
    #[error("Fetch node registry error: {0}")]
    Registry(ClientError),
    /// Circuit can't be built.
    #[error("Build circuit error: {0}")]
    Circuit(CircuitError),
    /// Entry relay can't be reached or refused the message.
    #[error("Send to entry node {node_id} error: {error}")]
    Forward {
        /// Node id of the entry relay.
        node_id: u32,
        /// Network error.
        error: ClientError,
    },
}

impl SendMessageError {
    /// Kind of this error on the wire.
    pub fn kind(&self) -> ErrorKind {
        match *self {
            SendMessageError::InvalidUserId(_) => ErrorKind::MalformedMessage,
            SendMessageError::Registry(_) => ErrorKind::RegistryUnavailable,
            SendMessageError::Circuit(ref e) => e.kind(),
            SendMessageError::Forward { .. } => ErrorKind::ForwardingFailure,
        }
    }
}

/// Error that can happen when starting a user.
#[derive(Debug, Error)]
pub enum StartError {
    /// User id has no port.
    #[error("User id {0} has no port")]
    InvalidUserId(u32),
    /// Listener can't be bound.
    #[error("Bind error: {0}")]
    Bind(ServeError),
}

/// Error that can happen when running a user.
#[derive(Debug, Error)]
pub enum RunError {
    /// User failed to start.
    #[error("Start user error: {0}")]
    Start(StartError),
    /// User stopped accepting connections.
    #[error("Serve error: {0}")]
    Serve(ServeError),
}
