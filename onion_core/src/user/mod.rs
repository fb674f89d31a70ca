/*! User endpoint: sends messages through circuits and receives messages
delivered by exit relays.
*/

mod errors;

pub use self::errors::*;

use futures::future::BoxFuture;
use futures::FutureExt;
use itertools::Itertools;
use onion_binary_io::ToBytes;
use onion_packet::*;
use rand::thread_rng;
use tokio::net::TcpListener;

use crate::circuit::{Circuit, CircuitError};
use crate::config::NetworkConfig;
use crate::diagnostics::Diagnostics;
use crate::net::client::{self, ClientError};
use crate::net::server::{self, unsupported, Service};
use crate::registry::RegistryClient;

/// User of the onion network.
#[derive(Clone)]
pub struct User {
    user_id: u32,
    config: NetworkConfig,
    registry: RegistryClient,
    diagnostics: Diagnostics,
}

impl User {
    /// Create new user.
    pub fn new(user_id: u32, config: NetworkConfig) -> User {
        User {
            user_id,
            config,
            registry: RegistryClient::new(config.registry_addr(), config.hop_timeout),
            diagnostics: Diagnostics::new(),
        }
    }

    /// User id.
    pub fn user_id(&self) -> u32 {
        self.user_id
    }

    /// Diagnostics of the user.
    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    /// Bind the user port.
    pub async fn start(&self) -> Result<TcpListener, StartError> {
        let addr = self.config.user_addr(self.user_id)
            .ok_or(StartError::InvalidUserId(self.user_id))?;
        let listener = server::bind(addr).await
            .map_err(StartError::Bind)?;
        info!("User {} is listening on {}", self.user_id, addr);
        Ok(listener)
    }

    /// Start the user and serve requests until the listener fails.
    pub async fn run(self) -> Result<(), RunError> {
        let listener = self.start().await
            .map_err(RunError::Start)?;
        let read_timeout = self.config.hop_timeout;
        server::serve(listener, self, read_timeout).await
            .map_err(RunError::Serve)
    }

    /// Store message delivered by an exit relay.
    pub async fn receive(&self, message: String) {
        debug!("User {} received a message", self.user_id);
        self.diagnostics.set_received_message(message).await;
    }

    /** Send `message` to user `destination_user_id` through a fresh circuit.

    Succeeds once the entry relay peeled its layer and accepted the wrapped
    message. Later hops are not awaited, so the registry lookup and the call
    to the entry relay are each bounded by one hop timeout.

    Returns `Error` in case of failure:

    - recipient user id has no port
    - registry can't be reached
    - fewer than 3 distinct relays are registered
    - fails to encrypt a layer
    - entry relay can't be reached or refused the message
    */
    pub async fn send_message(&self, message: String, destination_user_id: u32) -> Result<(), SendMessageError> {
        let destination = self.config.ports.user_port(destination_user_id)
            .map(Destination)
            .ok_or(SendMessageError::InvalidUserId(destination_user_id))?;

        let nodes = self.registry.list_nodes().await
            .map_err(SendMessageError::Registry)?;

        let (entry, wrapped) = {
            let mut rng = thread_rng();
            let circuit = Circuit::select(&mut rng, &nodes)
                .map_err(SendMessageError::Circuit)?;
            debug!(
                "User {} built circuit {}",
                self.user_id,
                circuit.nodes().iter().map(|node| node.node_id).format(" -> ")
            );
            let wrapped = circuit.wrap(&mut rng, &self.config.ports, message.as_bytes(), destination)
                .map_err(SendMessageError::Circuit)?;
            (circuit.entry().node_id, wrapped)
        };

        let addr = self.config.relay_addr(entry)
            .ok_or(SendMessageError::Circuit(CircuitError::InvalidNodeId(entry)))?;
        let request = Request::OnionMessage { payload: wrapped.to_vec() };
        match client::request(addr, request, self.config.hop_timeout).await {
            Ok(Response::Forwarded) | Ok(Response::Delivered) => {},
            Ok(response) => return Err(SendMessageError::Forward {
                node_id: entry,
                error: ClientError::UnexpectedResponse(response),
            }),
            Err(error) => return Err(SendMessageError::Forward { node_id: entry, error }),
        }

        info!("User {} sent message to user {}", self.user_id, destination_user_id);
        self.diagnostics.set_sent_message(message).await;
        Ok(())
    }

    async fn handle_request(&self, request: Request) -> Response {
        match request {
            Request::Status => Response::Live,
            Request::DeliverMessage { message } => {
                self.receive(message).await;
                Response::Received
            },
            Request::SendMessage { message, destination_user_id } => {
                match self.send_message(message, destination_user_id).await {
                    Ok(()) => Response::Sent,
                    Err(e) => {
                        warn!("User {} failed to send message: {}", self.user_id, e);
                        Response::error(e.kind(), e)
                    },
                }
            },
            Request::GetDiagnostics => Response::Diagnostics(self.diagnostics.snapshot().await),
            request => unsupported(&request),
        }
    }
}

impl Service for User {
    fn call(&self, request: Request) -> BoxFuture<'static, Response> {
        let user = self.clone();
        async move { user.handle_request(request).await }.boxed()
    }
}

#[cfg(test)]
mod tests {
    use std::net::{IpAddr, Ipv4Addr, SocketAddr};
    use std::time::Duration;

    use onion_crypto::SecretKey;

    use super::*;
    use crate::config::PortLayout;
    use crate::registry::Registry;

    async fn spawn_registry(registry: Registry) -> u16 {
        let listener = server::bind(SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0)).await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(server::serve(listener, registry, Duration::from_secs(5)));
        port
    }

    fn config(registry_port: u16) -> NetworkConfig {
        NetworkConfig {
            ports: PortLayout { registry_port, ..PortLayout::default() },
            hop_timeout: Duration::from_secs(5),
            ..NetworkConfig::default()
        }
    }

    #[tokio::test]
    async fn receive_message() {
        let user = User::new(7, NetworkConfig::default());
        assert_eq!(user.call(Request::DeliverMessage { message: "hi".to_owned() }).await, Response::Received);

        let snapshot = user.diagnostics().snapshot().await;
        assert_eq!(snapshot.last_received_message, Some("hi".to_owned()));
        assert_eq!(snapshot.last_sent_message, None);
    }

    #[tokio::test]
    async fn status() {
        let user = User::new(1, NetworkConfig::default());
        assert_eq!(user.call(Request::Status).await, Response::Live);
        assert!(matches!(
            user.call(Request::GetNodeRegistry).await,
            Response::Error { kind: ErrorKind::MalformedMessage, .. }
        ));
    }

    #[tokio::test]
    async fn send_to_invalid_user() {
        let user = User::new(1, NetworkConfig::default());
        let error = user.send_message("hi".to_owned(), 1000).await.unwrap_err();
        assert!(matches!(error, SendMessageError::InvalidUserId(1000)));
    }

    #[tokio::test]
    async fn registry_unavailable() {
        let listener = TcpListener::bind(SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0)).await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let user = User::new(1, config(port));
        let response = user.call(Request::SendMessage { message: "hi".to_owned(), destination_user_id: 2 }).await;
        assert!(matches!(response, Response::Error { kind: ErrorKind::RegistryUnavailable, .. }));
    }

    #[tokio::test]
    async fn insufficient_nodes() {
        let registry = Registry::new();
        for id in [1, 2] {
            let pk = SecretKey::generate(&mut thread_rng()).public_key();
            registry.register(NodeRecord::new(id, pk)).await.unwrap();
        }
        let port = spawn_registry(registry).await;

        let user = User::new(1, config(port));
        let error = user.send_message("hi".to_owned(), 2).await.unwrap_err();
        assert_eq!(error.kind(), ErrorKind::InsufficientNodes);
        assert_eq!(user.diagnostics().snapshot().await.last_sent_message, None);
    }
}
