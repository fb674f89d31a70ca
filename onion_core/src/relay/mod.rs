/*! Relay peeling exactly one layer of every message it receives.

A message goes through the following states:

- received: `WrappedMessage` is parsed from the request
- key recovered: `LayerKey` is opened with the relay's `SecretKey`
- layer opened: layer is decrypted and split into inner payload and
  destination
- accepted: the caller gets `Forwarded` or `Delivered`
- passed on: inner payload is sent to the next relay as a new `OnionMessage`
  or to the user as `DeliverMessage`

Failures before acceptance are reported to the caller by their kind only.
Failures of passing on are logged and counted by this relay and never travel
back along the circuit.
*/

mod errors;

pub use self::errors::*;

use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use onion_crypto::*;
use onion_packet::*;
use rand::thread_rng;
use tokio::net::TcpListener;
use tokio::sync::RwLock;

use crate::config::{Hop, NetworkConfig};
use crate::diagnostics::Diagnostics;
use crate::net::client::{self, ClientError};
use crate::net::server::{self, unsupported, Service};
use crate::registry::RegistryClient;
use crate::stats::Stats;

/// Inner payload of a peeled layer together with the hop it goes to.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PeeledLayer {
    /// Next hop.
    pub hop: Hop,
    /// Port of the next hop.
    pub port: u16,
    /// Request carrying the inner payload.
    pub request: Request,
}

impl PeeledLayer {
    /// Acknowledgment for the caller once the layer is accepted.
    pub fn ack(&self) -> Response {
        match self.hop {
            Hop::Relay(_) => Response::Forwarded,
            Hop::User(_) => Response::Delivered,
        }
    }
}

/// Relay of the onion network.
#[derive(Clone)]
pub struct Relay {
    node_id: u32,
    config: NetworkConfig,
    /// Keys are generated at startup, until then every message fails with
    /// `KeyUnavailable`.
    keys: Arc<RwLock<Option<RelayKeyPair>>>,
    diagnostics: Diagnostics,
    stats: Stats,
}

impl Relay {
    /// Create new relay without keys.
    pub fn new(node_id: u32, config: NetworkConfig) -> Relay {
        Relay {
            node_id,
            config,
            keys: Arc::new(RwLock::new(None)),
            diagnostics: Diagnostics::new(),
            stats: Stats::new(),
        }
    }

    /// Node id of the relay.
    pub fn node_id(&self) -> u32 {
        self.node_id
    }

    /// Diagnostics of the relay.
    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    /// Counters of handled messages.
    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    /// Replace keys of the relay.
    pub async fn set_keys(&self, keys: RelayKeyPair) {
        *self.keys.write().await = Some(keys);
    }

    /// `PublicKey` of the relay if keys are loaded.
    pub async fn public_key(&self) -> Option<PublicKey> {
        self.keys.read().await.as_ref().map(|keys| keys.pk.clone())
    }

    /** Bind the relay port, generate keys and register them.

    Returns the listener that should be passed to `serve`.

    Returns `Error` in case of failure:

    - node id has no port
    - port can't be bound
    - registry can't be reached or refuses the relay
    */
    pub async fn start(&self) -> Result<TcpListener, StartError> {
        let addr = self.config.relay_addr(self.node_id)
            .ok_or(StartError::InvalidNodeId(self.node_id))?;
        let listener = server::bind(addr).await
            .map_err(StartError::Bind)?;

        let keys = RelayKeyPair::generate(&mut thread_rng());
        let pk = keys.pk.clone();
        self.set_keys(keys).await;
        info!("Relay {} public key: {}", self.node_id, export_public_key(&pk));

        let registry = RegistryClient::new(self.config.registry_addr(), self.config.hop_timeout);
        registry.register(NodeRecord::new(self.node_id, pk)).await
            .map_err(|error| StartError::Register { registry, error })?;

        info!("Relay {} is listening on {}", self.node_id, addr);
        Ok(listener)
    }

    /// Start the relay and serve requests until the listener fails.
    pub async fn run(self) -> Result<(), RunError> {
        let listener = self.start().await
            .map_err(RunError::Start)?;
        let read_timeout = self.config.hop_timeout;
        server::serve(listener, self, read_timeout).await
            .map_err(RunError::Serve)
    }

    /** Peel one layer of `payload` and check where the inner payload goes.

    Returns `Error` in case of failure:

    - payload is not a wrapped message
    - keys are not loaded
    - layer key can't be opened or layer can't be decrypted
    - destination is neither a relay nor a user port
    - final payload for a user is not UTF-8
    */
    pub async fn peel(&self, payload: Vec<u8>) -> Result<PeeledLayer, HandleMessageError> {
        let message = parse_exact::<WrappedMessage>(&payload);
        self.diagnostics.set_received_encrypted(payload).await;
        let message = message.map_err(HandleMessageError::Deserialize)?;

        let layer_key = {
            let keys = self.keys.read().await;
            let keys = keys.as_ref().ok_or(HandleMessageError::KeyUnavailable)?;
            message.open_key(&keys.sk).map_err(HandleMessageError::GetPayload)?
        };
        let layer = message.open_layer(&layer_key)
            .map_err(HandleMessageError::GetPayload)?;

        let port = layer.destination.port();
        debug!("Relay {} peeled layer for port {}", self.node_id, port);
        self.diagnostics.set_received_decrypted(layer.inner.clone(), port).await;

        let hop = self.config.ports.classify(port)
            .ok_or(HandleMessageError::InvalidDestination(port))?;
        let request = match hop {
            Hop::Relay(_) => Request::OnionMessage { payload: layer.inner },
            Hop::User(_) => {
                let message = String::from_utf8(layer.inner)
                    .map_err(|_| HandleMessageError::InvalidUtf8)?;
                Request::DeliverMessage { message }
            },
        };
        Ok(PeeledLayer { hop, port, request })
    }

    /** Send the inner payload of a peeled layer to the next hop.

    The call is bounded by the hop timeout. On success the `forwarded` or
    `delivered` counter is increased.
    */
    pub async fn pass_on(&self, layer: PeeledLayer) -> Result<(), PassOnError> {
        let PeeledLayer { hop, port, request } = layer;
        let response = client::request(self.config.addr(port), request, self.config.hop_timeout).await
            .map_err(|error| PassOnError { port, error })?;

        match (hop, response) {
            (Hop::Relay(next), Response::Forwarded | Response::Delivered) => {
                debug!("Relay {} forwarded message to relay {}", self.node_id, next);
                self.stats.counters.increase_forwarded();
            },
            (Hop::User(user), Response::Received) => {
                debug!("Relay {} delivered message to user {}", self.node_id, user);
                self.stats.counters.increase_delivered();
            },
            (_, response) => return Err(PassOnError { port, error: ClientError::UnexpectedResponse(response) }),
        }
        Ok(())
    }

    /** Peel one layer of `payload` and accept it.

    Returns `Response::Forwarded` or `Response::Delivered` as soon as the
    layer is peeled. The inner payload is passed on in a separate task, its
    failure is counted here and doesn't reach the caller.
    */
    pub async fn handle_message(&self, payload: Vec<u8>) -> Result<Response, HandleMessageError> {
        let layer = self.peel(payload).await?;
        let ack = layer.ack();

        let relay = self.clone();
        tokio::spawn(async move {
            if let Err(e) = relay.pass_on(layer).await {
                warn!("Relay {} failed to pass message on: {}", relay.node_id, e);
                relay.stats.counters.increase_failed();
            }
        });

        Ok(ack)
    }

    async fn handle_request(&self, request: Request) -> Response {
        match request {
            Request::Status => Response::Live,
            Request::OnionMessage { payload } => match self.handle_message(payload).await {
                Ok(response) => response,
                Err(e) => {
                    warn!("Relay {} failed to handle message: {}", self.node_id, e);
                    self.stats.counters.increase_failed();
                    let kind = e.kind();
                    Response::error(kind, kind)
                },
            },
            Request::GetDiagnostics => Response::Diagnostics(self.diagnostics.snapshot().await),
            request => unsupported(&request),
        }
    }
}

impl Service for Relay {
    fn call(&self, request: Request) -> BoxFuture<'static, Response> {
        let relay = self.clone();
        async move { relay.handle_request(request).await }.boxed()
    }
}
