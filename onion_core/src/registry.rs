/*! Registry of relays and the client used to talk to it.

The registry keeps `NodeRecord`s in memory only. Registration is serialized
under the write lock so a node id can't be registered twice.
*/

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use onion_packet::*;
use thiserror::Error;
use tokio::sync::RwLock;

use crate::config::MAX_ID;
use crate::net::client::{self, ClientError};
use crate::net::server::{self, unsupported, ServeError, Service};

/// Error that can happen when registering a relay.
#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum RegisterError {
    /// Relay with the same id is already registered.
    #[error("Node {0} is already registered")]
    DuplicateNode(u32),
    /// Node id is out of allowed range.
    #[error("Node id {0} is out of range 0..{}", MAX_ID)]
    InvalidNodeId(u32),
}

impl RegisterError {
    /// Kind of this error on the wire.
    pub fn kind(&self) -> ErrorKind {
        match *self {
            RegisterError::DuplicateNode(_) => ErrorKind::DuplicateNode,
            RegisterError::InvalidNodeId(_) => ErrorKind::MalformedMessage,
        }
    }
}

/// In-memory directory of relays.
#[derive(Clone, Default)]
pub struct Registry {
    nodes: Arc<RwLock<BTreeMap<u32, NodeRecord>>>,
}

impl Registry {
    /// Create empty registry.
    pub fn new() -> Self {
        Default::default()
    }

    /// Add relay to the registry. Existing records are never replaced.
    pub async fn register(&self, record: NodeRecord) -> Result<(), RegisterError> {
        if record.node_id >= MAX_ID {
            return Err(RegisterError::InvalidNodeId(record.node_id));
        }

        let mut nodes = self.nodes.write().await;
        if nodes.contains_key(&record.node_id) {
            return Err(RegisterError::DuplicateNode(record.node_id));
        }

        info!("Registered node {}", record.node_id);
        nodes.insert(record.node_id, record);
        Ok(())
    }

    /// All registered relays ordered by node id.
    pub async fn list_nodes(&self) -> Vec<NodeRecord> {
        self.nodes.read().await.values().cloned().collect()
    }

    /// Number of registered relays.
    pub async fn len(&self) -> usize {
        self.nodes.read().await.len()
    }

    /// Check if no relays are registered.
    pub async fn is_empty(&self) -> bool {
        self.nodes.read().await.is_empty()
    }

    /// Serve requests on `addr` until the listener fails.
    pub async fn run(self, addr: SocketAddr, read_timeout: Duration) -> Result<(), ServeError> {
        let listener = server::bind(addr).await?;
        info!("Registry is listening on {}", addr);
        server::serve(listener, self, read_timeout).await
    }

    async fn handle_request(&self, request: Request) -> Response {
        match request {
            Request::Status => Response::Live,
            Request::RegisterNode(record) => match self.register(record).await {
                Ok(()) => Response::Registered,
                Err(e) => {
                    warn!("Failed to register node: {}", e);
                    Response::error(e.kind(), e)
                },
            },
            Request::GetNodeRegistry => Response::NodeRegistry(self.list_nodes().await),
            request => unsupported(&request),
        }
    }
}

impl Service for Registry {
    fn call(&self, request: Request) -> BoxFuture<'static, Response> {
        let registry = self.clone();
        async move { registry.handle_request(request).await }.boxed()
    }
}

/// Client side of the registry.
#[derive(Clone, Copy, Debug)]
pub struct RegistryClient {
    addr: SocketAddr,
    timeout: Duration,
}

impl RegistryClient {
    /// Create client for the registry listening on `addr`.
    pub fn new(addr: SocketAddr, timeout: Duration) -> Self {
        RegistryClient { addr, timeout }
    }

    /// Register relay's `PublicKey`.
    pub async fn register(&self, record: NodeRecord) -> Result<(), ClientError> {
        match client::request(self.addr, Request::RegisterNode(record), self.timeout).await? {
            Response::Registered => Ok(()),
            response => Err(ClientError::UnexpectedResponse(response)),
        }
    }

    /// Fetch all registered relays.
    pub async fn list_nodes(&self) -> Result<Vec<NodeRecord>, ClientError> {
        match client::request(self.addr, Request::GetNodeRegistry, self.timeout).await? {
            Response::NodeRegistry(nodes) => Ok(nodes),
            response => Err(ClientError::UnexpectedResponse(response)),
        }
    }
}
