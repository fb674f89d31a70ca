/*! Accept loop shared by the registry, relays and users.
*/

use std::io::Error as IoError;
use std::net::SocketAddr;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::{SinkExt, StreamExt};
use onion_packet::*;
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::time;
use tokio_util::codec::Framed;

use crate::net::codec::*;

/// Handler of requests received by a service.
pub trait Service: Clone + Send + Sync + 'static {
    /// Handle a single request. Failures are reported as `Response::Error`.
    fn call(&self, request: Request) -> BoxFuture<'static, Response>;
}

/// Error that can happen when running a service.
#[derive(Debug, Error)]
pub enum ServeError {
    /// Failed to bind the listener.
    #[error("Failed to bind {addr}: {error}")]
    Bind {
        /// Address we tried to bind.
        addr: SocketAddr,
        /// IO error.
        error: IoError,
    },
    /// Failed to accept incoming connection.
    #[error("Failed to accept connection: {0}")]
    Accept(IoError),
}

/// Error that can happen when handling a single connection.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// Received request can't be decoded.
    #[error("Read request error: {0}")]
    Decode(DecodeError),
    /// Response can't be sent.
    #[error("Write response error: {0}")]
    Encode(EncodeError),
    /// Peer sent nothing within the read timeout.
    #[error("No request within {0:?}")]
    Timeout(Duration),
}

/// Response for requests a service doesn't handle.
pub fn unsupported(request: &Request) -> Response {
    Response::error(ErrorKind::MalformedMessage, format!("Unsupported request: {:?}", request))
}

/// Bind a TCP listener to the socket address.
pub async fn bind(addr: SocketAddr) -> Result<TcpListener, ServeError> {
    TcpListener::bind(addr).await
        .map_err(|error| ServeError::Bind { addr, error })
}

/// Accept connections from `listener` forever, handling each one in its own
/// task. A connection that doesn't deliver a complete request within
/// `read_timeout` is closed.
pub async fn serve<S: Service>(listener: TcpListener, service: S, read_timeout: Duration) -> Result<(), ServeError> {
    loop {
        let (stream, addr) = listener.accept().await
            .map_err(ServeError::Accept)?;
        let service = service.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, service, read_timeout).await {
                debug!("Connection with {} closed with error: {}", addr, e);
            }
        });
    }
}

async fn handle_connection<S: Service>(stream: TcpStream, service: S, read_timeout: Duration) -> Result<(), ConnectionError> {
    let mut framed = Framed::new(stream, ServerCodec);

    loop {
        let request = match time::timeout(read_timeout, framed.next()).await {
            Ok(Some(request)) => request,
            Ok(None) => return Ok(()),
            Err(_) => return Err(ConnectionError::Timeout(read_timeout)),
        };
        let response = match request {
            Ok(request) => service.call(request).await,
            Err(e @ DecodeError::Io(_)) => return Err(ConnectionError::Decode(e)),
            Err(e) => {
                let response = Response::error(ErrorKind::MalformedMessage, &e);
                framed.send(response).await
                    .map_err(ConnectionError::Encode)?;
                return Err(ConnectionError::Decode(e));
            },
        };
        framed.send(response).await
            .map_err(ConnectionError::Encode)?;
    }
}
