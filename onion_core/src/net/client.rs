/*! One shot requests to other services.
*/

use std::io::Error as IoError;
use std::net::SocketAddr;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use onion_packet::*;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio_util::codec::Framed;

use crate::net::codec::*;

/// Error that can happen when sending a request to another service.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Failed to connect to the service.
    #[error("Connect error: {0}")]
    Connect(IoError),
    /// Service didn't answer in time.
    #[error("Request timed out")]
    Timeout,
    /// Request can't be sent.
    #[error("Send request error: {0}")]
    Encode(EncodeError),
    /// Response can't be read.
    #[error("Read response error: {0}")]
    Decode(DecodeError),
    /// Connection was closed before response was received.
    #[error("Connection closed without response")]
    NoResponse,
    /// Service answered with an error.
    #[error("Remote error ({kind}): {message}")]
    Remote {
        /// Kind of remote failure.
        kind: ErrorKind,
        /// Remote error description.
        message: String,
    },
    /// Service answered with a response that doesn't match the request.
    #[error("Unexpected response: {0:?}")]
    UnexpectedResponse(Response),
}

/** Connect to `addr`, send `request` and wait for a single response.

The whole exchange is bounded by `timeout`. `Response::Error` is converted to
`ClientError::Remote`.
*/
pub async fn request(addr: SocketAddr, request: Request, timeout: Duration) -> Result<Response, ClientError> {
    let exchange = async move {
        let stream = TcpStream::connect(addr).await
            .map_err(ClientError::Connect)?;
        let mut framed = Framed::new(stream, ClientCodec);

        framed.send(request).await
            .map_err(ClientError::Encode)?;

        match framed.next().await {
            Some(Ok(Response::Error { kind, message })) => Err(ClientError::Remote { kind, message }),
            Some(Ok(response)) => Ok(response),
            Some(Err(e)) => Err(ClientError::Decode(e)),
            None => Err(ClientError::NoResponse),
        }
    };

    match tokio::time::timeout(timeout, exchange).await {
        Ok(result) => result,
        Err(_) => Err(ClientError::Timeout),
    }
}
