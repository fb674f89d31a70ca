/*! Last values seen by a relay or a user, kept for inspection.
*/

use std::sync::Arc;

use onion_packet::DiagnosticsSnapshot;
use tokio::sync::RwLock;

/// Shared store of the last received and sent values of a service.
#[derive(Clone, Default)]
pub struct Diagnostics {
    last: Arc<RwLock<DiagnosticsSnapshot>>,
}

impl Diagnostics {
    /// Create empty store.
    pub fn new() -> Self {
        Default::default()
    }

    /// Copy of the current values.
    pub async fn snapshot(&self) -> DiagnosticsSnapshot {
        self.last.read().await.clone()
    }

    /// Remember wrapped message received by a relay.
    pub async fn set_received_encrypted(&self, message: Vec<u8>) {
        self.last.write().await.last_received_encrypted = Some(message);
    }

    /// Remember peeled layer and its destination port.
    pub async fn set_received_decrypted(&self, inner: Vec<u8>, destination: u16) {
        let mut last = self.last.write().await;
        last.last_received_decrypted = Some(inner);
        last.last_destination = Some(destination);
    }

    /// Remember message delivered to a user.
    pub async fn set_received_message(&self, message: String) {
        self.last.write().await.last_received_message = Some(message);
    }

    /// Remember message sent by a user.
    pub async fn set_sent_message(&self, message: String) {
        self.last.write().await.last_sent_message = Some(message);
    }
}
