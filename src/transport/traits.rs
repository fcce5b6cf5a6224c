use std::sync::Arc;
use async_trait::async_trait;
use crate::error::Result;

/// Status and body returned by the registration service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    pub status: u16,
    pub body: String,
}

impl TransportResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[async_trait]
pub trait DocumentTransport: Send + Sync {
    /// Reject a signature that cannot be put on the wire.
    /// Called before a permit is taken, so failures here cost nothing.
    fn validate_signature(&self, _signature: &str) -> Result<()> {
        Ok(())
    }

    /// Send one serialized document with its signature. A single attempt, no retries.
    async fn send_document(&self, payload: Vec<u8>, signature: &str) -> Result<TransportResponse>;
}

#[async_trait]
impl<T: DocumentTransport + ?Sized> DocumentTransport for Arc<T> {
    fn validate_signature(&self, signature: &str) -> Result<()> {
        (**self).validate_signature(signature)
    }

    async fn send_document(&self, payload: Vec<u8>, signature: &str) -> Result<TransportResponse> {
        (**self).send_document(payload, signature).await
    }
}
