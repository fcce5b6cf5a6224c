use std::time::Duration;
use async_trait::async_trait;
use reqwest::header::{HeaderValue, CONTENT_TYPE};
use reqwest::Client;
use tracing::debug;
use url::Url;

use crate::error::{AppError, Result};
use crate::http::pool::create_http_client;
use crate::transport::{DocumentTransport, TransportResponse};

const SIGNATURE_HEADER: &str = "Signature";

/// POSTs documents as JSON to the registration endpoint.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    endpoint: Url,
}

impl HttpTransport {
    pub fn new(endpoint: &str, connect_timeout: Duration, request_timeout: Duration) -> Result<Self> {
        let endpoint = Url::parse(endpoint)
            .map_err(|e| AppError::Init(format!("Invalid API URL {}: {}", endpoint, e)))?;

        if !matches!(endpoint.scheme(), "http" | "https") {
            return Err(AppError::Init(format!(
                "Unsupported API URL scheme: {}",
                endpoint.scheme()
            )));
        }

        let client = create_http_client(connect_timeout, request_timeout)?;

        Ok(Self { client, endpoint })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl DocumentTransport for HttpTransport {
    fn validate_signature(&self, signature: &str) -> Result<()> {
        HeaderValue::from_str(signature)
            .map(|_| ())
            .map_err(|e| AppError::Construction(format!("Invalid signature header: {}", e)))
    }

    async fn send_document(&self, payload: Vec<u8>, signature: &str) -> Result<TransportResponse> {
        let start = std::time::Instant::now();
        let response = self
            .client
            .post(self.endpoint.clone())
            .header(CONTENT_TYPE, "application/json")
            .header(SIGNATURE_HEADER, signature)
            .body(payload)
            .send()
            .await
            .map_err(AppError::Http)?;

        let status = response.status().as_u16();
        let body = response.text().await.map_err(AppError::Http)?;
        debug!("POST {} -> {} in {}ms", self.endpoint, status, start.elapsed().as_millis());

        Ok(TransportResponse { status, body })
    }
}
