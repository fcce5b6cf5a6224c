use std::future::{pending, Future};
use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::analytics::stats::SubmissionStats;
use crate::config::{Config, DEFAULT_API_URL, DEFAULT_CONNECT_TIMEOUT_SECS, DEFAULT_REQUEST_TIMEOUT_SECS};
use crate::document::Document;
use crate::error::{AppError, Result};
use crate::http::rate_limiter::RateLimiter;
use crate::transport::{DocumentTransport, HttpTransport, TransportResponse};
use crate::utils::time::{elapsed_ms, now_instant, TimeUnit};

/// Rate-limited client for the document registration API.
///
/// At most `request_limit` submissions are admitted per `time_unit`; excess
/// callers wait in arrival order. Share it between tasks behind an `Arc`.
pub struct SubmissionClient<T = HttpTransport> {
    limiter: RateLimiter,
    transport: T,
    stats: Arc<SubmissionStats>,
}

impl SubmissionClient<HttpTransport> {
    pub fn new(time_unit: TimeUnit, request_limit: usize) -> Result<Self> {
        let transport = HttpTransport::new(
            DEFAULT_API_URL,
            Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        )?;
        Self::with_transport(transport, time_unit.as_duration(), request_limit)
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        config.validate()?;
        let transport = HttpTransport::new(
            &config.api_url,
            config.connect_timeout(),
            config.request_timeout(),
        )?;
        Self::with_transport(transport, config.window(), config.request_limit)
    }
}

impl<T: DocumentTransport> SubmissionClient<T> {
    pub fn with_transport(transport: T, window: Duration, capacity: usize) -> Result<Self> {
        let limiter = RateLimiter::new(capacity, window)?;
        info!("Submission client ready: {} requests per {:?}", capacity, window);

        Ok(Self {
            limiter,
            transport,
            stats: Arc::new(SubmissionStats::new()),
        })
    }

    /// Submit a document, waiting for admission if the rate limit is reached.
    ///
    /// Exactly one network call is made per admitted submission. A non-2xx
    /// answer comes back as [`AppError::Status`]; the permit is not refunded.
    pub async fn submit(&self, document: &Document, signature: &str) -> Result<TransportResponse> {
        self.submit_with_cancel(document, signature, pending()).await
    }

    /// Like [`submit`](Self::submit), but abandons the wait for admission
    /// with [`AppError::AdmissionCancelled`] once `cancel` resolves. Nothing
    /// is sent and no permit is consumed in that case.
    pub async fn submit_with_cancel<F>(
        &self,
        document: &Document,
        signature: &str,
        cancel: F,
    ) -> Result<TransportResponse>
    where
        F: Future<Output = ()>,
    {
        let request_id = Uuid::new_v4();
        let span = info_span!("submit", %request_id, doc_id = %document.doc_id);

        async move {
            // Build everything before touching the limiter.
            let payload = document.to_payload().map_err(|e| {
                error!("Failed to build request: {}", e);
                e
            })?;
            self.transport.validate_signature(signature).map_err(|e| {
                error!("Failed to build request: {}", e);
                e
            })?;

            if let Err(e) = self.limiter.acquire_with_cancel(cancel).await {
                match e {
                    AppError::AdmissionCancelled => self.stats.inc_cancelled(),
                    AppError::LimiterShutdown => self.stats.inc_rejected_shutdown(),
                    _ => {}
                }
                warn!("Submission not admitted: {}", e);
                return Err(e);
            }

            self.stats.inc_submitted();
            let start = now_instant();
            let outcome = self.transport.send_document(payload, signature).await;
            self.stats.update_latency(elapsed_ms(start));

            match outcome {
                Ok(response) if response.is_success() => {
                    self.stats.inc_succeeded();
                    info!("Response status: {}", response.status);
                    info!("Response body: {}", response.body);
                    Ok(response)
                }
                Ok(response) => {
                    self.stats.inc_failed();
                    error!("Registration rejected with status {}: {}", response.status, response.body);
                    Err(AppError::Status {
                        status: response.status,
                        body: response.body,
                    })
                }
                Err(e) => {
                    self.stats.inc_failed();
                    error!("Request failed: {}", e);
                    Err(e)
                }
            }
        }
        .instrument(span)
        .await
    }

    /// Stop the limiter. Waiting and future submissions fail with
    /// [`AppError::LimiterShutdown`]. Also happens when the client is dropped.
    pub fn shutdown(&self) {
        self.limiter.shutdown();
    }

    pub async fn wait_stopped(&self) {
        self.limiter.wait_stopped().await;
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn stats(&self) -> Arc<SubmissionStats> {
        self.stats.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::sync::atomic::Ordering;
    use tokio::time::Instant;

    const WINDOW: Duration = Duration::from_secs(1);

    #[derive(Default)]
    struct MockTransport {
        calls: Mutex<Vec<(Vec<u8>, String)>>,
        status: u16,
        fail: bool,
    }

    impl MockTransport {
        fn responding(status: u16) -> Self {
            Self { status, ..Default::default() }
        }

        fn failing() -> Self {
            Self { fail: true, ..Default::default() }
        }

        fn call_count(&self) -> usize {
            self.calls.lock().len()
        }
    }

    #[async_trait]
    impl DocumentTransport for MockTransport {
        fn validate_signature(&self, signature: &str) -> Result<()> {
            if signature.is_empty() {
                return Err(AppError::Construction("empty signature".into()));
            }
            Ok(())
        }

        async fn send_document(&self, payload: Vec<u8>, signature: &str) -> Result<TransportResponse> {
            self.calls.lock().push((payload, signature.to_string()));
            if self.fail {
                return Err(AppError::Transport("connection reset".into()));
            }
            Ok(TransportResponse {
                status: self.status,
                body: format!("{{\"status\":{}}}", self.status),
            })
        }
    }

    fn document(id: &str) -> Document {
        Document {
            doc_id: id.to_string(),
            doc_type: "LP_INTRODUCE_GOODS".to_string(),
            ..Default::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_submit_passes_payload_and_signature_through() {
        let client = SubmissionClient::with_transport(MockTransport::responding(200), WINDOW, 3).unwrap();
        let doc = document("doc-1");

        let response = client.submit(&doc, "signature-value").await.unwrap();
        assert_eq!(response.status, 200);

        let calls = client.transport().calls.lock();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, doc.to_payload().unwrap());
        assert_eq!(calls[0].1, "signature-value");
        drop(calls);

        assert_eq!(client.limiter().available_permits(), 2);
        assert_eq!(client.stats().succeeded.load(Ordering::Relaxed), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_error_status_keeps_permit_consumed() {
        let client = SubmissionClient::with_transport(MockTransport::responding(400), WINDOW, 2).unwrap();

        let err = client.submit(&document("doc-1"), "sig").await.unwrap_err();
        assert!(matches!(err, AppError::Status { status: 400, .. }));
        assert!(err.is_transport());
        assert_eq!(client.limiter().available_permits(), 1);
        assert_eq!(client.stats().failed.load(Ordering::Relaxed), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_failure_is_not_retried() {
        let client = SubmissionClient::with_transport(MockTransport::failing(), WINDOW, 2).unwrap();

        let err = client.submit(&document("doc-1"), "sig").await.unwrap_err();
        assert!(matches!(err, AppError::Transport(_)));
        assert_eq!(client.transport().call_count(), 1);
        assert_eq!(client.limiter().available_permits(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_construction_error_consumes_no_permit() {
        let client = SubmissionClient::with_transport(MockTransport::responding(200), WINDOW, 1).unwrap();

        let err = client.submit(&document("doc-1"), "").await.unwrap_err();
        assert!(err.is_construction());
        assert_eq!(client.transport().call_count(), 0);
        assert_eq!(client.limiter().available_permits(), 1);
        assert_eq!(client.stats().submitted.load(Ordering::Relaxed), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_submissions_respect_limit() {
        let client = Arc::new(
            SubmissionClient::with_transport(MockTransport::responding(200), WINDOW, 2).unwrap(),
        );
        let start = Instant::now();

        let handles: Vec<_> = (0..5)
            .map(|i| {
                let client = client.clone();
                tokio::spawn(async move {
                    client.submit(&document(&format!("doc-{}", i)), "sig").await.unwrap();
                    start.elapsed()
                })
            })
            .collect();

        let mut finished = Vec::new();
        for handle in handles {
            finished.push(handle.await.unwrap());
        }
        finished.sort();

        assert_eq!(
            finished,
            vec![Duration::ZERO, Duration::ZERO, WINDOW, WINDOW * 2, WINDOW * 3]
        );
        assert_eq!(client.transport().call_count(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_submission_sends_nothing() {
        let client = SubmissionClient::with_transport(MockTransport::responding(200), WINDOW, 1).unwrap();
        client.submit(&document("doc-1"), "sig").await.unwrap();

        let err = client
            .submit_with_cancel(
                &document("doc-2"),
                "sig",
                tokio::time::sleep(Duration::from_millis(200)),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::AdmissionCancelled));
        assert_eq!(client.transport().call_count(), 1);
        assert_eq!(client.limiter().available_permits(), 0);
        assert_eq!(client.stats().cancelled.load(Ordering::Relaxed), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_rejects_waiting_and_new_submissions() {
        let client = Arc::new(
            SubmissionClient::with_transport(MockTransport::responding(200), WINDOW, 1).unwrap(),
        );
        client.submit(&document("doc-1"), "sig").await.unwrap();

        let waiting = {
            let client = client.clone();
            tokio::spawn(async move { client.submit(&document("doc-2"), "sig").await })
        };
        tokio::task::yield_now().await;

        client.shutdown();
        assert!(matches!(waiting.await.unwrap(), Err(AppError::LimiterShutdown)));
        assert!(matches!(
            client.submit(&document("doc-3"), "sig").await,
            Err(AppError::LimiterShutdown)
        ));

        client.wait_stopped().await;
        assert!(!client.limiter().is_replenishing());
        assert_eq!(client.transport().call_count(), 1);
        assert_eq!(client.stats().rejected_shutdown.load(Ordering::Relaxed), 2);
    }

    #[tokio::test]
    async fn test_http_client_from_config() {
        let config = Config {
            api_url: "http://127.0.0.1:1/api/v3/lk/documents/create".into(),
            request_limit: 4,
            time_unit: TimeUnit::Minutes,
            ..Config::default()
        };

        let client = SubmissionClient::from_config(&config).unwrap();
        assert_eq!(client.limiter().capacity(), 4);
        assert_eq!(client.limiter().window(), Duration::from_secs(60));
        assert_eq!(client.transport().endpoint().port(), Some(1));

        let bad = Config { request_limit: 0, ..config };
        assert!(SubmissionClient::from_config(&bad).is_err());
    }

    #[tokio::test]
    async fn test_default_client_targets_registration_api() {
        let client = SubmissionClient::new(TimeUnit::Seconds, 10).unwrap();
        assert_eq!(client.transport().endpoint().as_str(), DEFAULT_API_URL);
        assert_eq!(client.limiter().available_permits(), 10);
    }
}
