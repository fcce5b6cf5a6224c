use std::sync::atomic::{AtomicU64, Ordering};
use tracing::info;

#[derive(Debug, Default)]
pub struct SubmissionStats {
    /// Admitted by the limiter and handed to the transport.
    pub submitted: AtomicU64,
    pub succeeded: AtomicU64,
    pub failed: AtomicU64,
    pub cancelled: AtomicU64,
    pub rejected_shutdown: AtomicU64,

    pub last_latency_ms: AtomicU64,
}

impl SubmissionStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc_submitted(&self) {
        self.submitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_succeeded(&self) {
        self.succeeded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_cancelled(&self) {
        self.cancelled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_rejected_shutdown(&self) {
        self.rejected_shutdown.fetch_add(1, Ordering::Relaxed);
    }

    pub fn update_latency(&self, ms: u64) {
        self.last_latency_ms.store(ms, Ordering::Relaxed);
    }

    pub fn log_stats(&self) {
        let submitted = self.submitted.load(Ordering::Relaxed);
        let succeeded = self.succeeded.load(Ordering::Relaxed);
        let failed = self.failed.load(Ordering::Relaxed);
        let cancelled = self.cancelled.load(Ordering::Relaxed);
        let rejected = self.rejected_shutdown.load(Ordering::Relaxed);
        let latency = self.last_latency_ms.load(Ordering::Relaxed);

        info!(
            "STATS: Submitted: {} | {} Success, {} Failed | Cancelled: {} | Rejected (shutdown): {} | Last latency: {}ms",
            submitted, succeeded, failed, cancelled, rejected, latency
        );
    }
}
