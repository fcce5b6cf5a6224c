use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{broadcast, Semaphore, TryAcquireError};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, trace, warn};

use crate::error::{AppError, Result};

/// Shortest window accepted. Below this the ticker falls behind the clock
/// and spins on deadlines that have already passed.
pub const MIN_WINDOW: Duration = Duration::from_millis(1);

/// Admission gate allowing at most `capacity` calls per `window`.
///
/// Permits live in a fair (FIFO) semaphore and are consumed on admission.
/// A background task returns one permit per window tick, clamped at
/// `capacity`. That task is the only writer that adds permits, so its
/// check-then-add can never push the pool past `capacity`.
#[derive(Debug)]
pub struct RateLimiter {
    permits: Arc<Semaphore>,
    capacity: usize,
    window: Duration,
    shutdown_tx: broadcast::Sender<()>,
    replenisher: Mutex<Option<JoinHandle<()>>>,
}

impl RateLimiter {
    /// Must be called from within a Tokio runtime, which hosts the replenishment task.
    pub fn new(capacity: usize, window: Duration) -> Result<Self> {
        if capacity == 0 {
            return Err(AppError::Init("Rate limit capacity must be positive".into()));
        }
        if capacity > Semaphore::MAX_PERMITS {
            return Err(AppError::Init(format!(
                "Rate limit capacity {} exceeds the maximum of {}",
                capacity,
                Semaphore::MAX_PERMITS
            )));
        }
        if window < MIN_WINDOW {
            return Err(AppError::Init(format!(
                "Rate limit window {:?} is shorter than the minimum of {:?}",
                window, MIN_WINDOW
            )));
        }

        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| AppError::Init(format!("Rate limiter needs a Tokio runtime: {}", e)))?;

        let permits = Arc::new(Semaphore::new(capacity));
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        // The first permit comes back one full window after construction.
        let first_tick = Instant::now() + window;
        let handle = runtime.spawn(run_replenisher(
            permits.clone(),
            capacity,
            first_tick,
            window,
            shutdown_rx,
        ));

        debug!("Rate limiter started: {} permits per {:?}", capacity, window);

        Ok(Self {
            permits,
            capacity,
            window,
            shutdown_tx,
            replenisher: Mutex::new(Some(handle)),
        })
    }

    /// Wait for a permit and consume it.
    ///
    /// Dropping the returned future before it completes abandons the wait
    /// without touching the permit count.
    pub async fn acquire(&self) -> Result<()> {
        let permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| AppError::LimiterShutdown)?;
        // Permits come back through replenishment only, never on release.
        permit.forget();
        Ok(())
    }

    /// Like [`acquire`](Self::acquire), but gives up with
    /// [`AppError::AdmissionCancelled`] as soon as `cancel` resolves.
    /// A caller that is already cancelled is never admitted.
    pub async fn acquire_with_cancel<F>(&self, cancel: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        tokio::select! {
            biased;
            _ = cancel => Err(AppError::AdmissionCancelled),
            result = self.acquire() => result,
        }
    }

    pub async fn acquire_timeout(&self, timeout: Duration) -> Result<()> {
        self.acquire_with_cancel(tokio::time::sleep(timeout)).await
    }

    /// Consume a permit if one is free right now. Returns `Ok(false)` when
    /// the pool is empty.
    pub fn try_acquire(&self) -> Result<bool> {
        match self.permits.try_acquire() {
            Ok(permit) => {
                permit.forget();
                Ok(true)
            }
            Err(TryAcquireError::NoPermits) => Ok(false),
            Err(TryAcquireError::Closed) => Err(AppError::LimiterShutdown),
        }
    }

    pub fn available_permits(&self) -> usize {
        self.permits.available_permits()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn is_shut_down(&self) -> bool {
        self.permits.is_closed()
    }

    pub fn is_replenishing(&self) -> bool {
        self.replenisher
            .lock()
            .as_ref()
            .map_or(false, |handle| !handle.is_finished())
    }

    /// Stop replenishment and release every waiter with
    /// [`AppError::LimiterShutdown`]. Later acquisitions fail immediately.
    pub fn shutdown(&self) {
        if self.permits.is_closed() {
            return;
        }

        info!("Rate limiter shutting down...");
        self.permits.close();
        // No receiver left means the task is already gone.
        let _ = self.shutdown_tx.send(());
    }

    /// Wait for the replenishment task to exit. Only meaningful after
    /// [`shutdown`](Self::shutdown).
    pub async fn wait_stopped(&self) {
        let handle = self.replenisher.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!("Replenishment task ended abnormally: {}", e);
            }
        }
    }
}

impl Drop for RateLimiter {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn run_replenisher(
    permits: Arc<Semaphore>,
    capacity: usize,
    first_tick: Instant,
    window: Duration,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut ticker = interval_at(first_tick, window);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match replenish(&permits, capacity) {
                    Ok(true) => trace!("Permit returned ({} available)", permits.available_permits()),
                    Ok(false) => trace!("Pool already at capacity"),
                    Err(AppError::LimiterShutdown) => break,
                    // A failed tick is skipped; the next one runs on schedule.
                    Err(e) => warn!("Replenishment tick failed: {}", e),
                }
            }
            _ = shutdown.recv() => break,
        }
    }

    debug!("Rate limiter replenishment stopped.");
}

/// Return one permit unless the pool is full.
fn replenish(permits: &Semaphore, capacity: usize) -> Result<bool> {
    if permits.is_closed() {
        return Err(AppError::LimiterShutdown);
    }

    let available = permits.available_permits();
    if available > capacity {
        return Err(AppError::Replenish(format!(
            "Permit pool holds {} permits, above capacity {}",
            available, capacity
        )));
    }
    if available == capacity {
        return Ok(false);
    }

    permits.add_permits(1);
    Ok(true)
}
