use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use hookgate_core::ShutdownSignal;
use hookgate_settings::DispatchSettings;
use metrics::{counter, gauge};
use serde::Serialize;
use tokio::sync::{OwnedSemaphorePermit, Semaphore, watch};
use tracing::{debug, info, warn};

use crate::errors::DispatchError;

/// Read-only view of the controller's counters.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchStats {
    /// Slots currently held.
    pub active: usize,
    /// Callers waiting for a slot.
    pub queued: usize,
    /// Slot capacity.
    pub max_concurrent: usize,
    /// Whether shutdown has begun.
    pub shutting_down: bool,
}

struct Shared {
    semaphore: Arc<Semaphore>,
    max_concurrent: usize,
    active: watch::Sender<usize>,
    queued: AtomicUsize,
    shutdown: ShutdownSignal,
    drain_timeout_ms: u64,
}

impl Shared {
    fn reject(&self) -> DispatchError {
        counter!("dispatch_rejected_total").increment(1);
        DispatchError::ShuttingDown
    }
}

/// A held concurrency slot. Dropping it frees the slot.
#[must_use = "dropping a Slot releases it immediately"]
pub struct Slot {
    _permit: OwnedSemaphorePermit,
    shared: Arc<Shared>,
}

impl std::fmt::Debug for Slot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Slot").finish_non_exhaustive()
    }
}

impl Drop for Slot {
    fn drop(&mut self) {
        self.shared.active.send_modify(|n| *n = n.saturating_sub(1));
        gauge!("dispatch_active").set(*self.shared.active.borrow() as f64);
    }
}

/// Counts a caller as queued for as long as it is parked on the semaphore,
/// including when its acquire future is dropped mid-wait.
struct QueuedGuard<'a>(&'a Shared);

impl<'a> QueuedGuard<'a> {
    fn enter(shared: &'a Shared) -> Self {
        let queued = shared.queued.fetch_add(1, Ordering::SeqCst) + 1;
        gauge!("dispatch_queued").set(queued as f64);
        Self(shared)
    }
}

impl Drop for QueuedGuard<'_> {
    fn drop(&mut self) {
        let queued = self.0.queued.fetch_sub(1, Ordering::SeqCst) - 1;
        gauge!("dispatch_queued").set(queued as f64);
    }
}

/// Bounded-concurrency admission controller.
///
/// Cloning yields another handle to the same slots.
#[derive(Clone)]
pub struct DispatchController {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for DispatchController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchController")
            .field("stats", &self.stats())
            .finish()
    }
}

impl DispatchController {
    /// Controller with `max_concurrent` slots (at least one), stopped by `shutdown`.
    pub fn new(max_concurrent: usize, shutdown: ShutdownSignal) -> Self {
        Self::build(
            max_concurrent,
            DispatchSettings::default().drain_timeout_ms,
            shutdown,
        )
    }

    /// Controller sized and timed from settings.
    pub fn from_settings(settings: &DispatchSettings, shutdown: ShutdownSignal) -> Self {
        Self::build(settings.max_concurrent, settings.drain_timeout_ms, shutdown)
    }

    fn build(max_concurrent: usize, drain_timeout_ms: u64, shutdown: ShutdownSignal) -> Self {
        let max_concurrent = max_concurrent.max(1);
        let (active, _) = watch::channel(0);
        Self {
            shared: Arc::new(Shared {
                semaphore: Arc::new(Semaphore::new(max_concurrent)),
                max_concurrent,
                active,
                queued: AtomicUsize::new(0),
                shutdown,
                drain_timeout_ms,
            }),
        }
    }

    /// Take a slot, waiting in FIFO order if none is free.
    ///
    /// Fails with [`DispatchError::ShuttingDown`] if shutdown has begun, or
    /// begins while this caller is still waiting.
    pub async fn acquire(&self) -> Result<Slot, DispatchError> {
        let shared = &self.shared;
        if shared.shutdown.is_triggered() {
            return Err(shared.reject());
        }

        let permit = match Arc::clone(&shared.semaphore).try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                let _queued = QueuedGuard::enter(shared);
                debug!("dispatch at capacity, queueing");
                tokio::select! {
                    biased;
                    () = shared.shutdown.triggered() => return Err(shared.reject()),
                    permit = Arc::clone(&shared.semaphore).acquire_owned() => {
                        permit.map_err(|_| shared.reject())?
                    }
                }
            }
        };

        if shared.shutdown.is_triggered() {
            return Err(shared.reject());
        }

        shared.active.send_modify(|n| *n += 1);
        gauge!("dispatch_active").set(*shared.active.borrow() as f64);
        Ok(Slot {
            _permit: permit,
            shared: Arc::clone(shared),
        })
    }

    /// Return a slot. Equivalent to dropping it.
    pub fn release(&self, slot: Slot) {
        drop(slot);
    }

    /// Acquire a slot, run `fut` while holding it, then release.
    ///
    /// The slot is released even if `fut` panics or the returned future is dropped.
    pub async fn run<F: Future>(&self, fut: F) -> Result<F::Output, DispatchError> {
        let _slot = self.acquire().await?;
        Ok(fut.await)
    }

    /// Stop admitting work. Queued callers are rejected; held slots are untouched.
    pub fn begin_shutdown(&self) {
        if !self.shared.shutdown.is_triggered() {
            info!(
                active = *self.shared.active.borrow(),
                queued = self.shared.queued.load(Ordering::SeqCst),
                "dispatch shutdown initiated"
            );
        }
        self.shared.shutdown.trigger();
    }

    /// Wait until no slots are held, up to `timeout_ms`. Returns whether it drained.
    pub async fn drain(&self, timeout_ms: u64) -> bool {
        let mut rx = self.shared.active.subscribe();
        let drained = tokio::time::timeout(
            Duration::from_millis(timeout_ms),
            rx.wait_for(|active| *active == 0),
        )
        .await
        .is_ok_and(|waited| waited.is_ok());

        if !drained {
            warn!(
                active = *self.shared.active.borrow(),
                timeout_ms, "dispatch drain timed out"
            );
        }
        drained
    }

    /// [`begin_shutdown`](Self::begin_shutdown) then [`drain`](Self::drain)
    /// with the configured timeout.
    pub async fn shutdown(&self) -> bool {
        self.begin_shutdown();
        self.drain(self.shared.drain_timeout_ms).await
    }

    /// Current counters.
    pub fn stats(&self) -> DispatchStats {
        DispatchStats {
            active: *self.shared.active.borrow(),
            queued: self.shared.queued.load(Ordering::SeqCst),
            max_concurrent: self.shared.max_concurrent,
            shutting_down: self.shared.shutdown.is_triggered(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use tokio::sync::mpsc;

    async fn explode() -> u32 {
        panic!("provider call blew up")
    }

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn grants_up_to_capacity() {
        let controller = DispatchController::new(2, ShutdownSignal::new());
        let a = controller.acquire().await.unwrap();
        let _b = controller.acquire().await.unwrap();
        assert_eq!(controller.stats().active, 2);

        let waiter = controller.clone();
        let handle = tokio::spawn(async move { waiter.acquire().await.map(drop) });
        settle().await;
        assert_eq!(controller.stats().queued, 1);
        assert!(!handle.is_finished());

        controller.release(a);
        handle.await.unwrap().unwrap();
        assert_eq!(controller.stats().queued, 0);
        assert_eq!(controller.stats().active, 1);
    }

    #[tokio::test]
    async fn waiters_admitted_in_arrival_order() {
        let controller = DispatchController::new(1, ShutdownSignal::new());
        let held = controller.acquire().await.unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();

        for id in 0..3 {
            let c = controller.clone();
            let tx = tx.clone();
            let _ = tokio::spawn(async move {
                let slot = c.acquire().await.unwrap();
                tx.send(id).unwrap();
                drop(slot);
            });
            settle().await;
        }
        assert_eq!(controller.stats().queued, 3);

        drop(held);
        let mut order = Vec::new();
        for _ in 0..3 {
            order.push(rx.recv().await.unwrap());
        }
        assert_eq!(order, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn rejects_after_shutdown() {
        let controller = DispatchController::new(1, ShutdownSignal::new());
        controller.begin_shutdown();
        assert_matches!(controller.acquire().await, Err(DispatchError::ShuttingDown));
        assert!(controller.acquire().await.unwrap_err().is_shutdown());
        assert!(controller.stats().shutting_down);
    }

    #[tokio::test]
    async fn queued_callers_rejected_on_shutdown() {
        let controller = DispatchController::new(1, ShutdownSignal::new());
        let held = controller.acquire().await.unwrap();

        let waiter = controller.clone();
        let handle = tokio::spawn(async move { waiter.acquire().await.map(drop) });
        settle().await;
        assert_eq!(controller.stats().queued, 1);

        controller.begin_shutdown();
        assert_matches!(handle.await.unwrap(), Err(DispatchError::ShuttingDown));
        assert_eq!(controller.stats().queued, 0);
        assert_eq!(controller.stats().active, 1);
        drop(held);
        assert_eq!(controller.stats().active, 0);
    }

    #[tokio::test]
    async fn shared_signal_stops_admission() {
        let signal = ShutdownSignal::new();
        let controller = DispatchController::new(1, signal.clone());
        signal.trigger();
        assert_matches!(controller.acquire().await, Err(DispatchError::ShuttingDown));
    }

    #[tokio::test(start_paused = true)]
    async fn drain_waits_for_in_flight_work() {
        let controller = DispatchController::new(2, ShutdownSignal::new());
        let slot = controller.acquire().await.unwrap();
        let _ = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            drop(slot);
        });
        controller.begin_shutdown();
        assert!(controller.drain(1_000).await);
        assert_eq!(controller.stats().active, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn drain_times_out() {
        let controller = DispatchController::new(1, ShutdownSignal::new());
        let _slot = controller.acquire().await.unwrap();
        assert!(!controller.drain(50).await);
    }

    #[tokio::test]
    async fn drain_when_idle_is_immediate() {
        let controller = DispatchController::new(1, ShutdownSignal::new());
        assert!(controller.drain(0).await);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_acquire_leaves_no_queued_count() {
        let controller = DispatchController::new(1, ShutdownSignal::new());
        let _held = controller.acquire().await.unwrap();
        let attempt = tokio::time::timeout(Duration::from_millis(10), controller.acquire()).await;
        assert!(attempt.is_err());
        assert_eq!(controller.stats().queued, 0);
    }

    #[tokio::test]
    async fn run_releases_slot() {
        let controller = DispatchController::new(1, ShutdownSignal::new());
        let out = controller.run(async { 7 }).await.unwrap();
        assert_eq!(out, 7);
        assert_eq!(controller.stats().active, 0);
    }

    #[tokio::test]
    async fn run_releases_slot_on_panic() {
        let controller = DispatchController::new(1, ShutdownSignal::new());
        let c = controller.clone();
        let result = tokio::spawn(async move { c.run(explode()).await }).await;
        assert!(result.is_err());
        assert_eq!(controller.stats().active, 0);
        let _slot = controller.acquire().await.unwrap();
    }

    #[tokio::test]
    async fn concurrency_never_exceeds_capacity() {
        let controller = DispatchController::new(3, ShutdownSignal::new());
        let peak = Arc::new(AtomicUsize::new(0));
        let tasks: Vec<_> = (0..12)
            .map(|_| {
                let c = controller.clone();
                let peak = peak.clone();
                async move {
                    c.run(async {
                        let _ = peak.fetch_max(c.stats().active, Ordering::SeqCst);
                        tokio::task::yield_now().await;
                    })
                    .await
                }
            })
            .collect();
        let results = futures::future::join_all(tasks).await;
        assert!(results.iter().all(Result::is_ok));
        assert!(peak.load(Ordering::SeqCst) <= 3);
        assert_eq!(controller.stats().active, 0);
    }

    #[tokio::test]
    async fn configured_drain_timeout() {
        let settings = DispatchSettings {
            max_concurrent: 0,
            drain_timeout_ms: 5,
        };
        let controller = DispatchController::from_settings(&settings, ShutdownSignal::new());
        assert_eq!(controller.stats().max_concurrent, 1);
        assert!(controller.shutdown().await);
    }
}
