//! Debounced persistence scheduler.
//!
//! Every store mutation marks the store dirty; marks inside the debounce
//! window coalesce into a single blob write. A second, slower timer writes a
//! full snapshot plus a timestamped backup regardless of mutation activity,
//! as a safety net against lost debounce windows. Write failures are logged
//! and absorbed: the in-memory store stays authoritative and the next cycle
//! retries.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::store::DeviceStore;

/// Write counters, readable at any time.
#[derive(Debug, Clone, Default)]
pub struct PersistStats {
    /// Debounced writes performed.
    pub flushes: usize,
    /// Periodic snapshot writes performed.
    pub snapshots: usize,
    /// Writes that failed (and were absorbed).
    pub failures: usize,
}

#[derive(Default)]
struct Counters {
    flushes: AtomicUsize,
    snapshots: AtomicUsize,
    failures: AtomicUsize,
}

/// Scheduler owning the debounce and snapshot tasks.
pub struct PersistScheduler {
    store: Arc<DeviceStore>,
    debounce: Duration,
    snapshot_interval: Duration,
    shutdown_tx: watch::Sender<bool>,
    handles: RwLock<Vec<JoinHandle<()>>>,
    counters: Arc<Counters>,
}

impl PersistScheduler {
    /// Create a scheduler for the given store.
    pub fn new(store: Arc<DeviceStore>, debounce: Duration, snapshot_interval: Duration) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            store,
            debounce,
            snapshot_interval,
            shutdown_tx,
            handles: RwLock::new(Vec::new()),
            counters: Arc::new(Counters::default()),
        }
    }

    /// Start both background tasks. Calling twice stacks no extra tasks.
    pub async fn start(&self) {
        let mut handles = self.handles.write().await;
        if !handles.is_empty() {
            return;
        }

        handles.push(tokio::spawn(Self::debounce_loop(
            self.store.clone(),
            self.debounce,
            self.shutdown_tx.subscribe(),
            self.counters.clone(),
        )));
        handles.push(tokio::spawn(Self::snapshot_loop(
            self.store.clone(),
            self.snapshot_interval,
            self.shutdown_tx.subscribe(),
            self.counters.clone(),
        )));
    }

    /// Stop the tasks, flushing any pending debounce window first.
    pub async fn stop(&self) {
        let _ = self.shutdown_tx.send(true);
        let mut handles = self.handles.write().await;
        for handle in handles.drain(..) {
            handle.await.ok();
        }
    }

    /// Current write counters.
    pub fn stats(&self) -> PersistStats {
        PersistStats {
            flushes: self.counters.flushes.load(Ordering::Relaxed),
            snapshots: self.counters.snapshots.load(Ordering::Relaxed),
            failures: self.counters.failures.load(Ordering::Relaxed),
        }
    }

    async fn debounce_loop(
        store: Arc<DeviceStore>,
        debounce: Duration,
        mut shutdown: watch::Receiver<bool>,
        counters: Arc<Counters>,
    ) {
        loop {
            // Wait for the first mark of a burst.
            tokio::select! {
                _ = shutdown.changed() => return,
                _ = store.dirty_notified() => {}
            }

            // Each further mark restarts the window; quiet for one full
            // window triggers exactly one write.
            loop {
                tokio::select! {
                    _ = shutdown.changed() => {
                        Self::flush(&store, &counters).await;
                        return;
                    }
                    _ = tokio::time::sleep(debounce) => {
                        Self::flush(&store, &counters).await;
                        break;
                    }
                    _ = store.dirty_notified() => {}
                }
            }
        }
    }

    async fn snapshot_loop(
        store: Arc<DeviceStore>,
        interval: Duration,
        mut shutdown: watch::Receiver<bool>,
        counters: Arc<Counters>,
    ) {
        let mut ticker = tokio::time::interval(interval);
        // The immediate first tick would snapshot an empty store.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.changed() => return,
                _ = ticker.tick() => {}
            }

            let now = Utc::now();
            let result = async {
                store.write_snapshot().await?;
                store.write_backup(now).await
            }
            .await;

            match result {
                Ok(()) => {
                    counters.snapshots.fetch_add(1, Ordering::Relaxed);
                    debug!("periodic snapshot written");
                }
                Err(e) => {
                    counters.failures.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        "periodic snapshot failed, in-memory state remains authoritative: {}",
                        e
                    );
                }
            }
        }
    }

    async fn flush(store: &DeviceStore, counters: &Counters) {
        match store.write_snapshot().await {
            Ok(()) => {
                counters.flushes.fetch_add(1, Ordering::Relaxed);
                debug!("debounced write flushed");
            }
            Err(e) => {
                counters.failures.fetch_add(1, Ordering::Relaxed);
                warn!("debounced write failed, will retry next cycle: {}", e);
            }
        }
    }
}
