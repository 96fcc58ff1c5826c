//! `WorkerPool` - fixed set of media engine workers.
//!
//! Workers are created once at startup and handed to new rooms in round-robin
//! order. The round-robin cursor is the only state shared across rooms and is
//! a single atomic.
//!
//! A worker death is not recoverable in-process: the watcher task logs it and
//! cancels the pool's fault token. The server treats that token as fatal and
//! returns [`RoomError::WorkerFault`] so the embedding process exits.

use crate::errors::RoomError;
use crate::media::{MediaEngine, MediaWorker, WorkerEvent, WorkerSettings};
use crate::observability::metrics;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Pool of media engine workers.
pub struct WorkerPool {
    workers: Vec<Arc<dyn MediaWorker>>,
    next: AtomicUsize,
    fault_token: CancellationToken,
    watcher: JoinHandle<()>,
}

impl WorkerPool {
    /// Create `count` workers and start watching them for faults.
    ///
    /// # Errors
    ///
    /// Returns `RoomError::Config` if `count` is zero, or the engine error if
    /// any worker fails to start. Workers already started are closed.
    pub async fn start(
        engine: &dyn MediaEngine,
        settings: &WorkerSettings,
        count: usize,
    ) -> Result<Self, RoomError> {
        if count == 0 {
            return Err(RoomError::Config(
                "worker pool requires at least one worker".to_string(),
            ));
        }

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let mut workers: Vec<Arc<dyn MediaWorker>> = Vec::with_capacity(count);

        for _ in 0..count {
            match engine.create_worker(settings, events_tx.clone()).await {
                Ok(worker) => {
                    info!(
                        target: "room.workers",
                        worker_id = %worker.id(),
                        rtc_min_port = settings.rtc_min_port,
                        rtc_max_port = settings.rtc_max_port,
                        "Media worker started"
                    );
                    workers.push(worker);
                }
                Err(e) => {
                    error!(
                        target: "room.workers",
                        error = %e,
                        started = workers.len(),
                        "Failed to start media worker"
                    );
                    for worker in &workers {
                        worker.close();
                    }
                    return Err(e.into());
                }
            }
        }
        // Only the engine's copies keep the event channel open.
        drop(events_tx);

        let fault_token = CancellationToken::new();
        let watcher = tokio::spawn(watch_workers(events_rx, fault_token.clone()));

        info!(
            target: "room.workers",
            worker_count = workers.len(),
            "Worker pool started"
        );

        Ok(Self {
            workers,
            next: AtomicUsize::new(0),
            fault_token,
            watcher,
        })
    }

    /// Next worker in round-robin order.
    ///
    /// # Errors
    ///
    /// Returns `RoomError::WorkerFault` once any worker has died.
    pub fn assign_worker(&self) -> Result<Arc<dyn MediaWorker>, RoomError> {
        if self.fault_token.is_cancelled() {
            return Err(RoomError::WorkerFault(
                "worker pool is faulted".to_string(),
            ));
        }
        let index = self.next.fetch_add(1, Ordering::Relaxed) % self.workers.len().max(1);
        let worker = self
            .workers
            .get(index)
            .cloned()
            .ok_or_else(|| RoomError::Internal("worker pool is empty".to_string()))?;

        debug!(
            target: "room.workers",
            worker_id = %worker.id(),
            "Worker assigned"
        );
        metrics::record_worker_assignment();

        Ok(worker)
    }

    #[must_use]
    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    #[must_use]
    pub fn worker_ids(&self) -> Vec<String> {
        self.workers.iter().map(|w| w.id().to_string()).collect()
    }

    /// Token cancelled when a worker dies.
    #[must_use]
    pub fn fault_token(&self) -> CancellationToken {
        self.fault_token.clone()
    }

    #[must_use]
    pub fn is_faulted(&self) -> bool {
        self.fault_token.is_cancelled()
    }

    /// Close every worker and stop the watcher.
    pub fn close(&self) {
        self.watcher.abort();
        for worker in &self.workers {
            worker.close();
        }
        info!(
            target: "room.workers",
            worker_count = self.workers.len(),
            "Worker pool closed"
        );
    }
}

async fn watch_workers(
    mut events: mpsc::UnboundedReceiver<WorkerEvent>,
    fault_token: CancellationToken,
) {
    while let Some(event) = events.recv().await {
        match event {
            WorkerEvent::Died { worker_id, reason } => {
                error!(
                    target: "room.workers",
                    worker_id = %worker_id,
                    reason = %reason,
                    "Media worker died, service cannot continue"
                );
                metrics::record_worker_fault();
                fault_token.cancel();
                break;
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::media::mock::{MockMediaEngine, MockOperation};
    use std::time::Duration;

    fn settings() -> WorkerSettings {
        WorkerSettings {
            log_level: "warn".to_string(),
            rtc_min_port: 10000,
            rtc_max_port: 10100,
        }
    }

    #[tokio::test]
    async fn test_assign_worker_round_robin() {
        let engine = MockMediaEngine::new();
        let pool = WorkerPool::start(&engine, &settings(), 3).await.unwrap();
        let ids = pool.worker_ids();
        assert_eq!(ids.len(), 3);

        let assigned: Vec<String> = (0..6)
            .map(|_| pool.assign_worker().unwrap().id().to_string())
            .collect();

        let first = ids.first().unwrap();
        let second = ids.get(1).unwrap();
        let third = ids.get(2).unwrap();
        assert_eq!(
            assigned,
            vec![
                first.clone(),
                second.clone(),
                third.clone(),
                first.clone(),
                second.clone(),
                third.clone()
            ]
        );
    }

    #[tokio::test]
    async fn test_single_worker_always_assigned() {
        let engine = MockMediaEngine::new();
        let pool = WorkerPool::start(&engine, &settings(), 1).await.unwrap();
        let a = pool.assign_worker().unwrap();
        let b = pool.assign_worker().unwrap();
        assert_eq!(a.id(), b.id());
    }

    #[tokio::test]
    async fn test_zero_workers_is_config_error() {
        let engine = MockMediaEngine::new();
        let result = WorkerPool::start(&engine, &settings(), 0).await;
        assert!(matches!(result, Err(RoomError::Config(_))));
        assert!(engine.worker_ids().is_empty());
    }

    #[tokio::test]
    async fn test_worker_start_failure_is_engine_error() {
        let engine = MockMediaEngine::builder()
            .failing(MockOperation::CreateWorker)
            .build();
        let result = WorkerPool::start(&engine, &settings(), 2).await;
        assert!(matches!(result, Err(RoomError::Engine(_))));
    }

    #[tokio::test]
    async fn test_worker_death_faults_pool() {
        let engine = MockMediaEngine::new();
        let pool = WorkerPool::start(&engine, &settings(), 2).await.unwrap();
        let fault = pool.fault_token();
        assert!(!pool.is_faulted());

        let victim = pool.worker_ids().into_iter().next().unwrap();
        assert!(engine.kill_worker(&victim));

        tokio::time::timeout(Duration::from_secs(1), fault.cancelled())
            .await
            .expect("fault token should be cancelled after worker death");
        assert!(pool.is_faulted());
        assert!(matches!(
            pool.assign_worker(),
            Err(RoomError::WorkerFault(_))
        ));
    }
}
