//! Long-running scan worker pool.
//!
//! A fixed set of workers drains one shared FIFO queue. Workers never
//! die on item failure: transient errors retry with linear backoff,
//! terminal errors drop the item and move on.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::{PoolConfig, RetryConfig};
use crate::error::Result;

use super::queue::{ScanItem, ScanQueue};

/// Processes one dequeued scan path.
#[async_trait]
pub(crate) trait ScanItemHandler: Send + Sync {
    async fn handle(&self, path: &Path) -> Result<()>;
}

/// Handle to the spawned worker set.
pub(crate) struct ScanWorkerPool {
    cancel: CancellationToken,
    workers: Vec<JoinHandle<()>>,
}

impl ScanWorkerPool {
    /// Spawns the fixed worker set and returns the pool plus its feeder.
    pub(crate) fn spawn(
        config: &PoolConfig,
        retry: RetryConfig,
        handler: Arc<dyn ScanItemHandler>,
    ) -> (Self, ScanQueue) {
        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
        let rx = Arc::new(Mutex::new(rx));
        let cancel = CancellationToken::new();
        let workers = (0..config.workers.max(1))
            .map(|worker_id| {
                spawn_worker(
                    worker_id,
                    Arc::clone(&rx),
                    cancel.child_token(),
                    retry,
                    Arc::clone(&handler),
                )
            })
            .collect();
        (Self { cancel, workers }, ScanQueue::new(tx))
    }

    /// Stops dequeueing and waits for in-flight items to finish.
    ///
    /// Queued but undequeued items are abandoned; their tickets are
    /// settled by the queue going out of scope with them.
    pub(crate) async fn shutdown(self) {
        self.cancel.cancel();
        for worker in self.workers {
            let _ = worker.await;
        }
    }
}

impl std::fmt::Debug for ScanWorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScanWorkerPool")
            .field("workers", &self.workers.len())
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}

fn spawn_worker(
    worker_id: usize,
    rx: Arc<Mutex<mpsc::Receiver<ScanItem>>>,
    cancel: CancellationToken,
    retry: RetryConfig,
    handler: Arc<dyn ScanItemHandler>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        tracing::debug!(target: "scan::pool", worker_id, "scan worker started");
        loop {
            let item = {
                let mut queue = rx.lock().await;
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => None,
                    item = queue.recv() => item,
                }
            };
            let Some(item) = item else { break };
            process_item(worker_id, &retry, &cancel, handler.as_ref(), item).await;
        }
        tracing::debug!(target: "scan::pool", worker_id, "scan worker stopped");
    })
}

async fn process_item(
    worker_id: usize,
    retry: &RetryConfig,
    cancel: &CancellationToken,
    handler: &dyn ScanItemHandler,
    item: ScanItem,
) {
    let mut attempt: u32 = 1;
    loop {
        match handler.handle(&item.path).await {
            Ok(()) => break,
            Err(err)
                if err.is_transient()
                    && attempt < retry.max_attempts
                    && !cancel.is_cancelled() =>
            {
                tracing::warn!(
                    target: "scan::pool",
                    worker_id,
                    attempt,
                    path = %item.path.display(),
                    error = %err,
                    "transient scan failure; retrying"
                );
                tokio::time::sleep(retry.backoff_for(attempt)).await;
                attempt += 1;
            }
            Err(err) => {
                tracing::warn!(
                    target: "scan::pool",
                    worker_id,
                    attempt,
                    path = %item.path.display(),
                    error = %err,
                    "dropping scan item"
                );
                break;
            }
        }
    }
    // The item settles its ticket as it drops here.
}
