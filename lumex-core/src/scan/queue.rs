//! FIFO scan queue and batch completion tickets.

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, Notify};

use crate::error::{EngineError, Result};

/// One queued scan request.
///
/// Dropping an item settles its ticket, so batches complete even when
/// queued items are discarded by a shutdown instead of processed.
#[derive(Debug)]
pub(crate) struct ScanItem {
    pub(crate) path: PathBuf,
    ticket: Option<ScanTicket>,
}

impl ScanItem {
    fn new(path: PathBuf, ticket: Option<ScanTicket>) -> Self {
        Self { path, ticket }
    }
}

impl Drop for ScanItem {
    fn drop(&mut self) {
        if let Some(ticket) = self.ticket.take() {
            ticket.complete_one();
        }
    }
}

/// Tracks completion of one enqueued batch.
///
/// Workers signal each item exactly once, whether it succeeded or was
/// dropped after exhausting retries.
#[derive(Clone, Debug)]
pub(crate) struct ScanTicket {
    inner: Arc<TicketInner>,
}

#[derive(Debug)]
struct TicketInner {
    remaining: AtomicUsize,
    done: Notify,
}

impl ScanTicket {
    pub(crate) fn new(count: usize) -> Self {
        Self {
            inner: Arc::new(TicketInner {
                remaining: AtomicUsize::new(count),
                done: Notify::new(),
            }),
        }
    }

    /// Marks one item finished, waking waiters on the last one.
    pub(crate) fn complete_one(&self) {
        if self.inner.remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.inner.done.notify_waiters();
        }
    }

    /// Waits until every item in the batch has finished.
    pub(crate) async fn wait(&self) {
        loop {
            if self.inner.remaining.load(Ordering::Acquire) == 0 {
                return;
            }
            let notified = self.inner.done.notified();
            if self.inner.remaining.load(Ordering::Acquire) == 0 {
                return;
            }
            notified.await;
        }
    }
}

/// Cloneable feeder handle to the scan queue.
#[derive(Clone, Debug)]
pub(crate) struct ScanQueue {
    tx: mpsc::Sender<ScanItem>,
}

impl ScanQueue {
    pub(crate) fn new(tx: mpsc::Sender<ScanItem>) -> Self {
        Self { tx }
    }

    /// Enqueues one path without completion tracking.
    pub(crate) async fn enqueue(&self, path: PathBuf) -> Result<()> {
        self.tx
            .send(ScanItem::new(path, None))
            .await
            .map_err(|_| EngineError::State("scan queue is closed".into()))
    }

    /// Enqueues a batch, returning a ticket that completes when every
    /// item has been processed or dropped.
    pub(crate) async fn enqueue_batch(&self, paths: Vec<PathBuf>) -> Result<ScanTicket> {
        let total = paths.len();
        let ticket = ScanTicket::new(total);
        for (sent, path) in paths.into_iter().enumerate() {
            let item = ScanItem::new(path, Some(ticket.clone()));
            if self.tx.send(item).await.is_err() {
                // The rejected item settled itself on drop; items past
                // it were never built, so settle them here.
                for _ in sent + 1..total {
                    ticket.complete_one();
                }
                return Err(EngineError::State("scan queue is closed".into()));
            }
        }
        Ok(ticket)
    }
}
