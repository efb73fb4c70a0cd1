//! Filesystem watch pipeline.
//!
//! One watcher per watched root funnels raw events into a debounce
//! loop. Creates and changes buffer by parent directory and flush as
//! rescan requests; deletes and renames skip the buffer and go to the
//! reconciler immediately.

mod classifier;

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::timeout;

use crate::config::{ExtensionFilter, WatchConfig};
use crate::error::{EngineError, Result};
use crate::reconcile::ReconcileCommand;
use crate::rules::{normalize_path, ResolvedWatchSet};

/// Raw event kinds after notify classification.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum WatchEventKind {
    Created,
    Changed,
    Deleted,
    Renamed,
    Overflow,
}

/// One converted filesystem event.
#[derive(Clone, Debug)]
pub(crate) struct WatchEvent {
    pub(crate) kind: WatchEventKind,
    pub(crate) path: PathBuf,
    pub(crate) old_path: Option<PathBuf>,
}

/// Attach outcome for one watched root, queryable while running.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WatchRootStatus {
    /// The watcher is live.
    Watching,
    /// Attach failed; the reason is kept verbatim.
    Failed(String),
}

/// Debounce tuning derived from [`WatchConfig`].
#[derive(Clone, Debug)]
pub(crate) struct WatchTuning {
    pub(crate) debounce_window: Duration,
    pub(crate) max_batch_events: usize,
}

impl From<&WatchConfig> for WatchTuning {
    fn from(config: &WatchConfig) -> Self {
        Self {
            debounce_window: config.debounce_window(),
            max_batch_events: config.max_batch_events.max(1),
        }
    }
}

/// Message from a watcher callback thread into the debounce loop.
enum WatchMessage {
    Event(notify::Event),
    Error(String),
}

impl std::fmt::Debug for WatchMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WatchMessage::Event(event) => f
                .debug_struct("Event")
                .field("kind", &event.kind)
                .field("paths", &event.paths.len())
                .finish(),
            WatchMessage::Error(message) => {
                f.debug_tuple("Error").field(message).finish()
            }
        }
    }
}

struct ActiveWatch {
    watchers: Vec<RecommendedWatcher>,
    flush_task: JoinHandle<()>,
}

impl ActiveWatch {
    fn shutdown(self) {
        // Aborting the flush task discards any buffered directories.
        self.flush_task.abort();
        drop(self.watchers);
    }
}

/// Owns the live watchers and the debounce loop.
pub(crate) struct WatchService {
    tuning: WatchTuning,
    filter: ExtensionFilter,
    rules: Arc<RwLock<ResolvedWatchSet>>,
    reconciler: mpsc::Sender<ReconcileCommand>,
    statuses: Arc<RwLock<HashMap<String, WatchRootStatus>>>,
    active: Mutex<Option<ActiveWatch>>,
}

impl WatchService {
    pub(crate) fn new(
        tuning: WatchTuning,
        filter: ExtensionFilter,
        rules: Arc<RwLock<ResolvedWatchSet>>,
        reconciler: mpsc::Sender<ReconcileCommand>,
    ) -> Self {
        Self {
            tuning,
            filter,
            rules,
            reconciler,
            statuses: Arc::new(RwLock::new(HashMap::new())),
            active: Mutex::new(None),
        }
    }

    /// Attaches one watcher per watched root of the current rule set.
    ///
    /// Roots fail independently: a root that cannot be watched is
    /// recorded as [`WatchRootStatus::Failed`] and the rest proceed.
    pub(crate) async fn attach(&self) -> Result<()> {
        self.detach().await;

        let roots: Vec<String> = {
            let rules = self.rules.read().await;
            rules.watched_roots().map(|root| root.path.clone()).collect()
        };
        let mut statuses = HashMap::with_capacity(roots.len());
        if roots.is_empty() {
            tracing::debug!(target: "watch", "no watched roots; nothing to attach");
            *self.statuses.write().await = statuses;
            return Ok(());
        }

        let capacity = self.tuning.max_batch_events.max(64) * 4;
        let (tx, rx) = mpsc::channel::<WatchMessage>(capacity);
        let mut watchers = Vec::with_capacity(roots.len());
        let mut watched_paths = Vec::with_capacity(roots.len());
        for root in roots {
            let path = PathBuf::from(&root);
            let init_path = path.clone();
            let callback_tx = tx.clone();
            let outcome =
                tokio::task::spawn_blocking(move || init_root_watcher(&init_path, callback_tx))
                    .await;
            match outcome {
                Ok(Ok(watcher)) => {
                    tracing::info!(target: "watch", root = %root, "watcher attached");
                    watchers.push(watcher);
                    watched_paths.push(path);
                    statuses.insert(root, WatchRootStatus::Watching);
                }
                Ok(Err(err)) => {
                    let attach_err = EngineError::WatcherAttach {
                        root: root.clone(),
                        reason: err.to_string(),
                    };
                    tracing::warn!(target: "watch", error = %attach_err, "failed to attach watcher");
                    statuses.insert(root, WatchRootStatus::Failed(err.to_string()));
                }
                Err(join_err) => {
                    tracing::warn!(
                        target: "watch",
                        root = %root,
                        error = %join_err,
                        "watcher initialization panicked"
                    );
                    statuses.insert(root, WatchRootStatus::Failed(join_err.to_string()));
                }
            }
        }
        drop(tx);

        let flush_task = spawn_debounce_loop(
            self.tuning.clone(),
            self.filter.clone(),
            Arc::clone(&self.rules),
            self.reconciler.clone(),
            rx,
            watched_paths,
        );
        *self.active.lock().await = Some(ActiveWatch {
            watchers,
            flush_task,
        });
        *self.statuses.write().await = statuses;
        Ok(())
    }

    /// Drops every watcher and discards buffered events.
    pub(crate) async fn detach(&self) {
        if let Some(active) = self.active.lock().await.take() {
            active.shutdown();
            tracing::debug!(target: "watch", "watchers detached");
        }
        self.statuses.write().await.clear();
    }

    /// Per-root attach statuses from the most recent attach.
    pub(crate) async fn statuses(&self) -> HashMap<String, WatchRootStatus> {
        self.statuses.read().await.clone()
    }
}

impl std::fmt::Debug for WatchService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchService")
            .field("tuning", &self.tuning)
            .finish_non_exhaustive()
    }
}

fn init_root_watcher(
    root: &Path,
    tx: mpsc::Sender<WatchMessage>,
) -> std::result::Result<RecommendedWatcher, notify::Error> {
    let mut watcher = RecommendedWatcher::new(
        move |result: std::result::Result<notify::Event, notify::Error>| {
            let message = match result {
                Ok(event) => WatchMessage::Event(event),
                Err(err) => WatchMessage::Error(err.to_string()),
            };
            let _ = tx.blocking_send(message);
        },
        notify::Config::default(),
    )?;
    watcher.watch(root, RecursiveMode::Recursive)?;
    Ok(watcher)
}

/// Maps a raw notify event onto the engine's event vocabulary.
///
/// Paired renames keep both sides; a bare rename half degrades to a
/// delete or create of the side that was reported.
fn convert_event(event: notify::Event) -> Option<WatchEvent> {
    use notify::event::{EventKind, ModifyKind, RenameMode};

    let kind = match event.kind {
        EventKind::Create(_) => WatchEventKind::Created,
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => WatchEventKind::Renamed,
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => WatchEventKind::Deleted,
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => WatchEventKind::Created,
        EventKind::Modify(ModifyKind::Name(_)) => {
            if event.paths.len() >= 2 {
                WatchEventKind::Renamed
            } else {
                WatchEventKind::Changed
            }
        }
        EventKind::Modify(_) => WatchEventKind::Changed,
        EventKind::Remove(_) => WatchEventKind::Deleted,
        EventKind::Other => WatchEventKind::Overflow,
        EventKind::Access(_) => return None,
        EventKind::Any => WatchEventKind::Changed,
    };

    if kind == WatchEventKind::Overflow {
        return Some(WatchEvent {
            kind,
            path: PathBuf::new(),
            old_path: None,
        });
    }

    let first = event.paths.first()?.clone();
    Some(match kind {
        WatchEventKind::Renamed => {
            let new = event.paths.get(1).cloned().unwrap_or_else(|| first.clone());
            WatchEvent {
                kind,
                path: new,
                old_path: Some(first),
            }
        }
        _ => WatchEvent {
            kind,
            path: first,
            old_path: None,
        },
    })
}

fn spawn_debounce_loop(
    tuning: WatchTuning,
    filter: ExtensionFilter,
    rules: Arc<RwLock<ResolvedWatchSet>>,
    reconciler: mpsc::Sender<ReconcileCommand>,
    mut rx: mpsc::Receiver<WatchMessage>,
    overflow_roots: Vec<PathBuf>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut pending: BTreeMap<String, PathBuf> = BTreeMap::new();
        let mut buffered: usize = 0;
        loop {
            let message = if pending.is_empty() {
                rx.recv().await
            } else {
                match timeout(tuning.debounce_window, rx.recv()).await {
                    Ok(message) => message,
                    Err(_) => {
                        flush_pending(&mut pending, &mut buffered, &reconciler).await;
                        continue;
                    }
                }
            };
            // Channel closed means the watchers are gone; buffered
            // directories are stale and deliberately dropped.
            let Some(message) = message else { break };

            match message {
                WatchMessage::Event(event) => {
                    let Some(converted) = convert_event(event) else {
                        continue;
                    };
                    if converted.kind == WatchEventKind::Overflow {
                        request_overflow_rescan(&overflow_roots, &reconciler).await;
                        continue;
                    }
                    let passes = {
                        let rules = rules.read().await;
                        classifier::should_pass(&converted, &rules, &filter)
                    };
                    if !passes {
                        continue;
                    }
                    match converted.kind {
                        WatchEventKind::Created | WatchEventKind::Changed => {
                            let Some(parent) = converted.path.parent() else {
                                continue;
                            };
                            pending.insert(normalize_path(parent), parent.to_path_buf());
                            buffered += 1;
                            if buffered >= tuning.max_batch_events {
                                flush_pending(&mut pending, &mut buffered, &reconciler).await;
                            }
                        }
                        WatchEventKind::Deleted => {
                            let _ = reconciler
                                .send(ReconcileCommand::ResolveDelete {
                                    path: converted.path,
                                })
                                .await;
                        }
                        WatchEventKind::Renamed => {
                            let Some(old) = converted.old_path else {
                                continue;
                            };
                            let _ = reconciler
                                .send(ReconcileCommand::ResolveRename {
                                    old,
                                    new: converted.path,
                                })
                                .await;
                        }
                        WatchEventKind::Overflow => {}
                    }
                }
                WatchMessage::Error(message) => {
                    tracing::warn!(target: "watch", error = %message, "watch backend error");
                    request_overflow_rescan(&overflow_roots, &reconciler).await;
                }
            }
        }
        tracing::debug!(target: "watch", "debounce loop exited");
    })
}

async fn flush_pending(
    pending: &mut BTreeMap<String, PathBuf>,
    buffered: &mut usize,
    reconciler: &mpsc::Sender<ReconcileCommand>,
) {
    if pending.is_empty() {
        return;
    }
    let dirs: Vec<PathBuf> = std::mem::take(pending).into_values().collect();
    *buffered = 0;
    tracing::debug!(target: "watch", dirs = dirs.len(), "flushing debounced directories");
    let _ = reconciler
        .send(ReconcileCommand::Rescan { dirs, deep: false })
        .await;
}

async fn request_overflow_rescan(
    roots: &[PathBuf],
    reconciler: &mpsc::Sender<ReconcileCommand>,
) {
    if roots.is_empty() {
        return;
    }
    tracing::warn!(
        target: "watch",
        roots = roots.len(),
        "event overflow; deep rescan of all watched roots"
    );
    let _ = reconciler
        .send(ReconcileCommand::Rescan {
            dirs: roots.to_vec(),
            deep: true,
        })
        .await;
}
