//! Engine facade and lifecycle.
//!
//! [`CollectionEngine`] wires the rule resolver, watch pipeline,
//! reconciler, and scan pool together behind one handle. Consumers
//! observe changes through the container index and the event bus.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;

use lumex_model::{
    AlbumContainer, AlbumRecord, ContainerKey, FolderContainer, FolderRecord, FolderRule,
    ImageContainer, ImageId, ImageRecord, ImageRef, ResetChanges, RuleAction,
};

use crate::catalog::CatalogUnitOfWorkFactory;
use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::events::{CatalogEvent, CatalogEventEnvelope, EngineEventBus};
use crate::extract::{FsMetadataExtractor, MetadataExtractor};
use crate::index::ContainerIndex;
use crate::listing::{DirectoryLister, FsLister};
use crate::reconcile::{ChangeSignal, ReconcileCommand, Reconciler};
use crate::rules::{normalize_path, plan_rule_changes, resolve_watch_set, ResolvedWatchSet};
use crate::scan::{IngestPipeline, ScanItemHandler, ScanQueue, ScanWorkerPool};
use crate::thumbs::{NoopThumbnailGenerator, ThumbnailGenerator};
use crate::watch::{WatchRootStatus, WatchService, WatchTuning};

/// Lifecycle states of the engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EngineState {
    /// No watchers, no workers. The index keeps its last contents.
    Stopped,
    /// Loading persisted state and spawning the pipeline.
    Starting,
    /// Watching, reconciling, and scanning.
    Running,
    /// A rule reset is in progress; mutating calls are rejected.
    Reconfiguring,
    /// Tearing the pipeline down.
    Stopping,
}

impl std::fmt::Display for EngineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            EngineState::Stopped => "Stopped",
            EngineState::Starting => "Starting",
            EngineState::Running => "Running",
            EngineState::Reconfiguring => "Reconfiguring",
            EngineState::Stopping => "Stopping",
        };
        f.write_str(name)
    }
}

struct EngineRuntime {
    watch: Arc<WatchService>,
    reconciler_tx: mpsc::Sender<ReconcileCommand>,
    reconciler_task: JoinHandle<()>,
    router_task: JoinHandle<()>,
    pool: ScanWorkerPool,
    queue: ScanQueue,
}

/// Builder for [`CollectionEngine`].
#[derive(Default)]
pub struct CollectionEngineBuilder {
    config: EngineConfig,
    catalog: Option<Arc<dyn CatalogUnitOfWorkFactory>>,
    extractor: Option<Arc<dyn MetadataExtractor>>,
    thumbnails: Option<Arc<dyn ThumbnailGenerator>>,
    lister: Option<Arc<dyn DirectoryLister>>,
}

impl CollectionEngineBuilder {
    /// Creates a builder with default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Overrides the engine configuration.
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the catalog store. Required.
    pub fn with_catalog(mut self, catalog: Arc<dyn CatalogUnitOfWorkFactory>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    /// Overrides the metadata extractor.
    pub fn with_extractor(mut self, extractor: Arc<dyn MetadataExtractor>) -> Self {
        self.extractor = Some(extractor);
        self
    }

    /// Overrides the thumbnail generator.
    pub fn with_thumbnails(mut self, thumbnails: Arc<dyn ThumbnailGenerator>) -> Self {
        self.thumbnails = Some(thumbnails);
        self
    }

    /// Overrides the directory lister.
    pub fn with_lister(mut self, lister: Arc<dyn DirectoryLister>) -> Self {
        self.lister = Some(lister);
        self
    }

    /// Builds the engine in the `Stopped` state.
    pub fn build(self) -> Result<CollectionEngine> {
        let catalog = self.catalog.ok_or_else(|| {
            EngineError::Internal("engine requires a catalog unit-of-work factory".into())
        })?;
        let lister = match self.lister {
            Some(lister) => lister,
            None => Arc::new(FsLister::new(self.config.extensions.clone())),
        };
        let extractor = self
            .extractor
            .unwrap_or_else(|| Arc::new(FsMetadataExtractor));
        let thumbnails = self
            .thumbnails
            .unwrap_or_else(|| Arc::new(NoopThumbnailGenerator));
        Ok(CollectionEngine {
            config: self.config,
            catalog,
            extractor,
            thumbnails,
            lister,
            index: ContainerIndex::new(),
            events: EngineEventBus::default(),
            rules: Arc::new(RwLock::new(ResolvedWatchSet::default())),
            state: Arc::new(RwLock::new(EngineState::Stopped)),
            runtime: Mutex::new(None),
        })
    }
}

impl std::fmt::Debug for CollectionEngineBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollectionEngineBuilder")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// The photo collection engine.
pub struct CollectionEngine {
    config: EngineConfig,
    catalog: Arc<dyn CatalogUnitOfWorkFactory>,
    extractor: Arc<dyn MetadataExtractor>,
    thumbnails: Arc<dyn ThumbnailGenerator>,
    lister: Arc<dyn DirectoryLister>,
    index: ContainerIndex,
    events: EngineEventBus,
    rules: Arc<RwLock<ResolvedWatchSet>>,
    state: Arc<RwLock<EngineState>>,
    runtime: Mutex<Option<EngineRuntime>>,
}

impl CollectionEngine {
    /// Starts building an engine.
    pub fn builder() -> CollectionEngineBuilder {
        CollectionEngineBuilder::new()
    }

    /// Current lifecycle state.
    pub async fn state(&self) -> EngineState {
        *self.state.read().await
    }

    /// Cloneable handle to the live container index.
    pub fn index(&self) -> ContainerIndex {
        self.index.clone()
    }

    /// Subscribes to catalog events published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<CatalogEventEnvelope> {
        self.events.subscribe()
    }

    /// Per-root watcher statuses, empty unless running.
    pub async fn watch_status(&self) -> HashMap<String, WatchRootStatus> {
        match self.runtime.lock().await.as_ref() {
            Some(runtime) => runtime.watch.statuses().await,
            None => HashMap::new(),
        }
    }

    /// Snapshot of the resolved rule set currently in force.
    pub async fn resolved_rules(&self) -> ResolvedWatchSet {
        self.rules.read().await.clone()
    }

    /// Starts the engine: resolves persisted rules, loads containers
    /// into the index, spawns the pipeline, and attaches watchers.
    pub async fn start(&self) -> Result<()> {
        self.transition(EngineState::Stopped, EngineState::Starting, "start")
            .await?;
        match self.start_inner().await {
            Ok(runtime) => {
                *self.runtime.lock().await = Some(runtime);
                self.set_state(EngineState::Running).await;
                tracing::info!(target: "engine", "engine running");
                Ok(())
            }
            Err(err) => {
                self.set_state(EngineState::Stopped).await;
                Err(err)
            }
        }
    }

    async fn start_inner(&self) -> Result<EngineRuntime> {
        // Resolve rules and load the persisted catalog before spawning
        // anything; a failure here leaves no partial runtime behind.
        let (resolved, containers) = {
            let reader = self.catalog.begin_read().await?;
            let rules = reader.rules().list().await?;
            let resolved = resolve_watch_set(&rules)?;
            let folders = reader.folders().list().await?;
            let images = reader.images().list().await?;
            let albums = reader.albums().list().await?;
            (resolved, build_containers(folders, images, albums))
        };
        tracing::info!(
            target: "engine",
            roots = resolved.roots.len(),
            containers = containers.len(),
            "loaded catalog state"
        );
        self.index.replace_all(containers).await;
        *self.rules.write().await = resolved;

        let ingest = Arc::new(IngestPipeline::new(
            Arc::clone(&self.catalog),
            Arc::clone(&self.extractor),
            Arc::clone(&self.thumbnails),
            self.index.clone(),
            self.events.clone(),
        ));
        let handler: Arc<dyn ScanItemHandler> = ingest.clone();
        let (pool, queue) = ScanWorkerPool::spawn(&self.config.pool, self.config.retry, handler);

        let (signal_tx, signal_rx) = mpsc::channel(256);
        let (reconciler_tx, reconciler_task) = Reconciler::spawn(
            Arc::clone(&self.lister),
            Arc::clone(&self.rules),
            self.config.extensions.clone(),
            signal_tx,
        );
        reconciler_tx
            .send(ReconcileCommand::Attach {
                index: self.index.clone(),
            })
            .await
            .map_err(|_| EngineError::Internal("reconciler mailbox closed at startup".into()))?;
        let router_task = spawn_signal_router(signal_rx, queue.clone(), Arc::clone(&ingest));

        let watch = Arc::new(WatchService::new(
            WatchTuning::from(&self.config.watch),
            self.config.extensions.clone(),
            Arc::clone(&self.rules),
            reconciler_tx.clone(),
        ));
        watch.attach().await?;

        Ok(EngineRuntime {
            watch,
            reconciler_tx,
            reconciler_task,
            router_task,
            pool,
            queue,
        })
    }

    /// Stops the engine. Watchers detach first and buffered debounce
    /// state is discarded; in-flight scan items finish before the
    /// workers exit.
    pub async fn stop(&self) -> Result<()> {
        self.transition(EngineState::Running, EngineState::Stopping, "stop")
            .await?;
        let runtime = self.runtime.lock().await.take();
        if let Some(runtime) = runtime {
            runtime.watch.detach().await;
            // The watch service holds a reconciler sender; release it
            // so the actor can drain and exit.
            drop(runtime.watch);
            let _ = runtime.reconciler_tx.send(ReconcileCommand::Detach).await;
            drop(runtime.reconciler_tx);
            runtime.pool.shutdown().await;
            let _ = runtime.reconciler_task.await;
            let _ = runtime.router_task.await;
            drop(runtime.queue);
        }
        self.set_state(EngineState::Stopped).await;
        tracing::info!(target: "engine", "engine stopped");
        Ok(())
    }

    /// Scans `path` recursively once, persisting a `Once` rule for it.
    ///
    /// Already-indexed files are skipped before they reach the queue.
    /// Returns the number of files handed to the scan pool, after every
    /// one of them has been processed or dropped.
    pub async fn scan_folder(&self, path: impl AsRef<Path>) -> Result<usize> {
        let path = path.as_ref();
        self.require_running("scan_folder").await?;
        let path_key = normalize_path(path);

        let updated = {
            let uow = self.catalog.begin().await?;
            uow.rules()
                .upsert(&FolderRule::new(path_key.clone(), RuleAction::Once))
                .await?;
            let rules = uow.rules().list().await?;
            let resolved = resolve_watch_set(&rules)?;
            uow.commit().await?;
            resolved
        };
        *self.rules.write().await = updated;

        let listing = self.lister.list_images(path).await?;
        let mut batch = Vec::with_capacity(listing.len());
        for file in listing {
            let file_key = normalize_path(&file.path);
            if self.index.contains_path(&file_key).await {
                continue;
            }
            batch.push(file.path);
        }
        let queued = batch.len();
        if queued == 0 {
            tracing::debug!(target: "engine", path = %path_key, "scan found nothing new");
            return Ok(0);
        }

        let queue = {
            let guard = self.runtime.lock().await;
            let runtime = guard
                .as_ref()
                .ok_or_else(|| EngineError::State("scan_folder requires Running".into()))?;
            runtime.queue.clone()
        };
        let ticket = queue.enqueue_batch(batch).await?;
        ticket.wait().await;
        tracing::info!(target: "engine", path = %path_key, queued, "folder scan complete");
        Ok(queued)
    }

    /// Atomically replaces the rule set, deleting whatever the new set
    /// no longer covers. On failure the catalog, the index, and the
    /// watchers all keep their previous state.
    pub async fn reset_rules(&self, rules: &[FolderRule]) -> Result<ResetChanges> {
        let resolved = resolve_watch_set(rules)?;
        let was_running = {
            let mut state = self.state.write().await;
            match *state {
                EngineState::Running => {
                    *state = EngineState::Reconfiguring;
                    true
                }
                EngineState::Stopped => false,
                other => {
                    return Err(EngineError::State(format!(
                        "reset_rules requires Running or Stopped, engine is {other}"
                    )));
                }
            }
        };
        let outcome = self.reset_inner(resolved, was_running).await;
        if was_running {
            self.set_state(EngineState::Running).await;
        }
        outcome
    }

    async fn reset_inner(
        &self,
        resolved: ResolvedWatchSet,
        was_running: bool,
    ) -> Result<ResetChanges> {
        let watch = if was_running {
            self.runtime
                .lock()
                .await
                .as_ref()
                .map(|runtime| Arc::clone(&runtime.watch))
        } else {
            None
        };
        if let Some(watch) = &watch {
            watch.detach().await;
        }

        let persisted: Vec<FolderRule> = resolved.rules().cloned().collect();
        let applied: Result<ResetChanges> = async {
            let uow = self.catalog.begin().await?;
            let folders = uow.folders().list().await?;
            let images = uow.images().list().await?;
            let changes = plan_rule_changes(&resolved, &folders, &images);
            uow.rules().replace_all(&persisted).await?;
            for path in &changes.deleted_image_paths {
                uow.images().remove_by_path(path).await?;
            }
            for id in &changes.deleted_folder_ids {
                uow.folders().remove(*id).await?;
            }
            uow.commit().await?;
            Ok(changes)
        }
        .await;

        match applied {
            Ok(changes) => {
                for id in &changes.deleted_folder_ids {
                    let key = ContainerKey::Folder(*id);
                    if self.index.remove(&key).await.is_some() {
                        self.events.publish(CatalogEvent::ContainerRemoved { key });
                    }
                }
                for path in &changes.deleted_image_paths {
                    self.index.remove_image(path).await;
                }
                *self.rules.write().await = resolved;
                if was_running {
                    // Re-binding the index also clears stale listing
                    // fingerprints in the reconciler.
                    if let Some(runtime) = self.runtime.lock().await.as_ref() {
                        let _ = runtime
                            .reconciler_tx
                            .send(ReconcileCommand::Attach {
                                index: self.index.clone(),
                            })
                            .await;
                    }
                }
                if let Some(watch) = &watch {
                    watch.attach().await?;
                }
                tracing::info!(
                    target: "engine",
                    deleted_images = changes.deleted_image_paths.len(),
                    deleted_folders = changes.deleted_folder_ids.len(),
                    "rule set replaced"
                );
                self.events.publish(CatalogEvent::RulesReset {
                    changes: changes.clone(),
                });
                Ok(changes)
            }
            Err(err) => {
                // Watchers come back on the unchanged rule set.
                if let Some(watch) = &watch {
                    let _ = watch.attach().await;
                }
                Err(err)
            }
        }
    }

    /// Computes what `rules` would delete, without mutating anything.
    pub async fn preview_rule_changes(&self, rules: &[FolderRule]) -> Result<ResetChanges> {
        let state = *self.state.read().await;
        if !matches!(state, EngineState::Running | EngineState::Stopped) {
            return Err(EngineError::State(format!(
                "preview_rule_changes requires Running or Stopped, engine is {state}"
            )));
        }
        let resolved = resolve_watch_set(rules)?;
        let reader = self.catalog.begin_read().await?;
        let folders = reader.folders().list().await?;
        let images = reader.images().list().await?;
        Ok(plan_rule_changes(&resolved, &folders, &images))
    }

    async fn transition(&self, from: EngineState, to: EngineState, op: &str) -> Result<()> {
        let mut state = self.state.write().await;
        if *state != from {
            return Err(EngineError::State(format!(
                "{op} requires {from}, engine is {state}"
            )));
        }
        *state = to;
        Ok(())
    }

    async fn set_state(&self, to: EngineState) {
        *self.state.write().await = to;
    }

    async fn require_running(&self, op: &str) -> Result<()> {
        let state = *self.state.read().await;
        if state != EngineState::Running {
            return Err(EngineError::State(format!(
                "{op} requires Running, engine is {state}"
            )));
        }
        Ok(())
    }
}

impl std::fmt::Debug for CollectionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollectionEngine")
            .field("config", &self.config)
            .field("index", &self.index)
            .finish_non_exhaustive()
    }
}

fn spawn_signal_router(
    mut signals: mpsc::Receiver<ChangeSignal>,
    queue: ScanQueue,
    ingest: Arc<IngestPipeline>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(signal) = signals.recv().await {
            match signal {
                ChangeSignal::Discovered { path } => {
                    if queue.enqueue(path).await.is_err() {
                        break;
                    }
                }
                ChangeSignal::Deleted { image } => {
                    if let Err(err) = ingest.remove_image(&image).await {
                        tracing::warn!(
                            target: "engine",
                            path = %image.path,
                            error = %err,
                            "failed to apply deletion"
                        );
                    }
                }
                ChangeSignal::Renamed { image, to } => {
                    if let Err(err) = ingest.rename_image(&image, &to).await {
                        tracing::warn!(
                            target: "engine",
                            from = %image.path,
                            to = %to.display(),
                            error = %err,
                            "failed to apply rename"
                        );
                    }
                }
            }
        }
        tracing::debug!(target: "engine", "signal router exited");
    })
}

/// Joins persisted rows into the containers the index serves.
///
/// Folder containers own their images' refs. Album containers carry
/// ref copies re-pointed at the album; the index's derived path map
/// still prefers the folder copy.
fn build_containers(
    folders: Vec<FolderRecord>,
    images: Vec<ImageRecord>,
    albums: Vec<AlbumRecord>,
) -> Vec<ImageContainer> {
    let folder_dates: HashMap<_, DateTime<Utc>> =
        folders.iter().map(|folder| (folder.id, folder.date)).collect();

    let mut by_folder: HashMap<_, Vec<ImageRef>> = HashMap::new();
    let mut by_id: HashMap<ImageId, ImageRef> = HashMap::new();
    for image in images {
        let Some(container_date) = folder_dates.get(&image.folder_id).copied() else {
            tracing::warn!(
                target: "engine",
                path = %image.path,
                "image row references an unknown folder; skipping"
            );
            continue;
        };
        let image_ref = ImageRef {
            id: image.id,
            path: image.path,
            created_at: image.created_at,
            modified_at: image.modified_at,
            exif_date: image.exif_date,
            container: ContainerKey::Folder(image.folder_id),
            container_date,
        };
        by_id.insert(image_ref.id, image_ref.clone());
        by_folder.entry(image.folder_id).or_default().push(image_ref);
    }

    let mut containers: Vec<ImageContainer> = Vec::with_capacity(folders.len() + albums.len());
    for folder in folders {
        let images = by_folder.remove(&folder.id).unwrap_or_default();
        containers.push(ImageContainer::Folder(FolderContainer {
            id: folder.id,
            path: folder.path,
            name: folder.name,
            date: folder.date,
            images,
        }));
    }
    for album in albums {
        let images = album
            .image_ids
            .iter()
            .filter_map(|id| by_id.get(id))
            .map(|image| {
                let mut image = image.clone();
                image.container = ContainerKey::Album(album.id);
                image.container_date = album.date;
                image
            })
            .collect();
        containers.push(ImageContainer::Album(AlbumContainer {
            id: album.id,
            name: album.name,
            date: album.date,
            images,
        }));
    }
    containers
}
