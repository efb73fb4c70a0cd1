//! Reconciliation actor.
//!
//! Owns the listing-versus-index diff that turns raw filesystem noise
//! into definitive change signals. One rescan per touched directory;
//! each difference is signalled exactly once per pass.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;

use lumex_model::ImageRef;

use crate::config::ExtensionFilter;
use crate::index::ContainerIndex;
use crate::listing::{listing_fingerprint, DirectoryLister};
use crate::rules::{normalize_path, ResolvedWatchSet};

/// Commands accepted by the reconciler mailbox.
#[derive(Debug)]
pub(crate) enum ReconcileCommand {
    /// Rescan the listed directories. `deep` walks whole subtrees and
    /// is used for overflow recovery.
    Rescan { dirs: Vec<PathBuf>, deep: bool },
    /// Resolve a raw deletion event against the index.
    ResolveDelete { path: PathBuf },
    /// Resolve a raw rename event against the index and the disk.
    ResolveRename { old: PathBuf, new: PathBuf },
    /// Bind the actor to a live index, clearing stale fingerprints.
    Attach { index: ContainerIndex },
    /// Unbind from the index; subsequent commands are ignored.
    Detach,
}

/// A definitive catalog-affecting change.
#[derive(Clone, Debug, PartialEq)]
pub enum ChangeSignal {
    /// A file that should be catalogued but is not, or whose
    /// timestamps drifted from the indexed ref.
    Discovered {
        /// Absolute path of the file.
        path: PathBuf,
    },
    /// An indexed image that no longer exists on disk.
    Deleted {
        /// The ref as it was indexed.
        image: ImageRef,
    },
    /// An indexed image that moved while keeping its identity.
    Renamed {
        /// The ref under its old path.
        image: ImageRef,
        /// The path it moved to.
        to: PathBuf,
    },
}

pub(crate) struct Reconciler {
    lister: Arc<dyn DirectoryLister>,
    rules: Arc<RwLock<ResolvedWatchSet>>,
    filter: ExtensionFilter,
    signals: mpsc::Sender<ChangeSignal>,
    index: Option<ContainerIndex>,
    fingerprints: HashMap<String, String>,
}

impl Reconciler {
    /// Spawns the actor task and returns its mailbox.
    pub(crate) fn spawn(
        lister: Arc<dyn DirectoryLister>,
        rules: Arc<RwLock<ResolvedWatchSet>>,
        filter: ExtensionFilter,
        signals: mpsc::Sender<ChangeSignal>,
    ) -> (mpsc::Sender<ReconcileCommand>, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::channel(256);
        let mut actor = Self {
            lister,
            rules,
            filter,
            signals,
            index: None,
            fingerprints: HashMap::new(),
        };
        let task = tokio::spawn(async move {
            while let Some(command) = rx.recv().await {
                actor.handle(command).await;
            }
            tracing::debug!(target: "reconcile", "reconciler mailbox closed");
        });
        (tx, task)
    }

    async fn handle(&mut self, command: ReconcileCommand) {
        match command {
            ReconcileCommand::Rescan { dirs, deep } => self.rescan(dirs, deep).await,
            ReconcileCommand::ResolveDelete { path } => self.resolve_delete(&path).await,
            ReconcileCommand::ResolveRename { old, new } => {
                self.resolve_rename(old, new).await;
            }
            ReconcileCommand::Attach { index } => {
                self.index = Some(index);
                self.fingerprints.clear();
            }
            ReconcileCommand::Detach => {
                self.index = None;
                self.fingerprints.clear();
            }
        }
    }

    async fn rescan(&mut self, dirs: Vec<PathBuf>, deep: bool) {
        let Some(index) = self.index.clone() else {
            tracing::debug!(target: "reconcile", "rescan ignored while detached");
            return;
        };
        for dir in dirs {
            let listing = if deep {
                self.lister.list_images(&dir).await
            } else {
                self.lister.list_dir(&dir).await
            };
            let listing = match listing {
                Ok(listing) => listing,
                Err(err) => {
                    tracing::warn!(
                        target: "reconcile",
                        dir = %dir.display(),
                        error = %err,
                        "rescan listing failed"
                    );
                    continue;
                }
            };

            let dir_key = normalize_path(&dir);
            if !deep {
                let fingerprint = listing_fingerprint(&listing);
                if self
                    .fingerprints
                    .get(&dir_key)
                    .is_some_and(|known| *known == fingerprint)
                {
                    tracing::debug!(
                        target: "reconcile",
                        dir = %dir.display(),
                        "listing unchanged; skipping rescan"
                    );
                    continue;
                }
                self.fingerprints.insert(dir_key.clone(), fingerprint);
            }

            let mut listed: HashSet<String> = HashSet::with_capacity(listing.len());
            for file in listing {
                let path_key = normalize_path(&file.path);
                listed.insert(path_key.clone());
                match index.image_ref(&path_key).await {
                    None => self.emit(ChangeSignal::Discovered { path: file.path }).await,
                    Some(known) if !known.matches_times(file.created_at, file.modified_at) => {
                        self.emit(ChangeSignal::Discovered { path: file.path }).await;
                    }
                    Some(_) => {}
                }
            }

            let indexed = if deep {
                index.image_refs_under(&dir_key).await
            } else {
                index.image_refs_in_dir(&dir_key).await
            };
            for known in indexed {
                if !listed.contains(&known.path) {
                    self.emit(ChangeSignal::Deleted { image: known }).await;
                }
            }
        }
    }

    async fn resolve_delete(&self, path: &std::path::Path) {
        let Some(index) = &self.index else {
            return;
        };
        let path_key = normalize_path(path);
        match index.image_ref(&path_key).await {
            Some(image) => self.emit(ChangeSignal::Deleted { image }).await,
            None => {
                tracing::debug!(
                    target: "reconcile",
                    path = %path.display(),
                    "delete of unindexed path ignored"
                );
            }
        }
    }

    async fn resolve_rename(&self, old: PathBuf, new: PathBuf) {
        let Some(index) = &self.index else {
            return;
        };
        let old_key = normalize_path(&old);
        let new_key = normalize_path(&new);

        let new_accepted = {
            let rules = self.rules.read().await;
            rules.includes(&new_key) && self.filter.matches(&new)
        };
        let new_exists = tokio::fs::try_exists(&new).await.unwrap_or(false);
        let old_ref = index.image_ref(&old_key).await;

        match (old_ref, new_accepted && new_exists) {
            (Some(image), true) => self.emit(ChangeSignal::Renamed { image, to: new }).await,
            (None, true) => self.emit(ChangeSignal::Discovered { path: new }).await,
            (Some(image), false) => self.emit(ChangeSignal::Deleted { image }).await,
            (None, false) => {
                tracing::debug!(
                    target: "reconcile",
                    old = %old.display(),
                    new = %new.display(),
                    "rename of unindexed path into excluded target ignored"
                );
            }
        }
    }

    async fn emit(&self, signal: ChangeSignal) {
        tracing::debug!(target: "reconcile", ?signal, "emitting change signal");
        let _ = self.signals.send(signal).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listing::ListedImage;
    use crate::rules::resolve_watch_set;
    use async_trait::async_trait;
    use chrono::Utc;
    use lumex_model::{ContainerKey, FolderRecord, FolderRule, ImageId, RuleAction};
    use std::time::Duration;

    struct StubLister {
        by_dir: std::sync::Mutex<HashMap<PathBuf, Vec<ListedImage>>>,
    }

    impl StubLister {
        fn new() -> Self {
            Self {
                by_dir: std::sync::Mutex::new(HashMap::new()),
            }
        }

        fn set(&self, dir: impl Into<PathBuf>, listing: Vec<ListedImage>) {
            self.by_dir.lock().unwrap().insert(dir.into(), listing);
        }
    }

    #[async_trait]
    impl DirectoryLister for StubLister {
        async fn list_images(&self, path: &std::path::Path) -> crate::error::Result<Vec<ListedImage>> {
            self.list_dir(path).await
        }

        async fn list_dir(&self, path: &std::path::Path) -> crate::error::Result<Vec<ListedImage>> {
            self.by_dir
                .lock()
                .unwrap()
                .get(path)
                .cloned()
                .ok_or_else(|| {
                    crate::error::EngineError::Io(std::io::Error::new(
                        std::io::ErrorKind::NotFound,
                        "no such directory",
                    ))
                })
        }
    }

    fn listed(path: &str) -> ListedImage {
        let now = Utc::now();
        ListedImage {
            path: PathBuf::from(path),
            created_at: now,
            modified_at: now,
            size: 64,
        }
    }

    fn indexed_ref(folder: &FolderRecord, path: &str) -> ImageRef {
        let now = Utc::now();
        ImageRef {
            id: ImageId::new(),
            path: path.to_string(),
            created_at: now,
            modified_at: now,
            exif_date: None,
            container: ContainerKey::Folder(folder.id),
            container_date: folder.date,
        }
    }

    struct Harness {
        lister: Arc<StubLister>,
        index: ContainerIndex,
        commands: mpsc::Sender<ReconcileCommand>,
        signals: mpsc::Receiver<ChangeSignal>,
        _task: JoinHandle<()>,
    }

    async fn harness(rules: Vec<FolderRule>) -> Harness {
        let lister = Arc::new(StubLister::new());
        let resolved = resolve_watch_set(&rules).unwrap();
        let rules = Arc::new(RwLock::new(resolved));
        let (signal_tx, signal_rx) = mpsc::channel(64);
        let (commands, task) = Reconciler::spawn(
            Arc::clone(&lister) as Arc<dyn DirectoryLister>,
            rules,
            ExtensionFilter::default(),
            signal_tx,
        );
        let index = ContainerIndex::new();
        commands
            .send(ReconcileCommand::Attach {
                index: index.clone(),
            })
            .await
            .unwrap();
        Harness {
            lister,
            index,
            commands,
            signals: signal_rx,
            _task: task,
        }
    }

    async fn next_signal(rx: &mut mpsc::Receiver<ChangeSignal>) -> ChangeSignal {
        tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("timed out waiting for signal")
            .expect("signal channel closed")
    }

    async fn assert_no_signal(rx: &mut mpsc::Receiver<ChangeSignal>) {
        let outcome = tokio::time::timeout(Duration::from_millis(100), rx.recv()).await;
        assert!(outcome.is_err(), "unexpected signal: {:?}", outcome);
    }

    #[tokio::test]
    async fn rescan_discovers_unindexed_files() {
        let mut h = harness(vec![FolderRule::new("/photos", RuleAction::Always)]).await;
        h.lister.set("/photos", vec![listed("/photos/a.jpg")]);

        h.commands
            .send(ReconcileCommand::Rescan {
                dirs: vec![PathBuf::from("/photos")],
                deep: false,
            })
            .await
            .unwrap();

        assert_eq!(
            next_signal(&mut h.signals).await,
            ChangeSignal::Discovered {
                path: PathBuf::from("/photos/a.jpg")
            }
        );
    }

    #[tokio::test]
    async fn unchanged_listing_is_rescanned_once() {
        let mut h = harness(vec![FolderRule::new("/photos", RuleAction::Always)]).await;
        h.lister.set("/photos", vec![listed("/photos/a.jpg")]);

        for _ in 0..2 {
            h.commands
                .send(ReconcileCommand::Rescan {
                    dirs: vec![PathBuf::from("/photos")],
                    deep: false,
                })
                .await
                .unwrap();
        }

        let _first = next_signal(&mut h.signals).await;
        assert_no_signal(&mut h.signals).await;
    }

    #[tokio::test]
    async fn rescan_reports_indexed_files_missing_from_the_listing() {
        let mut h = harness(vec![FolderRule::new("/photos", RuleAction::Always)]).await;
        let folder = FolderRecord::new("/photos", Utc::now());
        let gone = indexed_ref(&folder, "/photos/gone.jpg");
        h.index.apply_image(&folder, gone.clone()).await;
        h.lister.set("/photos", Vec::new());

        h.commands
            .send(ReconcileCommand::Rescan {
                dirs: vec![PathBuf::from("/photos")],
                deep: false,
            })
            .await
            .unwrap();

        assert_eq!(
            next_signal(&mut h.signals).await,
            ChangeSignal::Deleted { image: gone }
        );
    }

    #[tokio::test]
    async fn delete_of_unindexed_path_is_ignored() {
        let mut h = harness(vec![FolderRule::new("/photos", RuleAction::Always)]).await;

        h.commands
            .send(ReconcileCommand::ResolveDelete {
                path: PathBuf::from("/photos/never-seen.jpg"),
            })
            .await
            .unwrap();

        assert_no_signal(&mut h.signals).await;
    }

    #[tokio::test]
    async fn delete_of_indexed_path_signals_deletion() {
        let mut h = harness(vec![FolderRule::new("/photos", RuleAction::Always)]).await;
        let folder = FolderRecord::new("/photos", Utc::now());
        let image = indexed_ref(&folder, "/photos/a.jpg");
        h.index.apply_image(&folder, image.clone()).await;

        h.commands
            .send(ReconcileCommand::ResolveDelete {
                path: PathBuf::from("/photos/a.jpg"),
            })
            .await
            .unwrap();

        assert_eq!(next_signal(&mut h.signals).await, ChangeSignal::Deleted { image });
    }

    #[tokio::test]
    async fn rename_of_indexed_image_keeps_identity() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().to_path_buf();
        let mut h = harness(vec![FolderRule::new(
            root.to_string_lossy().as_ref(),
            RuleAction::Always,
        )])
        .await;
        let new_path = root.join("renamed.jpg");
        tokio::fs::write(&new_path, b"x").await.unwrap();

        let folder = FolderRecord::new(normalize_path(&root), Utc::now());
        let old_key = normalize_path(&root.join("original.jpg"));
        let image = indexed_ref(&folder, &old_key);
        h.index.apply_image(&folder, image.clone()).await;

        h.commands
            .send(ReconcileCommand::ResolveRename {
                old: root.join("original.jpg"),
                new: new_path.clone(),
            })
            .await
            .unwrap();

        assert_eq!(
            next_signal(&mut h.signals).await,
            ChangeSignal::Renamed {
                image,
                to: new_path
            }
        );
    }

    #[tokio::test]
    async fn rename_of_unindexed_image_discovers_the_new_path() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().to_path_buf();
        let mut h = harness(vec![FolderRule::new(
            root.to_string_lossy().as_ref(),
            RuleAction::Always,
        )])
        .await;
        let new_path = root.join("appeared.jpg");
        tokio::fs::write(&new_path, b"x").await.unwrap();

        h.commands
            .send(ReconcileCommand::ResolveRename {
                old: root.join("unknown.jpg"),
                new: new_path.clone(),
            })
            .await
            .unwrap();

        assert_eq!(
            next_signal(&mut h.signals).await,
            ChangeSignal::Discovered { path: new_path }
        );
    }

    #[tokio::test]
    async fn rename_into_excluded_target_deletes_the_old_ref() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().to_path_buf();
        let mut h = harness(vec![FolderRule::new(
            root.to_string_lossy().as_ref(),
            RuleAction::Always,
        )])
        .await;
        // Target exists but fails the extension filter.
        let new_path = root.join("demoted.txt");
        tokio::fs::write(&new_path, b"x").await.unwrap();

        let folder = FolderRecord::new(normalize_path(&root), Utc::now());
        let old_key = normalize_path(&root.join("kept.jpg"));
        let image = indexed_ref(&folder, &old_key);
        h.index.apply_image(&folder, image.clone()).await;

        h.commands
            .send(ReconcileCommand::ResolveRename {
                old: root.join("kept.jpg"),
                new: new_path,
            })
            .await
            .unwrap();

        assert_eq!(next_signal(&mut h.signals).await, ChangeSignal::Deleted { image });
    }

    #[tokio::test]
    async fn detached_reconciler_ignores_commands() {
        let mut h = harness(vec![FolderRule::new("/photos", RuleAction::Always)]).await;
        h.lister.set("/photos", vec![listed("/photos/a.jpg")]);
        h.commands.send(ReconcileCommand::Detach).await.unwrap();

        h.commands
            .send(ReconcileCommand::Rescan {
                dirs: vec![PathBuf::from("/photos")],
                deep: false,
            })
            .await
            .unwrap();

        assert_no_signal(&mut h.signals).await;
    }
}
