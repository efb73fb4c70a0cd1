//! Live filesystem watching through the full engine: debounced creates,
//! deletes, renames, buffered-event discard on stop, and per-root
//! watcher failure isolation.

use std::fs;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tempfile::TempDir;
use tokio::time::sleep;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use lumex_core::catalog::{CatalogUnitOfWorkFactory, MemoryCatalog};
use lumex_core::watch::WatchRootStatus;
use lumex_core::{CollectionEngine, EngineConfig, EngineState};
use lumex_model::{FolderRule, RuleAction};

/// Run with RUST_LOG=watch=debug,reconcile=debug to trace event flow.
fn init_tracing() {
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with(tracing_subscriber::fmt::layer().with_test_writer())
        .try_init();
}

fn key_of(path: &Path) -> String {
    path.display().to_string()
}

fn watched_tree(temp: &TempDir) -> PathBuf {
    let root = temp
        .path()
        .canonicalize()
        .expect("canonical temp path")
        .join("photos");
    fs::create_dir_all(&root).expect("create root");
    root
}

fn fast_watch_config() -> EngineConfig {
    let mut config = EngineConfig::default();
    config.watch.debounce_window_ms = 150;
    config
}

async fn live_engine(
    catalog: &MemoryCatalog,
    config: EngineConfig,
    root: &Path,
) -> CollectionEngine {
    init_tracing();
    let engine = CollectionEngine::builder()
        .with_config(config)
        .with_catalog(Arc::new(catalog.clone()))
        .build()
        .expect("engine builds");
    engine.start().await.expect("start");
    engine
        .reset_rules(&[FolderRule::new(key_of(root), RuleAction::Always)])
        .await
        .expect("install watch rule");
    engine
}

async fn wait_until<F, Fut>(what: &str, mut condition: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = Instant::now() + Duration::from_secs(10);
    while Instant::now() < deadline {
        if condition().await {
            return;
        }
        sleep(Duration::from_millis(25)).await;
    }
    panic!("timed out waiting until {what}");
}

#[tokio::test]
async fn created_file_is_catalogued_through_the_watcher() {
    let temp = TempDir::new().expect("tempdir");
    let root = watched_tree(&temp);
    let catalog = MemoryCatalog::new();
    let engine = live_engine(&catalog, fast_watch_config(), &root).await;

    fs::write(root.join("fresh.jpg"), b"fake image content").expect("write image");

    let index = engine.index();
    let key = key_of(&root.join("fresh.jpg"));
    wait_until("the new file is catalogued", || {
        let index = index.clone();
        let key = key.clone();
        async move { index.contains_path(&key).await }
    })
    .await;

    let reader = catalog.begin_read().await.expect("read txn");
    let images = reader.images().list().await.expect("images");
    assert_eq!(images.len(), 1);
    assert_eq!(images[0].path, key);

    engine.stop().await.expect("stop");
}

#[tokio::test]
async fn deleted_file_is_dropped_from_catalog_and_index() {
    let temp = TempDir::new().expect("tempdir");
    let root = watched_tree(&temp);
    let catalog = MemoryCatalog::new();
    let engine = live_engine(&catalog, fast_watch_config(), &root).await;

    let target = root.join("doomed.jpg");
    fs::write(&target, b"fake image content").expect("write image");

    let index = engine.index();
    let key = key_of(&target);
    wait_until("the file is catalogued", || {
        let index = index.clone();
        let key = key.clone();
        async move { index.contains_path(&key).await }
    })
    .await;

    fs::remove_file(&target).expect("remove image");
    wait_until("the deletion is reconciled", || {
        let index = index.clone();
        let key = key.clone();
        async move { !index.contains_path(&key).await }
    })
    .await;

    let reader = catalog.begin_read().await.expect("read txn");
    assert!(reader.images().list().await.expect("images").is_empty());

    engine.stop().await.expect("stop");
}

#[tokio::test]
async fn renamed_file_keeps_its_identity() {
    let temp = TempDir::new().expect("tempdir");
    let root = watched_tree(&temp);
    let catalog = MemoryCatalog::new();
    let engine = live_engine(&catalog, fast_watch_config(), &root).await;

    let before = root.join("before.jpg");
    fs::write(&before, b"fake image content").expect("write image");

    let index = engine.index();
    let before_key = key_of(&before);
    wait_until("the file is catalogued", || {
        let index = index.clone();
        let key = before_key.clone();
        async move { index.contains_path(&key).await }
    })
    .await;
    let original = index
        .image_ref(&before_key)
        .await
        .expect("catalogued ref");

    let after = root.join("after.jpg");
    fs::rename(&before, &after).expect("rename image");

    let after_key = key_of(&after);
    wait_until("the rename is reconciled", || {
        let index = index.clone();
        let key = after_key.clone();
        async move { index.contains_path(&key).await }
    })
    .await;

    let renamed = index.image_ref(&after_key).await.expect("renamed ref");
    assert_eq!(renamed.id, original.id);
    assert!(!index.contains_path(&before_key).await);

    let reader = catalog.begin_read().await.expect("read txn");
    let images = reader.images().list().await.expect("images");
    assert_eq!(images.len(), 1);
    assert_eq!(images[0].id, original.id);
    assert_eq!(images[0].path, after_key);

    engine.stop().await.expect("stop");
}

#[tokio::test]
async fn stop_discards_buffered_watch_events() {
    let temp = TempDir::new().expect("tempdir");
    let root = watched_tree(&temp);
    let catalog = MemoryCatalog::new();
    // A debounce window far longer than the test keeps the create
    // buffered until stop throws it away.
    let mut config = EngineConfig::default();
    config.watch.debounce_window_ms = 30_000;
    let engine = live_engine(&catalog, config, &root).await;

    let buffered = root.join("buffered.jpg");
    fs::write(&buffered, b"fake image content").expect("write image");
    sleep(Duration::from_millis(300)).await;

    engine.stop().await.expect("stop");
    assert_eq!(engine.state().await, EngineState::Stopped);

    sleep(Duration::from_millis(200)).await;
    assert!(!engine.index().contains_path(&key_of(&buffered)).await);
    let reader = catalog.begin_read().await.expect("read txn");
    assert!(reader.images().list().await.expect("images").is_empty());
}

#[tokio::test]
async fn watcher_failures_are_isolated_per_root() {
    init_tracing();
    let temp = TempDir::new().expect("tempdir");
    let base = temp.path().canonicalize().expect("canonical temp path");
    let healthy = base.join("healthy");
    fs::create_dir_all(&healthy).expect("create healthy root");
    let missing = base.join("missing");

    let catalog = MemoryCatalog::new();
    let engine = CollectionEngine::builder()
        .with_config(fast_watch_config())
        .with_catalog(Arc::new(catalog.clone()))
        .build()
        .expect("engine builds");
    engine.start().await.expect("start");
    engine
        .reset_rules(&[
            FolderRule::new(key_of(&healthy), RuleAction::Always),
            FolderRule::new(key_of(&missing), RuleAction::Always),
        ])
        .await
        .expect("reset");

    let statuses = engine.watch_status().await;
    assert_eq!(statuses.get(&key_of(&healthy)), Some(&WatchRootStatus::Watching));
    assert!(matches!(
        statuses.get(&key_of(&missing)),
        Some(WatchRootStatus::Failed(_))
    ));

    // The healthy root still catalogues new files.
    fs::write(healthy.join("alive.jpg"), b"fake image content").expect("write image");
    let index = engine.index();
    let key = key_of(&healthy.join("alive.jpg"));
    wait_until("the healthy root catalogues", || {
        let index = index.clone();
        let key = key.clone();
        async move { index.contains_path(&key).await }
    })
    .await;

    engine.stop().await.expect("stop");
}
