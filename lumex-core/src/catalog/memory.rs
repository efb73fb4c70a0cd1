//! In-memory catalog adapter with staged-copy transactions.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

use lumex_model::{AlbumRecord, FolderId, FolderRecord, FolderRule, ImageId, ImageRecord};

use crate::error::{EngineError, Result};

use super::ports::{
    AlbumRepository, CatalogUnitOfWork, CatalogUnitOfWorkFactory, FolderRepository,
    ImageRepository, RuleRepository,
};

#[derive(Clone, Debug, Default)]
struct CatalogState {
    folders: BTreeMap<String, FolderRecord>,
    images: BTreeMap<String, ImageRecord>,
    rules: BTreeMap<String, FolderRule>,
    albums: Vec<AlbumRecord>,
}

/// Catalog store backed by process memory.
///
/// A write transaction clones the current state, stages every mutation
/// on the clone, and swaps it in on commit. The write gate serializes
/// writers; readers snapshot without touching the gate.
#[derive(Clone, Debug, Default)]
pub struct MemoryCatalog {
    state: Arc<RwLock<CatalogState>>,
    write_gate: Arc<Mutex<()>>,
}

impl MemoryCatalog {
    /// Creates an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds album rows directly, bypassing the unit of work.
    ///
    /// Albums are curated outside this engine; the seeding hook exists
    /// so embedders and tests can provide them.
    pub async fn seed_albums(&self, albums: Vec<AlbumRecord>) {
        self.state.write().await.albums = albums;
    }
}

#[async_trait]
impl CatalogUnitOfWorkFactory for MemoryCatalog {
    async fn begin(&self) -> Result<Box<dyn CatalogUnitOfWork>> {
        let guard = Arc::clone(&self.write_gate).lock_owned().await;
        let staged = self.state.read().await.clone();
        Ok(Box::new(MemoryUnitOfWork::new(
            staged,
            Arc::clone(&self.state),
            Some(guard),
        )))
    }

    async fn begin_read(&self) -> Result<Box<dyn CatalogUnitOfWork>> {
        let staged = self.state.read().await.clone();
        Ok(Box::new(MemoryUnitOfWork::new(
            staged,
            Arc::clone(&self.state),
            None,
        )))
    }
}

struct MemoryUnitOfWork {
    folders: MemoryFolderRepository,
    images: MemoryImageRepository,
    rules: MemoryRuleRepository,
    albums: MemoryAlbumRepository,
    staged: Arc<RwLock<CatalogState>>,
    store: Arc<RwLock<CatalogState>>,
    writable: bool,
    _write_guard: Option<OwnedMutexGuard<()>>,
}

impl MemoryUnitOfWork {
    fn new(
        staged: CatalogState,
        store: Arc<RwLock<CatalogState>>,
        write_guard: Option<OwnedMutexGuard<()>>,
    ) -> Self {
        let staged = Arc::new(RwLock::new(staged));
        Self {
            folders: MemoryFolderRepository {
                staged: Arc::clone(&staged),
            },
            images: MemoryImageRepository {
                staged: Arc::clone(&staged),
            },
            rules: MemoryRuleRepository {
                staged: Arc::clone(&staged),
            },
            albums: MemoryAlbumRepository {
                staged: Arc::clone(&staged),
            },
            writable: write_guard.is_some(),
            _write_guard: write_guard,
            staged,
            store,
        }
    }
}

#[async_trait]
impl CatalogUnitOfWork for MemoryUnitOfWork {
    fn folders(&self) -> &dyn FolderRepository {
        &self.folders
    }

    fn images(&self) -> &dyn ImageRepository {
        &self.images
    }

    fn rules(&self) -> &dyn RuleRepository {
        &self.rules
    }

    fn albums(&self) -> &dyn AlbumRepository {
        &self.albums
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        if self.writable {
            let staged = self.staged.read().await.clone();
            tracing::debug!(
                target: "catalog",
                folders = staged.folders.len(),
                images = staged.images.len(),
                rules = staged.rules.len(),
                "commit"
            );
            *self.store.write().await = staged;
        }
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}

struct MemoryFolderRepository {
    staged: Arc<RwLock<CatalogState>>,
}

#[async_trait]
impl FolderRepository for MemoryFolderRepository {
    async fn find_by_path(&self, path: &str) -> Result<Option<FolderRecord>> {
        Ok(self.staged.read().await.folders.get(path).cloned())
    }

    async fn insert(&self, folder: &FolderRecord) -> Result<()> {
        self.staged
            .write()
            .await
            .folders
            .insert(folder.path.clone(), folder.clone());
        Ok(())
    }

    async fn list(&self) -> Result<Vec<FolderRecord>> {
        Ok(self.staged.read().await.folders.values().cloned().collect())
    }

    async fn remove(&self, id: FolderId) -> Result<()> {
        let mut state = self.staged.write().await;
        state.folders.retain(|_, folder| folder.id != id);
        Ok(())
    }
}

struct MemoryImageRepository {
    staged: Arc<RwLock<CatalogState>>,
}

#[async_trait]
impl ImageRepository for MemoryImageRepository {
    async fn find_by_path(&self, path: &str) -> Result<Option<ImageRecord>> {
        Ok(self.staged.read().await.images.get(path).cloned())
    }

    async fn upsert(&self, image: &ImageRecord) -> Result<()> {
        self.staged
            .write()
            .await
            .images
            .insert(image.path.clone(), image.clone());
        Ok(())
    }

    async fn set_path(&self, id: ImageId, path: &str, folder_id: FolderId) -> Result<()> {
        let mut state = self.staged.write().await;
        let old_key = state
            .images
            .iter()
            .find(|(_, image)| image.id == id)
            .map(|(key, _)| key.clone())
            .ok_or_else(|| EngineError::Persistence(format!("image {id} not found")))?;
        let mut image = state
            .images
            .remove(&old_key)
            .ok_or_else(|| EngineError::Persistence(format!("image {id} vanished")))?;
        image.path = path.to_string();
        image.folder_id = folder_id;
        state.images.insert(image.path.clone(), image);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<ImageRecord>> {
        Ok(self.staged.read().await.images.values().cloned().collect())
    }

    async fn remove_by_path(&self, path: &str) -> Result<Option<ImageRecord>> {
        Ok(self.staged.write().await.images.remove(path))
    }
}

struct MemoryRuleRepository {
    staged: Arc<RwLock<CatalogState>>,
}

#[async_trait]
impl RuleRepository for MemoryRuleRepository {
    async fn list(&self) -> Result<Vec<FolderRule>> {
        Ok(self.staged.read().await.rules.values().cloned().collect())
    }

    async fn upsert(&self, rule: &FolderRule) -> Result<()> {
        self.staged
            .write()
            .await
            .rules
            .insert(rule.path.clone(), rule.clone());
        Ok(())
    }

    async fn replace_all(&self, rules: &[FolderRule]) -> Result<()> {
        self.staged.write().await.rules = rules
            .iter()
            .map(|rule| (rule.path.clone(), rule.clone()))
            .collect();
        Ok(())
    }
}

struct MemoryAlbumRepository {
    staged: Arc<RwLock<CatalogState>>,
}

#[async_trait]
impl AlbumRepository for MemoryAlbumRepository {
    async fn list(&self) -> Result<Vec<AlbumRecord>> {
        Ok(self.staged.read().await.albums.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::time::Duration;

    fn folder(path: &str) -> FolderRecord {
        FolderRecord::new(path, Utc::now())
    }

    #[tokio::test]
    async fn staged_writes_are_invisible_until_commit() {
        let catalog = MemoryCatalog::new();
        let uow = catalog.begin().await.unwrap();
        uow.folders().insert(&folder("/photos")).await.unwrap();

        {
            let reader = catalog.begin_read().await.unwrap();
            assert!(reader.folders().list().await.unwrap().is_empty());
        }

        uow.commit().await.unwrap();
        let reader = catalog.begin_read().await.unwrap();
        assert_eq!(reader.folders().list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn rollback_discards_staged_writes() {
        let catalog = MemoryCatalog::new();
        let uow = catalog.begin().await.unwrap();
        uow.folders().insert(&folder("/photos")).await.unwrap();
        uow.rollback().await.unwrap();

        let reader = catalog.begin_read().await.unwrap();
        assert!(reader.folders().list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn dropping_an_uncommitted_unit_of_work_rolls_back() {
        let catalog = MemoryCatalog::new();
        {
            let uow = catalog.begin().await.unwrap();
            uow.folders().insert(&folder("/photos")).await.unwrap();
        }
        let reader = catalog.begin_read().await.unwrap();
        assert!(reader.folders().list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn writers_serialize_behind_the_gate() {
        let catalog = MemoryCatalog::new();
        let first = catalog.begin().await.unwrap();

        let blocked =
            tokio::time::timeout(Duration::from_millis(50), catalog.begin()).await;
        assert!(blocked.is_err());

        first.commit().await.unwrap();
        let unblocked =
            tokio::time::timeout(Duration::from_millis(50), catalog.begin()).await;
        assert!(unblocked.is_ok());
    }

    #[tokio::test]
    async fn readers_do_not_take_the_write_gate() {
        let catalog = MemoryCatalog::new();
        let _writer = catalog.begin().await.unwrap();
        let reader =
            tokio::time::timeout(Duration::from_millis(50), catalog.begin_read()).await;
        assert!(reader.is_ok());
    }

    #[tokio::test]
    async fn set_path_rekeys_an_image() {
        let catalog = MemoryCatalog::new();
        let home = folder("/photos");
        let image = ImageRecord {
            id: ImageId::new(),
            folder_id: home.id,
            path: "/photos/a.jpg".to_string(),
            created_at: Utc::now(),
            modified_at: Utc::now(),
            exif_date: None,
            exif: None,
        };
        let uow = catalog.begin().await.unwrap();
        uow.images().upsert(&image).await.unwrap();
        uow.images()
            .set_path(image.id, "/photos/b.jpg", home.id)
            .await
            .unwrap();

        assert!(uow.images().find_by_path("/photos/a.jpg").await.unwrap().is_none());
        let moved = uow.images().find_by_path("/photos/b.jpg").await.unwrap().unwrap();
        assert_eq!(moved.id, image.id);
        uow.commit().await.unwrap();
    }
}
