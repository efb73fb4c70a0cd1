//! Repository and unit-of-work traits the engine depends on.

use async_trait::async_trait;

use lumex_model::{AlbumRecord, FolderId, FolderRecord, FolderRule, ImageId, ImageRecord};

use crate::error::Result;

/// Folder row access within one unit of work.
#[async_trait]
pub trait FolderRepository: Send + Sync {
    /// Looks up a folder by its normalized path.
    async fn find_by_path(&self, path: &str) -> Result<Option<FolderRecord>>;

    /// Inserts a new folder row.
    async fn insert(&self, folder: &FolderRecord) -> Result<()>;

    /// Lists every folder row.
    async fn list(&self) -> Result<Vec<FolderRecord>>;

    /// Removes a folder row by id. Missing rows are not an error.
    async fn remove(&self, id: FolderId) -> Result<()>;
}

/// Image row access within one unit of work.
#[async_trait]
pub trait ImageRepository: Send + Sync {
    /// Looks up an image by its normalized path.
    async fn find_by_path(&self, path: &str) -> Result<Option<ImageRecord>>;

    /// Inserts or replaces an image row keyed by path.
    async fn upsert(&self, image: &ImageRecord) -> Result<()>;

    /// Re-keys an existing image to a new path and folder.
    async fn set_path(&self, id: ImageId, path: &str, folder_id: FolderId) -> Result<()>;

    /// Lists every image row.
    async fn list(&self) -> Result<Vec<ImageRecord>>;

    /// Removes an image row by path, returning it if present.
    async fn remove_by_path(&self, path: &str) -> Result<Option<ImageRecord>>;
}

/// Folder rule persistence within one unit of work.
#[async_trait]
pub trait RuleRepository: Send + Sync {
    /// Lists the persisted rule set.
    async fn list(&self) -> Result<Vec<FolderRule>>;

    /// Inserts or replaces one rule keyed by normalized path.
    async fn upsert(&self, rule: &FolderRule) -> Result<()>;

    /// Replaces the whole persisted rule set.
    async fn replace_all(&self, rules: &[FolderRule]) -> Result<()>;
}

/// Album row access within one unit of work.
#[async_trait]
pub trait AlbumRepository: Send + Sync {
    /// Lists every album row.
    async fn list(&self) -> Result<Vec<AlbumRecord>>;
}

/// One transactional scope over the catalog.
///
/// Dropping an uncommitted unit of work rolls its staged writes back.
#[async_trait]
pub trait CatalogUnitOfWork: Send + Sync {
    /// Folder repository bound to this scope.
    fn folders(&self) -> &dyn FolderRepository;

    /// Image repository bound to this scope.
    fn images(&self) -> &dyn ImageRepository;

    /// Rule repository bound to this scope.
    fn rules(&self) -> &dyn RuleRepository;

    /// Album repository bound to this scope.
    fn albums(&self) -> &dyn AlbumRepository;

    /// Publishes staged writes atomically.
    async fn commit(self: Box<Self>) -> Result<()>;

    /// Discards staged writes.
    async fn rollback(self: Box<Self>) -> Result<()>;
}

/// Entry point for opening catalog transactions.
#[async_trait]
pub trait CatalogUnitOfWorkFactory: Send + Sync {
    /// Opens a write transaction, waiting on the process-wide write lock.
    async fn begin(&self) -> Result<Box<dyn CatalogUnitOfWork>>;

    /// Opens a read-only snapshot without taking the write lock.
    async fn begin_read(&self) -> Result<Box<dyn CatalogUnitOfWork>>;
}
