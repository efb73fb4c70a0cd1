//! Extraction, transactional upsert, thumbnails, and publication.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;

use lumex_model::{ContainerKey, FolderRecord, ImageId, ImageRecord, ImageRef};

use crate::catalog::CatalogUnitOfWorkFactory;
use crate::error::{EngineError, Result};
use crate::events::{CatalogEvent, EngineEventBus};
use crate::extract::MetadataExtractor;
use crate::index::ContainerIndex;
use crate::rules::normalize_path;
use crate::thumbs::ThumbnailGenerator;

use super::pool::ScanItemHandler;

/// Applies catalog mutations for one image at a time.
///
/// Every write goes through a unit of work, so a failure rolls the
/// image's whole mutation back. The index and event bus are only
/// touched after a successful commit.
pub(crate) struct IngestPipeline {
    catalog: Arc<dyn CatalogUnitOfWorkFactory>,
    extractor: Arc<dyn MetadataExtractor>,
    thumbnails: Arc<dyn ThumbnailGenerator>,
    index: ContainerIndex,
    events: EngineEventBus,
}

impl IngestPipeline {
    pub(crate) fn new(
        catalog: Arc<dyn CatalogUnitOfWorkFactory>,
        extractor: Arc<dyn MetadataExtractor>,
        thumbnails: Arc<dyn ThumbnailGenerator>,
        index: ContainerIndex,
        events: EngineEventBus,
    ) -> Self {
        Self {
            catalog,
            extractor,
            thumbnails,
            index,
            events,
        }
    }

    /// Catalogues one file: extract, persist, thumbnail, publish.
    ///
    /// The owning folder is found or created inside the same
    /// transaction, dated from the image's capture timestamp.
    pub(crate) async fn ingest(&self, path: &Path) -> Result<()> {
        let path_key = normalize_path(path);
        let metadata = self.extractor.extract(path).await?;
        let parent_key = path.parent().map(normalize_path).ok_or_else(|| {
            EngineError::Internal(format!("scan path has no parent: {}", path.display()))
        })?;

        let uow = self.catalog.begin().await?;
        let folder = match uow.folders().find_by_path(&parent_key).await? {
            Some(folder) => folder,
            None => {
                let folder = FolderRecord::new(parent_key.clone(), metadata.capture_date());
                uow.folders().insert(&folder).await?;
                folder
            }
        };
        let record = match uow.images().find_by_path(&path_key).await? {
            Some(mut existing) => {
                existing.folder_id = folder.id;
                existing.created_at = metadata.created_at;
                existing.modified_at = metadata.modified_at;
                existing.exif_date = metadata.exif_date();
                existing.exif = metadata.exif.clone();
                existing
            }
            None => ImageRecord {
                id: ImageId::new(),
                folder_id: folder.id,
                path: path_key.clone(),
                created_at: metadata.created_at,
                modified_at: metadata.modified_at,
                exif_date: metadata.exif_date(),
                exif: metadata.exif.clone(),
            },
        };
        uow.images().upsert(&record).await?;
        uow.commit().await?;

        if let Err(err) = self.thumbnails.generate(path).await {
            tracing::warn!(
                target: "scan::ingest",
                path = %path.display(),
                error = %err,
                "thumbnail generation failed"
            );
        }

        let image = ImageRef {
            id: record.id,
            path: path_key,
            created_at: record.created_at,
            modified_at: record.modified_at,
            exif_date: record.exif_date,
            container: ContainerKey::Folder(folder.id),
            container_date: folder.date,
        };
        tracing::debug!(
            target: "scan::ingest",
            path = %image.path,
            folder = %folder.path,
            "image catalogued"
        );
        self.index.apply_image(&folder, image.clone()).await;
        self.events.publish(CatalogEvent::ImageUpserted { image });
        Ok(())
    }

    /// Applies a definitive deletion: row, index entry, event.
    pub(crate) async fn remove_image(&self, image: &ImageRef) -> Result<()> {
        let uow = self.catalog.begin().await?;
        uow.images().remove_by_path(&image.path).await?;
        uow.commit().await?;

        self.index.remove_image(&image.path).await;
        self.events.publish(CatalogEvent::ImageRemoved {
            id: image.id,
            path: image.path.clone(),
        });
        Ok(())
    }

    /// Applies a definitive rename, re-homing the image when its parent
    /// directory changed. Identity is preserved.
    pub(crate) async fn rename_image(&self, image: &ImageRef, to: &Path) -> Result<()> {
        let to_key = normalize_path(to);
        let parent_key = to.parent().map(normalize_path).ok_or_else(|| {
            EngineError::Internal(format!("rename target has no parent: {}", to.display()))
        })?;

        let uow = self.catalog.begin().await?;
        let folder = match uow.folders().find_by_path(&parent_key).await? {
            Some(folder) => folder,
            None => {
                let date = image.exif_date.unwrap_or(image.created_at);
                let folder = FolderRecord::new(parent_key.clone(), date);
                uow.folders().insert(&folder).await?;
                folder
            }
        };
        uow.images().set_path(image.id, &to_key, folder.id).await?;
        uow.commit().await?;

        let renamed = ImageRef {
            path: to_key.clone(),
            container: ContainerKey::Folder(folder.id),
            container_date: folder.date,
            ..image.clone()
        };
        self.index.rename_image(&image.path, &folder, renamed).await;
        self.events.publish(CatalogEvent::ImageRenamed {
            id: image.id,
            from: image.path.clone(),
            to: to_key,
        });
        Ok(())
    }
}

#[async_trait]
impl ScanItemHandler for IngestPipeline {
    async fn handle(&self, path: &Path) -> Result<()> {
        self.ingest(path).await
    }
}
