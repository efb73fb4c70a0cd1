use chrono::{DateTime, Utc};

use super::container::ContainerKey;
use super::exif::ExifData;
use super::ids::{AlbumId, FolderId, ImageId};

/// Lightweight queryable projection of one catalogued image.
///
/// An image is always owned by exactly one container at a time; the ref
/// carries enough container identity for a consumer to group and sort
/// without touching storage.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ImageRef {
    pub id: ImageId,
    pub path: String,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
    pub exif_date: Option<DateTime<Utc>>,
    pub container: ContainerKey,
    pub container_date: DateTime<Utc>,
}

impl ImageRef {
    /// Whether the on-disk timestamps match the catalogued ones. Used by
    /// reconciliation to decide if a listed file needs a re-scan.
    pub fn matches_times(
        &self,
        created_at: DateTime<Utc>,
        modified_at: DateTime<Utc>,
    ) -> bool {
        self.created_at == created_at && self.modified_at == modified_at
    }
}

/// Durable folder row as seen through the repository port.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FolderRecord {
    pub id: FolderId,
    pub path: String,
    pub name: String,
    pub date: DateTime<Utc>,
}

impl FolderRecord {
    /// New folder row for `path`, named after its final segment and dated
    /// from the first image's capture timestamp.
    pub fn new(path: impl Into<String>, date: DateTime<Utc>) -> Self {
        let path = path.into();
        let name = path
            .rsplit(['/', '\\'])
            .find(|segment| !segment.is_empty())
            .unwrap_or(path.as_str())
            .to_string();
        Self {
            id: FolderId::new(),
            path,
            name,
            date,
        }
    }
}

/// Durable image row as seen through the repository port.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ImageRecord {
    pub id: ImageId,
    pub folder_id: FolderId,
    pub path: String,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
    pub exif_date: Option<DateTime<Utc>>,
    pub exif: Option<ExifData>,
}

/// Durable album row; membership is a list of image ids resolved against
/// the image table when containers are loaded.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AlbumRecord {
    pub id: AlbumId,
    pub name: String,
    pub date: DateTime<Utc>,
    pub image_ids: Vec<ImageId>,
}

/// Outcome of applying (or previewing) a rule-set change.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ResetChanges {
    pub deleted_image_paths: Vec<String>,
    pub deleted_folder_ids: Vec<FolderId>,
}

impl ResetChanges {
    pub fn is_empty(&self) -> bool {
        self.deleted_image_paths.is_empty()
            && self.deleted_folder_ids.is_empty()
    }
}
