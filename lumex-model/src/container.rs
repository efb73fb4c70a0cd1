use std::fmt;

use chrono::{DateTime, Utc};

use super::ids::{AlbumId, FolderId};
use super::image::ImageRef;

/// The kind of grouping a container represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "PascalCase"))]
pub enum ContainerKind {
    Folder,
    Album,
}

impl fmt::Display for ContainerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContainerKind::Folder => write!(f, "Folder"),
            ContainerKind::Album => write!(f, "Album"),
        }
    }
}

/// Unique container identity across both variants.
///
/// The container cache holds at most one entry per key, so the key has to
/// disambiguate folders from albums even if their underlying UUIDs were to
/// collide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ContainerKey {
    Folder(FolderId),
    Album(AlbumId),
}

impl ContainerKey {
    pub fn kind(&self) -> ContainerKind {
        match self {
            ContainerKey::Folder(_) => ContainerKind::Folder,
            ContainerKey::Album(_) => ContainerKind::Album,
        }
    }

    pub fn as_folder(&self) -> Option<FolderId> {
        match self {
            ContainerKey::Folder(id) => Some(*id),
            ContainerKey::Album(_) => None,
        }
    }

    pub fn as_album(&self) -> Option<AlbumId> {
        match self {
            ContainerKey::Album(id) => Some(*id),
            ContainerKey::Folder(_) => None,
        }
    }
}

impl fmt::Display for ContainerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContainerKey::Folder(id) => write!(f, "folder:{id}"),
            ContainerKey::Album(id) => write!(f, "album:{id}"),
        }
    }
}

/// One directory of catalogued images.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FolderContainer {
    pub id: FolderId,
    pub path: String,
    pub name: String,
    pub date: DateTime<Utc>,
    pub images: Vec<ImageRef>,
}

/// A user-curated album of catalogued images.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AlbumContainer {
    pub id: AlbumId,
    pub name: String,
    pub date: DateTime<Utc>,
    pub images: Vec<ImageRef>,
}

/// A named grouping of images exposed to consumers as one addressable unit.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ImageContainer {
    Folder(FolderContainer),
    Album(AlbumContainer),
}

impl ImageContainer {
    pub fn key(&self) -> ContainerKey {
        match self {
            ImageContainer::Folder(folder) => ContainerKey::Folder(folder.id),
            ImageContainer::Album(album) => ContainerKey::Album(album.id),
        }
    }

    pub fn kind(&self) -> ContainerKind {
        self.key().kind()
    }

    pub fn name(&self) -> &str {
        match self {
            ImageContainer::Folder(folder) => &folder.name,
            ImageContainer::Album(album) => &album.name,
        }
    }

    pub fn date(&self) -> DateTime<Utc> {
        match self {
            ImageContainer::Folder(folder) => folder.date,
            ImageContainer::Album(album) => album.date,
        }
    }

    pub fn image_refs(&self) -> &[ImageRef] {
        match self {
            ImageContainer::Folder(folder) => &folder.images,
            ImageContainer::Album(album) => &album.images,
        }
    }

    /// Insert or replace one ref by image id, preserving insertion order
    /// for new entries.
    pub fn upsert_image(&mut self, image: ImageRef) {
        let images = self.images_mut();
        match images.iter_mut().find(|existing| existing.id == image.id) {
            Some(existing) => *existing = image,
            None => images.push(image),
        }
    }

    /// Remove the ref for `path`, returning it if it was present.
    pub fn remove_image_by_path(&mut self, path: &str) -> Option<ImageRef> {
        let images = self.images_mut();
        let position =
            images.iter().position(|existing| existing.path == path)?;
        Some(images.remove(position))
    }

    fn images_mut(&mut self) -> &mut Vec<ImageRef> {
        match self {
            ImageContainer::Folder(folder) => &mut folder.images,
            ImageContainer::Album(album) => &mut album.images,
        }
    }
}
