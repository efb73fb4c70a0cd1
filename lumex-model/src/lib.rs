//! Core data model definitions shared across Lumex crates.
#![allow(missing_docs)]

pub mod container;
pub mod exif;
pub mod ids;
pub mod image;
pub mod rule;

// Intentionally curated re-exports for downstream consumers.
pub use container::{
    AlbumContainer, ContainerKey, ContainerKind, FolderContainer,
    ImageContainer,
};
pub use exif::{ExifData, ExtractedMetadata};
pub use ids::{AlbumId, FolderId, ImageId};
pub use image::{
    AlbumRecord, FolderRecord, ImageRecord, ImageRef, ResetChanges,
};
pub use rule::{FolderRule, RuleAction};
