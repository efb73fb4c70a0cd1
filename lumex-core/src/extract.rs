//! Metadata extraction boundary.

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use lumex_model::ExtractedMetadata;

use crate::error::{EngineError, Result};

/// Produces metadata for one image file.
#[async_trait]
pub trait MetadataExtractor: Send + Sync {
    /// Extracts metadata for the file at `path`.
    async fn extract(&self, path: &Path) -> Result<ExtractedMetadata>;
}

/// Extractor reading filesystem timestamps only.
///
/// EXIF parsing is left to richer implementations; this one keeps the
/// pipeline honest when no decoder is wired up.
#[derive(Clone, Copy, Debug, Default)]
pub struct FsMetadataExtractor;

#[async_trait]
impl MetadataExtractor for FsMetadataExtractor {
    async fn extract(&self, path: &Path) -> Result<ExtractedMetadata> {
        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|err| EngineError::Extraction(format!("{}: {err}", path.display())))?;
        if metadata.is_dir() {
            return Err(EngineError::Extraction(format!(
                "{}: is a directory",
                path.display()
            )));
        }
        let modified_at = metadata
            .modified()
            .map(DateTime::<Utc>::from)
            .unwrap_or_else(|_| Utc::now());
        let created_at = metadata
            .created()
            .map(DateTime::<Utc>::from)
            .unwrap_or(modified_at);
        Ok(ExtractedMetadata {
            created_at,
            modified_at,
            exif: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn extracts_filesystem_timestamps() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.jpg");
        tokio::fs::write(&file, b"bytes").await.unwrap();

        let extracted = FsMetadataExtractor.extract(&file).await.unwrap();
        assert!(extracted.exif.is_none());
        assert!(extracted.modified_at <= Utc::now());
    }

    #[tokio::test]
    async fn missing_file_is_an_extraction_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = FsMetadataExtractor
            .extract(&dir.path().join("absent.jpg"))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Extraction(_)));
    }

    #[tokio::test]
    async fn directories_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let err = FsMetadataExtractor.extract(dir.path()).await.unwrap_err();
        assert!(matches!(err, EngineError::Extraction(_)));
    }
}
