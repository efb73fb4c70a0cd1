//! Thumbnail generation boundary.

use std::path::Path;

use async_trait::async_trait;

use crate::error::Result;

/// Renders a thumbnail for one image file.
///
/// Failures are reported but never block cataloguing; the pipeline
/// logs and moves on.
#[async_trait]
pub trait ThumbnailGenerator: Send + Sync {
    /// Generates a thumbnail for the file at `path`.
    async fn generate(&self, path: &Path) -> Result<()>;
}

/// Generator that does nothing.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopThumbnailGenerator;

#[async_trait]
impl ThumbnailGenerator for NoopThumbnailGenerator {
    async fn generate(&self, _path: &Path) -> Result<()> {
        Ok(())
    }
}
