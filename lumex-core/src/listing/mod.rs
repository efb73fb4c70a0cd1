//! Directory listing and listing fingerprints.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

use crate::config::ExtensionFilter;
use crate::error::Result;

/// One image file seen in a directory listing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ListedImage {
    /// Absolute path of the file.
    pub path: PathBuf,
    /// Filesystem creation time, falling back to the modified time.
    pub created_at: DateTime<Utc>,
    /// Filesystem modified time.
    pub modified_at: DateTime<Utc>,
    /// File size in bytes.
    pub size: u64,
}

impl ListedImage {
    fn hash_input(&self) -> String {
        let name = self
            .path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        format!("{}:{}:{}", name, self.size, self.modified_at.timestamp_millis())
    }
}

/// Stable digest of a directory listing.
///
/// Entries are sorted before hashing so arrival order does not matter.
/// Two identical listings always fingerprint the same, letting the
/// reconciler skip rescans of unchanged directories.
pub fn listing_fingerprint(entries: &[ListedImage]) -> String {
    let mut inputs: Vec<String> = entries.iter().map(ListedImage::hash_input).collect();
    inputs.sort();

    let mut hasher = Sha256::new();
    for input in &inputs {
        hasher.update(input.as_bytes());
        hasher.update(b"\n");
    }
    format!("{:x}", hasher.finalize())
}

/// Read access to image files on disk.
#[async_trait]
pub trait DirectoryLister: Send + Sync {
    /// Recursive listing of every accepted image under `path`.
    async fn list_images(&self, path: &Path) -> Result<Vec<ListedImage>>;

    /// Single-level listing of accepted images directly in `path`.
    async fn list_dir(&self, path: &Path) -> Result<Vec<ListedImage>>;
}

/// Lister backed by the real filesystem.
#[derive(Debug, Clone)]
pub struct FsLister {
    filter: ExtensionFilter,
}

impl FsLister {
    /// Creates a lister applying `filter` to every entry.
    pub fn new(filter: ExtensionFilter) -> Self {
        Self { filter }
    }

    async fn read_level(
        &self,
        dir: &Path,
        files: &mut Vec<ListedImage>,
        subdirs: Option<&mut Vec<PathBuf>>,
    ) -> Result<()> {
        let mut entries = tokio::fs::read_dir(dir).await?;
        let mut found_dirs: Vec<PathBuf> = Vec::new();
        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(err) => {
                    tracing::warn!(
                        target: "listing",
                        dir = %dir.display(),
                        error = %err,
                        "skipping unreadable directory entry"
                    );
                    continue;
                }
            };
            let path = entry.path();
            let metadata = match entry.metadata().await {
                Ok(metadata) => metadata,
                Err(err) => {
                    tracing::warn!(
                        target: "listing",
                        path = %path.display(),
                        error = %err,
                        "skipping entry without metadata"
                    );
                    continue;
                }
            };
            if metadata.is_dir() {
                found_dirs.push(path);
                continue;
            }
            if !self.filter.matches(&path) {
                continue;
            }
            let modified_at = metadata
                .modified()
                .map(DateTime::<Utc>::from)
                .unwrap_or_else(|_| Utc::now());
            let created_at = metadata
                .created()
                .map(DateTime::<Utc>::from)
                .unwrap_or(modified_at);
            files.push(ListedImage {
                path,
                created_at,
                modified_at,
                size: metadata.len(),
            });
        }
        if let Some(subdirs) = subdirs {
            subdirs.extend(found_dirs);
        }
        Ok(())
    }
}

#[async_trait]
impl DirectoryLister for FsLister {
    async fn list_images(&self, path: &Path) -> Result<Vec<ListedImage>> {
        let mut files = Vec::new();
        let mut stack = vec![path.to_path_buf()];
        while let Some(dir) = stack.pop() {
            if let Err(err) = self.read_level(&dir, &mut files, Some(&mut stack)).await {
                if dir == path {
                    return Err(err);
                }
                tracing::warn!(
                    target: "listing",
                    dir = %dir.display(),
                    error = %err,
                    "skipping unreadable subdirectory"
                );
            }
        }
        Ok(files)
    }

    async fn list_dir(&self, path: &Path) -> Result<Vec<ListedImage>> {
        let mut files = Vec::new();
        self.read_level(path, &mut files, None).await?;
        Ok(files)
    }
}
