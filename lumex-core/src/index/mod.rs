//! Reactive in-memory container index.
//!
//! Holds the canonical key-to-container map plus a derived path-to-ref
//! map used for change reconciliation. Every mutation rebuilds the
//! derived map under the same write lock, so readers never observe the
//! two maps out of sync.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use lumex_model::{
    ContainerKey, ContainerKind, FolderContainer, FolderRecord, ImageContainer, ImageRef,
};

#[derive(Default)]
struct IndexState {
    containers: HashMap<ContainerKey, ImageContainer>,
    by_path: HashMap<String, ImageRef>,
}

impl IndexState {
    /// Rebuilds the path map from the container map.
    ///
    /// Album refs are inserted first so a folder ref for the same path
    /// wins; the scan pipeline is authoritative for filesystem paths.
    fn rebuild_derived(&mut self) {
        self.by_path.clear();
        for kind in [ContainerKind::Album, ContainerKind::Folder] {
            for container in self.containers.values() {
                if container.kind() != kind {
                    continue;
                }
                for image in container.image_refs() {
                    self.by_path.insert(image.path.clone(), image.clone());
                }
            }
        }
    }

    fn apply_image(&mut self, folder: &FolderRecord, image: ImageRef) {
        let container = self
            .containers
            .entry(ContainerKey::Folder(folder.id))
            .or_insert_with(|| {
                ImageContainer::Folder(FolderContainer {
                    id: folder.id,
                    path: folder.path.clone(),
                    name: folder.name.clone(),
                    date: folder.date,
                    images: Vec::new(),
                })
            });
        container.upsert_image(image);
    }

    fn remove_image(&mut self, path: &str) -> Option<ImageRef> {
        let key = self.by_path.get(path)?.container;
        let container = self.containers.get_mut(&key)?;
        container.remove_image_by_path(path)
    }
}

/// Shared handle to the container index.
#[derive(Clone)]
pub struct ContainerIndex {
    inner: Arc<RwLock<IndexState>>,
}

impl Default for ContainerIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl ContainerIndex {
    /// Creates an empty index.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(IndexState::default())),
        }
    }

    /// Replaces the whole container map, as done on engine start.
    pub async fn replace_all(&self, containers: Vec<ImageContainer>) {
        let mut state = self.inner.write().await;
        state.containers = containers
            .into_iter()
            .map(|container| (container.key(), container))
            .collect();
        state.rebuild_derived();
    }

    /// Inserts or replaces one container by key. Last write wins.
    pub async fn upsert(&self, container: ImageContainer) {
        let mut state = self.inner.write().await;
        state.containers.insert(container.key(), container);
        state.rebuild_derived();
    }

    /// Removes one container by key, returning it if present.
    pub async fn remove(&self, key: &ContainerKey) -> Option<ImageContainer> {
        let mut state = self.inner.write().await;
        let removed = state.containers.remove(key);
        if removed.is_some() {
            state.rebuild_derived();
        }
        removed
    }

    /// Upserts one image ref into its folder container, creating the
    /// container from `folder` when absent.
    pub async fn apply_image(&self, folder: &FolderRecord, image: ImageRef) {
        let mut state = self.inner.write().await;
        state.apply_image(folder, image);
        state.rebuild_derived();
    }

    /// Removes the ref for `path` from whichever container owns it.
    pub async fn remove_image(&self, path: &str) -> Option<ImageRef> {
        let mut state = self.inner.write().await;
        let removed = state.remove_image(path);
        if removed.is_some() {
            state.rebuild_derived();
        }
        removed
    }

    /// Moves one ref from `old_path` to its new identity in a single
    /// atomic step, re-homing it when the target folder differs.
    pub async fn rename_image(
        &self,
        old_path: &str,
        folder: &FolderRecord,
        image: ImageRef,
    ) -> Option<ImageRef> {
        let mut state = self.inner.write().await;
        let removed = state.remove_image(old_path);
        state.apply_image(folder, image);
        state.rebuild_derived();
        removed
    }

    /// Snapshot of every container, ordered by date descending then name.
    pub async fn containers(&self) -> Vec<ImageContainer> {
        let state = self.inner.read().await;
        let mut all: Vec<ImageContainer> = state.containers.values().cloned().collect();
        all.sort_by(|a, b| b.date().cmp(&a.date()).then_with(|| a.name().cmp(b.name())));
        all
    }

    /// Snapshot of one container by key.
    pub async fn container(&self, key: &ContainerKey) -> Option<ImageContainer> {
        self.inner.read().await.containers.get(key).cloned()
    }

    /// The indexed ref for a normalized path, if any.
    pub async fn image_ref(&self, path: &str) -> Option<ImageRef> {
        self.inner.read().await.by_path.get(path).cloned()
    }

    /// Whether a normalized path is already indexed.
    pub async fn contains_path(&self, path: &str) -> bool {
        self.inner.read().await.by_path.contains_key(path)
    }

    /// Refs whose file sits directly in `dir`.
    pub async fn image_refs_in_dir(&self, dir: &str) -> Vec<ImageRef> {
        let state = self.inner.read().await;
        let dir = std::path::Path::new(dir);
        state
            .by_path
            .values()
            .filter(|image| {
                std::path::Path::new(image.path.as_str())
                    .parent()
                    .is_some_and(|parent| parent == dir)
            })
            .cloned()
            .collect()
    }

    /// Refs anywhere under `dir`, on segment boundaries.
    pub async fn image_refs_under(&self, dir: &str) -> Vec<ImageRef> {
        let state = self.inner.read().await;
        state
            .by_path
            .values()
            .filter(|image| crate::rules::is_segment_prefix(dir, &image.path))
            .cloned()
            .collect()
    }

    /// Number of containers currently indexed.
    pub async fn container_count(&self) -> usize {
        self.inner.read().await.containers.len()
    }

    /// Number of distinct image paths currently indexed.
    pub async fn image_count(&self) -> usize {
        self.inner.read().await.by_path.len()
    }
}

impl std::fmt::Debug for ContainerIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.inner.try_read() {
            Ok(state) => f
                .debug_struct("ContainerIndex")
                .field("containers", &state.containers.len())
                .field("paths", &state.by_path.len())
                .finish(),
            Err(_) => f.debug_struct("ContainerIndex").finish_non_exhaustive(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use lumex_model::ImageId;

    fn folder(path: &str) -> FolderRecord {
        FolderRecord::new(path, Utc::now())
    }

    fn image_in(folder: &FolderRecord, path: &str) -> ImageRef {
        let now = Utc::now();
        ImageRef {
            id: ImageId::new(),
            path: path.to_string(),
            created_at: now,
            modified_at: now,
            exif_date: None,
            container: ContainerKey::Folder(folder.id),
            container_date: folder.date,
        }
    }

    #[tokio::test]
    async fn apply_image_creates_the_folder_container_on_demand() {
        let index = ContainerIndex::new();
        let photos = folder("/photos/2024");
        let image = image_in(&photos, "/photos/2024/a.jpg");

        index.apply_image(&photos, image.clone()).await;

        assert_eq!(index.container_count().await, 1);
        assert_eq!(index.image_ref("/photos/2024/a.jpg").await, Some(image));
    }

    #[tokio::test]
    async fn derived_map_follows_every_mutation() {
        let index = ContainerIndex::new();
        let photos = folder("/photos");
        index.apply_image(&photos, image_in(&photos, "/photos/a.jpg")).await;
        index.apply_image(&photos, image_in(&photos, "/photos/b.jpg")).await;
        assert_eq!(index.image_count().await, 2);

        let removed = index.remove_image("/photos/a.jpg").await;
        assert!(removed.is_some());
        assert_eq!(index.image_count().await, 1);
        assert!(!index.contains_path("/photos/a.jpg").await);

        index.remove(&ContainerKey::Folder(photos.id)).await;
        assert_eq!(index.image_count().await, 0);
    }

    #[tokio::test]
    async fn rename_moves_a_ref_between_folders_atomically() {
        let index = ContainerIndex::new();
        let from = folder("/photos/inbox");
        let to = folder("/photos/sorted");
        let original = image_in(&from, "/photos/inbox/a.jpg");
        index.apply_image(&from, original.clone()).await;

        let mut renamed = original.clone();
        renamed.path = "/photos/sorted/a.jpg".to_string();
        renamed.container = ContainerKey::Folder(to.id);
        renamed.container_date = to.date;
        let removed = index.rename_image("/photos/inbox/a.jpg", &to, renamed.clone()).await;

        assert_eq!(removed, Some(original));
        assert!(!index.contains_path("/photos/inbox/a.jpg").await);
        let moved = index.image_ref("/photos/sorted/a.jpg").await.unwrap();
        assert_eq!(moved.id, renamed.id);
        assert_eq!(index.container_count().await, 2);
    }

    #[tokio::test]
    async fn remove_of_unindexed_path_is_a_noop() {
        let index = ContainerIndex::new();
        assert!(index.remove_image("/nowhere/a.jpg").await.is_none());
    }

    #[tokio::test]
    async fn replace_all_rebuilds_the_derived_map() {
        let index = ContainerIndex::new();
        let photos = folder("/photos");
        let container = ImageContainer::Folder(FolderContainer {
            id: photos.id,
            path: photos.path.clone(),
            name: photos.name.clone(),
            date: photos.date,
            images: vec![image_in(&photos, "/photos/a.jpg")],
        });

        index.replace_all(vec![container]).await;

        assert_eq!(index.container_count().await, 1);
        assert!(index.contains_path("/photos/a.jpg").await);
    }
}
