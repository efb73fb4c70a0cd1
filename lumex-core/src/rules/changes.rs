//! Deletion planning for rule-set changes.

use std::collections::{HashMap, HashSet};

use lumex_model::{FolderId, FolderRecord, ImageRecord, ResetChanges};

use super::ResolvedWatchSet;

/// Computes what a rule reset would delete, without mutating anything.
///
/// A folder survives when the resolved set still covers its path. An
/// image is deleted when its folder is deleted or its own path is no
/// longer covered. Output ordering is deterministic: folders by path,
/// image paths sorted.
pub fn plan_rule_changes(
    resolved: &ResolvedWatchSet,
    folders: &[FolderRecord],
    images: &[ImageRecord],
) -> ResetChanges {
    let mut doomed_folders: Vec<(&str, FolderId)> = folders
        .iter()
        .filter(|folder| !resolved.covers(&folder.path))
        .map(|folder| (folder.path.as_str(), folder.id))
        .collect();
    doomed_folders.sort_by(|a, b| a.0.cmp(b.0));

    let doomed_ids: HashSet<FolderId> = doomed_folders.iter().map(|(_, id)| *id).collect();
    let known_folders: HashMap<FolderId, &str> = folders
        .iter()
        .map(|folder| (folder.id, folder.path.as_str()))
        .collect();

    let mut deleted_image_paths: Vec<String> = images
        .iter()
        .filter(|image| {
            doomed_ids.contains(&image.folder_id)
                || !known_folders.contains_key(&image.folder_id)
                || !resolved.covers(&image.path)
        })
        .map(|image| image.path.clone())
        .collect();
    deleted_image_paths.sort();
    deleted_image_paths.dedup();

    ResetChanges {
        deleted_image_paths,
        deleted_folder_ids: doomed_folders.into_iter().map(|(_, id)| id).collect(),
    }
}
