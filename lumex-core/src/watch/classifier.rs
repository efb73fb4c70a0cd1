//! Pass/drop decisions for converted filesystem events.

use crate::config::ExtensionFilter;
use crate::rules::{normalize_path, ResolvedWatchSet};

use super::{WatchEvent, WatchEventKind};

/// Decides whether one event reaches the reconciler.
///
/// Directory events are dropped outright, determined by a live check
/// rather than the event payload. Renames bypass the rule and
/// extension checks; the reconciler settles both sides of a move.
pub(crate) fn should_pass(
    event: &WatchEvent,
    rules: &ResolvedWatchSet,
    filter: &ExtensionFilter,
) -> bool {
    if event.path.is_dir() {
        tracing::debug!(
            target: "watch::classify",
            path = %event.path.display(),
            "dropping directory event"
        );
        return false;
    }
    if event.kind == WatchEventKind::Renamed {
        return true;
    }
    let path_key = normalize_path(&event.path);
    if !rules.includes(&path_key) {
        tracing::debug!(
            target: "watch::classify",
            path = %path_key,
            "dropping path excluded by rules"
        );
        return false;
    }
    if !filter.matches(&event.path) {
        tracing::debug!(
            target: "watch::classify",
            path = %path_key,
            "dropping path with unaccepted extension"
        );
        return false;
    }
    true
}
