//! Turns a flat rule list into the minimal set of watched roots.

use std::collections::HashMap;

use lumex_model::{FolderRule, RuleAction};

use crate::error::{EngineError, Result};

use super::{is_segment_prefix, normalize_str};

/// One resolved root and every rule that applies beneath it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WatchRoot {
    /// Normalized root path.
    pub path: String,
    /// Action of the root's own rule.
    pub action: RuleAction,
    /// The root's own rule plus every nested override, normalized.
    pub rules: Vec<FolderRule>,
}

impl WatchRoot {
    fn new(rule: FolderRule) -> Self {
        Self {
            path: rule.path.clone(),
            action: rule.action,
            rules: vec![rule],
        }
    }

    /// Whether this root receives its own filesystem watcher.
    ///
    /// A root is watched when any rule beneath it asks for continuous
    /// inclusion. A pure `Once` or `Remove` subtree has nothing to
    /// observe and gets no watcher.
    pub fn is_watched(&self) -> bool {
        self.rules.iter().any(|rule| rule.action == RuleAction::Always)
    }

    /// Whether `path` falls under this root on a segment boundary.
    pub fn contains(&self, path: &str) -> bool {
        is_segment_prefix(&self.path, path)
    }

    /// Longest-prefix classification of one path within this root.
    ///
    /// The most specific matching rule wins. A path no rule matches
    /// defaults to include, since the root itself admitted it.
    pub fn includes(&self, path: &str) -> bool {
        match longest_match(&self.rules, path) {
            Some(rule) => rule.action == RuleAction::Always,
            None => true,
        }
    }
}

/// Derived, non-persisted view of the active rule set.
///
/// Invariant: no root is a descendant of another root, so every rule
/// belongs to exactly one root.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ResolvedWatchSet {
    /// Resolved roots in case-insensitive path order.
    pub roots: Vec<WatchRoot>,
}

impl ResolvedWatchSet {
    /// Whether the set resolves to no roots at all.
    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    /// Roots that receive their own filesystem watcher.
    pub fn watched_roots(&self) -> impl Iterator<Item = &WatchRoot> {
        self.roots.iter().filter(|root| root.is_watched())
    }

    /// The root containing `path`, if any.
    pub fn root_for(&self, path: &str) -> Option<&WatchRoot> {
        self.roots.iter().find(|root| root.contains(path))
    }

    /// Event-time inclusion: longest matching rule decides, `Always`
    /// includes, `Once` and `Remove` exclude, outside all roots excludes.
    pub fn includes(&self, path: &str) -> bool {
        self.root_for(path).is_some_and(|root| root.includes(path))
    }

    /// Coverage for deletion planning: a path survives a rule reset when
    /// its longest matching rule is `Always` or `Once`.
    pub fn covers(&self, path: &str) -> bool {
        let Some(root) = self.root_for(path) else {
            return false;
        };
        match longest_match(&root.rules, path) {
            Some(rule) => rule.action.includes(),
            None => root.action.includes(),
        }
    }

    /// All rules across all roots, in resolution order.
    pub fn rules(&self) -> impl Iterator<Item = &FolderRule> {
        self.roots.iter().flat_map(|root| root.rules.iter())
    }
}

fn longest_match<'a>(rules: &'a [FolderRule], path: &str) -> Option<&'a FolderRule> {
    rules
        .iter()
        .filter(|rule| is_segment_prefix(&rule.path, path))
        .max_by_key(|rule| rule.path.len())
}

/// Resolves an unordered rule list into the minimal watched-root set.
///
/// Paths are normalized first, then sorted case-insensitively so
/// ancestors precede descendants. The first rule not nested under any
/// accepted root starts a new root; nested rules become overrides of
/// the root that contains them. Duplicate paths with the same action
/// collapse; duplicate paths with differing actions are a conflict.
pub fn resolve_watch_set(rules: &[FolderRule]) -> Result<ResolvedWatchSet> {
    let mut seen: HashMap<String, RuleAction> = HashMap::new();
    let mut normalized: Vec<FolderRule> = Vec::with_capacity(rules.len());
    for rule in rules {
        let path = normalize_str(&rule.path);
        match seen.get(&path) {
            Some(action) if *action != rule.action => {
                return Err(EngineError::RuleConflict(format!(
                    "{path} declared both {action} and {}",
                    rule.action
                )));
            }
            Some(_) => {}
            None => {
                seen.insert(path.clone(), rule.action);
                normalized.push(FolderRule::new(path, rule.action));
            }
        }
    }

    normalized.sort_by(|a, b| a.path.to_lowercase().cmp(&b.path.to_lowercase()));

    let mut roots: Vec<WatchRoot> = Vec::new();
    for rule in normalized {
        match roots.iter_mut().find(|root| root.contains(&rule.path)) {
            Some(root) => root.rules.push(rule),
            None => roots.push(WatchRoot::new(rule)),
        }
    }
    tracing::debug!(
        target: "rules",
        roots = roots.len(),
        watched = roots.iter().filter(|root| root.is_watched()).count(),
        "rule set resolved"
    );

    Ok(ResolvedWatchSet { roots })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(path: &str, action: RuleAction) -> FolderRule {
        FolderRule::new(path, action)
    }

    #[test]
    fn nested_rules_fold_into_their_root() {
        let resolved = resolve_watch_set(&[
            rule("/photos/vacation", RuleAction::Remove),
            rule("/photos", RuleAction::Always),
            rule("/archive", RuleAction::Always),
        ])
        .unwrap();

        assert_eq!(resolved.roots.len(), 2);
        let photos = resolved.root_for("/photos/cat.jpg").unwrap();
        assert_eq!(photos.path, "/photos");
        assert_eq!(photos.rules.len(), 2);
        assert_eq!(resolved.root_for("/archive/a.jpg").unwrap().path, "/archive");
    }

    #[test]
    fn no_root_is_a_descendant_of_another() {
        let resolved = resolve_watch_set(&[
            rule("/a/b/c", RuleAction::Always),
            rule("/a", RuleAction::Always),
            rule("/a/b", RuleAction::Remove),
        ])
        .unwrap();

        assert_eq!(resolved.roots.len(), 1);
        assert_eq!(resolved.roots[0].path, "/a");
        assert_eq!(resolved.roots[0].rules.len(), 3);
    }

    #[test]
    fn sibling_with_shared_string_prefix_becomes_its_own_root() {
        // "/a-c" sorts between "/a" and "/a/b" yet belongs to neither.
        let resolved = resolve_watch_set(&[
            rule("/a", RuleAction::Always),
            rule("/a-c", RuleAction::Always),
            rule("/a/b", RuleAction::Remove),
        ])
        .unwrap();

        let paths: Vec<&str> = resolved.roots.iter().map(|r| r.path.as_str()).collect();
        assert_eq!(paths, vec!["/a", "/a-c"]);
        assert_eq!(resolved.roots[0].rules.len(), 2);
    }

    #[test]
    fn longest_prefix_wins_classification() {
        let resolved = resolve_watch_set(&[
            rule("/root", RuleAction::Always),
            rule("/root/skip", RuleAction::Remove),
            rule("/root/skip/keep", RuleAction::Always),
        ])
        .unwrap();

        assert!(resolved.includes("/root/a.jpg"));
        assert!(!resolved.includes("/root/skip/b.jpg"));
        assert!(resolved.includes("/root/skip/keep/c.jpg"));
        assert!(!resolved.includes("/elsewhere/d.jpg"));
    }

    #[test]
    fn once_rules_are_excluded_from_event_inclusion_but_covered() {
        let resolved = resolve_watch_set(&[
            rule("/photos", RuleAction::Always),
            rule("/photos/import", RuleAction::Once),
        ])
        .unwrap();

        assert!(!resolved.includes("/photos/import/a.jpg"));
        assert!(resolved.covers("/photos/import/a.jpg"));
        assert!(resolved.covers("/photos/b.jpg"));
    }

    #[test]
    fn pure_once_root_is_not_watched() {
        let resolved = resolve_watch_set(&[
            rule("/import", RuleAction::Once),
            rule("/photos", RuleAction::Always),
        ])
        .unwrap();

        let watched: Vec<&str> = resolved.watched_roots().map(|r| r.path.as_str()).collect();
        assert_eq!(watched, vec!["/photos"]);
    }

    #[test]
    fn always_override_keeps_a_remove_root_watched() {
        let resolved = resolve_watch_set(&[
            rule("/bulk", RuleAction::Remove),
            rule("/bulk/picked", RuleAction::Always),
        ])
        .unwrap();

        assert_eq!(resolved.roots.len(), 1);
        assert!(resolved.roots[0].is_watched());
        assert!(!resolved.includes("/bulk/raw.jpg"));
        assert!(resolved.includes("/bulk/picked/raw.jpg"));
    }

    #[test]
    fn duplicate_paths_with_differing_actions_conflict() {
        let err = resolve_watch_set(&[
            rule("/photos", RuleAction::Always),
            rule("/photos/", RuleAction::Remove),
        ])
        .unwrap_err();

        assert!(matches!(err, EngineError::RuleConflict(_)));
    }

    #[test]
    fn duplicate_paths_with_same_action_collapse() {
        let resolved = resolve_watch_set(&[
            rule("/photos", RuleAction::Always),
            rule("/photos/", RuleAction::Always),
        ])
        .unwrap();

        assert_eq!(resolved.roots.len(), 1);
        assert_eq!(resolved.roots[0].rules.len(), 1);
    }

    #[test]
    fn empty_rule_list_resolves_to_empty_set() {
        let resolved = resolve_watch_set(&[]).unwrap();
        assert!(resolved.is_empty());
        assert!(!resolved.includes("/anything.jpg"));
    }
}
