use std::fmt;

/// Declares how a folder subtree participates in the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "PascalCase"))]
pub enum RuleAction {
    /// Continuously watch the subtree and include its images.
    Always,
    /// Include the subtree for a single scan pass; no watcher is attached.
    Once,
    /// Exclude the subtree and all descendants unless a deeper rule
    /// overrides it.
    Remove,
}

impl RuleAction {
    /// Whether a path governed by this action belongs in the catalog.
    pub fn includes(&self) -> bool {
        matches!(self, RuleAction::Always | RuleAction::Once)
    }
}

impl fmt::Display for RuleAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleAction::Always => write!(f, "Always"),
            RuleAction::Once => write!(f, "Once"),
            RuleAction::Remove => write!(f, "Remove"),
        }
    }
}

/// A user-declared inclusion/exclusion rule for one folder subtree.
///
/// `path` is stored normalized (lossy UTF-8, no trailing separator); the
/// rule set invariant is at most one rule per normalized path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FolderRule {
    pub path: String,
    pub action: RuleAction,
}

impl FolderRule {
    pub fn new(path: impl Into<String>, action: RuleAction) -> Self {
        Self {
            path: path.into(),
            action,
        }
    }
}

impl fmt::Display for FolderRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.path, self.action)
    }
}
