//! Error types shared across the engine.

use thiserror::Error;

/// Errors produced by the engine and its collaborators.
#[derive(Error, Debug)]
pub enum EngineError {
    /// IO failures bubbling up from listing or metadata calls.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The submitted rule set cannot be resolved into a watch set.
    #[error("Conflicting folder rules: {0}")]
    RuleConflict(String),

    /// Metadata extraction failed for one image.
    #[error("Metadata extraction failed: {0}")]
    Extraction(String),

    /// Thumbnail generation failed for one image.
    #[error("Thumbnail generation failed: {0}")]
    Thumbnail(String),

    /// The catalog store rejected a read or write.
    #[error("Persistence failure: {0}")]
    Persistence(String),

    /// A filesystem watcher could not be attached to a root.
    #[error("Failed to attach watcher for {root}: {reason}")]
    WatcherAttach { root: String, reason: String },

    /// The requested operation is not valid in the current engine state.
    #[error("Invalid engine state: {0}")]
    State(String),

    /// Invariant violations that indicate a bug rather than bad input.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl EngineError {
    /// Whether retrying the failed operation in place is worthwhile.
    ///
    /// Transient failures are contended or timing-dependent conditions
    /// that tend to clear on their own. Everything else is terminal for
    /// the item that hit it.
    pub fn is_transient(&self) -> bool {
        match self {
            EngineError::Io(err) => matches!(
                err.kind(),
                std::io::ErrorKind::Interrupted
                    | std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::WouldBlock
                    | std::io::ErrorKind::ResourceBusy
            ),
            EngineError::Extraction(msg)
            | EngineError::Thumbnail(msg)
            | EngineError::Persistence(msg) => {
                let msg = msg.to_ascii_lowercase();
                ["timeout", "timed out", "temporarily", "busy", "locked", "interrupted"]
                    .iter()
                    .any(|needle| msg.contains(needle))
            }
            _ => false,
        }
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, EngineError>;
