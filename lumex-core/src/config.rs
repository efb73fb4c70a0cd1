//! Engine configuration knobs.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Top-level engine configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Filesystem watch and debounce tuning.
    pub watch: WatchConfig,
    /// Scan worker pool sizing.
    pub pool: PoolConfig,
    /// Retry policy for transient scan failures.
    pub retry: RetryConfig,
    /// Image extension filter applied to events and listings.
    pub extensions: ExtensionFilter,
}

/// Filesystem watch configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WatchConfig {
    /// Debounce window in milliseconds before buffered events flush.
    pub debounce_window_ms: u64,
    /// Maximum buffered events before an early flush.
    pub max_batch_events: usize,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            debounce_window_ms: 2_000,
            max_batch_events: 1_024,
        }
    }
}

impl WatchConfig {
    /// Debounce window as a [`Duration`].
    pub fn debounce_window(&self) -> Duration {
        Duration::from_millis(self.debounce_window_ms.max(1))
    }
}

/// Scan worker pool configuration.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Number of long-running scan workers.
    pub workers: usize,
    /// Capacity of the shared FIFO scan queue.
    pub queue_capacity: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            workers: 3,
            queue_capacity: 1_024,
        }
    }
}

/// Retry policy for transient per-item scan failures.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Attempts per item, including the first.
    pub max_attempts: u32,
    /// Base backoff in milliseconds, scaled linearly per attempt.
    pub backoff_base_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base_ms: 250,
        }
    }
}

impl RetryConfig {
    /// Backoff before the next attempt, given the attempt that just failed.
    pub fn backoff_for(&self, failed_attempt: u32) -> Duration {
        Duration::from_millis(self.backoff_base_ms.saturating_mul(u64::from(failed_attempt)))
    }
}

/// Case-insensitive file extension filter.
///
/// An empty extension list accepts every file.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExtensionFilter {
    /// Accepted extensions without the leading dot.
    pub extensions: Vec<String>,
}

impl Default for ExtensionFilter {
    fn default() -> Self {
        Self {
            extensions: ["jpg", "jpeg", "png", "gif", "bmp", "tiff", "webp", "heic"]
                .into_iter()
                .map(str::to_string)
                .collect(),
        }
    }
}

impl ExtensionFilter {
    /// Filter that accepts every file regardless of extension.
    pub fn accept_all() -> Self {
        Self {
            extensions: Vec::new(),
        }
    }

    /// Whether the path carries an accepted extension.
    pub fn matches(&self, path: &Path) -> bool {
        if self.extensions.is_empty() {
            return true;
        }
        let Some(ext) = path.extension().and_then(|ext| ext.to_str()) else {
            return false;
        };
        self.extensions.iter().any(|accepted| accepted.eq_ignore_ascii_case(ext))
    }
}
