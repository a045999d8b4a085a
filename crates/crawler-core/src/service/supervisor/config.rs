use std::path::PathBuf;
use std::time::Duration;

/// Supervisor configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SupervisorConfig {
    /// First retry delay after a failed flush
    pub flush_backoff_baseline: Duration,
    /// Upper bound for the flush retry delay
    pub flush_backoff_max: Duration,
    /// Stored rows not crawled within this window are pruned
    pub drop_after: Duration,
    /// Pause before retrying when discovery cannot be opened
    pub discovery_retry_delay: Duration,
    /// Node file rewritten after every round
    pub node_file: Option<PathBuf>,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            flush_backoff_baseline: Duration::from_secs(60),
            flush_backoff_max: Duration::from_secs(3600),
            drop_after: Duration::from_secs(24 * 3600),
            discovery_retry_delay: Duration::from_secs(30),
            node_file: None,
        }
    }
}

impl SupervisorConfig {
    /// Create config for testing without a node file.
    #[cfg(any(test, feature = "test-utils"))]
    pub fn for_testing() -> Self {
        Self {
            discovery_retry_delay: Duration::from_millis(100),
            ..Self::default()
        }
    }
}
