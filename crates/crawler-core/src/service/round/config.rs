//! Round configuration.

use std::time::Duration;

use crate::domain::RegistryConfig;

/// Round engine configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundConfig {
    /// Number of handshake workers
    pub workers: usize,
    /// Round deadline once the input set is revalidated (zero disables it)
    pub timeout: Duration,
    /// Capacity of the handshake refresh queue
    pub refresh_queue_capacity: usize,
    /// Capacity of the candidate intake queue
    pub intake_queue_capacity: usize,
    /// Deadline for one address-record refresh
    pub resolve_timeout: Duration,
    /// Scoring policy
    pub registry: RegistryConfig,
}

impl Default for RoundConfig {
    fn default() -> Self {
        Self {
            workers: 16,
            timeout: Duration::from_secs(300),
            refresh_queue_capacity: 512,
            intake_queue_capacity: 64,
            resolve_timeout: Duration::from_secs(5),
            registry: RegistryConfig::default(),
        }
    }
}

impl RoundConfig {
    /// Small pool and no deadline
    #[cfg(any(test, feature = "test-utils"))]
    pub fn for_testing() -> Self {
        Self {
            workers: 4,
            timeout: Duration::ZERO,
            refresh_queue_capacity: 16,
            intake_queue_capacity: 4,
            resolve_timeout: Duration::from_millis(200),
            registry: RegistryConfig::for_testing(),
        }
    }
}
