//! Registry scoring configuration.

use std::time::Duration;

/// Node registry configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryConfig {
    /// Minimum time between two liveness probes of a healthy node
    pub revalidate_interval: Duration,
    /// Score added after a successful handshake
    pub handshake_bonus: i64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            revalidate_interval: Duration::from_secs(600),
            handshake_bonus: 10,
        }
    }
}

impl RegistryConfig {
    /// Testing config with a short revalidation window
    #[cfg(any(test, feature = "test-utils"))]
    pub fn for_testing() -> Self {
        Self {
            revalidate_interval: Duration::from_secs(60),
            handshake_bonus: 10,
        }
    }
}
