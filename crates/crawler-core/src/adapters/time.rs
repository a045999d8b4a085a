use std::time::{SystemTime, UNIX_EPOCH};

use crate::domain::Timestamp;
use crate::ports::TimeSource;

/// Wall-clock time source.
///
/// For testing, use `FixedTimeSource` or `ControllableTimeSource` from the
/// test utilities.
///
/// # Example
///
/// ```rust
/// use crawler_core::adapters::SystemTimeSource;
/// use crawler_core::TimeSource;
///
/// let now = SystemTimeSource::new().now();
/// assert!(now.as_secs() > 1_600_000_000);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTimeSource;

impl SystemTimeSource {
    /// Create a new system time source.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl TimeSource for SystemTimeSource {
    fn now(&self) -> Timestamp {
        let since_epoch = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        Timestamp::new(since_epoch.as_secs())
    }
}
