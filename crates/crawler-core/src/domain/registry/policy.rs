//! Outcomes reported by the registry's scoring steps.

use crate::domain::AddressRecord;

/// Result of feeding one candidate sighting through the liveness policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckOutcome {
    /// Checked recently and healthy; nothing changed
    SkippedRecent,
    /// Never answered a record request; dropped without being stored
    SkippedIncompatible,
    /// Score reached zero; the record was evicted
    Removed,
    /// Record stored with a positive score
    Updated {
        /// Address to use for the handshake refresh
        record: AddressRecord,
        /// Score after the update
        score: i64,
        /// First successful response ever seen from this node
        added: bool,
        /// A handshake refresh should be queued (false if one is in flight)
        refresh: bool,
    },
}

impl CheckOutcome {
    /// Short label for log lines.
    pub fn label(&self) -> &'static str {
        match self {
            CheckOutcome::SkippedRecent => "skip-recent",
            CheckOutcome::SkippedIncompatible => "skip-incompatible",
            CheckOutcome::Removed => "removed",
            CheckOutcome::Updated { added: true, .. } => "added",
            CheckOutcome::Updated { added: false, .. } => "updated",
        }
    }
}

/// Result of applying a handshake refresh to the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeUpdate {
    /// Stored record was updated
    Applied,
    /// Node left the registry while the handshake ran; result dropped
    Dropped,
}
