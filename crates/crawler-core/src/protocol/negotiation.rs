//! Capability negotiation.

use crate::domain::Capability;

/// Highest version of `protocol` advertised by both sides.
///
/// Returns `None` if the peers share no version of the protocol.
pub fn negotiate(ours: &[Capability], theirs: &[Capability], protocol: &str) -> Option<u32> {
    theirs
        .iter()
        .filter(|cap| cap.name == protocol)
        .filter(|cap| ours.iter().any(|o| o.name == protocol && o.version == cap.version))
        .map(|cap| cap.version)
        .max()
}
