//! Handshake failures.

use std::fmt;

use thiserror::Error;

use crate::ports::ChannelError;
use crate::protocol::{DisconnectReason, ProtocolError};

/// Step of the handshake state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandshakeStep {
    /// Connect and encryption handshake
    Dial,
    /// Capability advertisement
    Hello,
    /// Chain status check
    Status,
    /// Chain progress exchange
    Progress,
}

impl fmt::Display for HandshakeStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HandshakeStep::Dial => "dial",
            HandshakeStep::Hello => "hello",
            HandshakeStep::Status => "status",
            HandshakeStep::Progress => "progress",
        };
        f.write_str(name)
    }
}

/// Why a handshake attempt failed.
#[derive(Debug, Error)]
pub enum HandshakeError {
    /// Channel failure
    #[error("{step} failed: {source}")]
    Channel {
        /// Step that failed
        step: HandshakeStep,
        /// Underlying channel error
        #[source]
        source: ChannelError,
    },
    /// Peer sent a disconnect
    #[error("peer disconnected during {step}: {reason}")]
    Disconnected {
        /// Step that failed
        step: HandshakeStep,
        /// Reason given by the peer
        reason: DisconnectReason,
    },
    /// Message not valid at this step
    #[error("unexpected message code {code:#04x} during {step}")]
    UnexpectedMessage {
        /// Step that failed
        step: HandshakeStep,
        /// Received message code
        code: u64,
    },
    /// Message could not be decoded
    #[error("malformed {step} message: {source}")]
    Malformed {
        /// Step that failed
        step: HandshakeStep,
        /// Decoding failure
        #[source]
        source: ProtocolError,
    },
    /// Peer is on another network
    #[error("network mismatch: got {got}, need {expected}")]
    NetworkMismatch {
        /// Peer's network id
        got: u64,
        /// Our network id
        expected: u64,
    },
    /// Peer has another genesis
    #[error("genesis mismatch: got {}, need {}", hex::encode(got), hex::encode(expected))]
    GenesisMismatch {
        /// Peer's genesis hash
        got: [u8; 32],
        /// Our genesis hash
        expected: [u8; 32],
    },
    /// Peer answered with another protocol version than negotiated
    #[error("protocol version mismatch: got {got}, need {expected}")]
    VersionMismatch {
        /// Peer's version
        got: u32,
        /// Negotiated version
        expected: u32,
    },
    /// Step deadline expired
    #[error("{step} timed out")]
    Timeout {
        /// Step that timed out
        step: HandshakeStep,
    },
}

impl HandshakeError {
    /// Step at which the handshake failed, if it is tied to one
    pub fn step(&self) -> Option<HandshakeStep> {
        match self {
            HandshakeError::Channel { step, .. }
            | HandshakeError::Disconnected { step, .. }
            | HandshakeError::UnexpectedMessage { step, .. }
            | HandshakeError::Malformed { step, .. }
            | HandshakeError::Timeout { step } => Some(*step),
            HandshakeError::NetworkMismatch { .. }
            | HandshakeError::GenesisMismatch { .. }
            | HandshakeError::VersionMismatch { .. } => Some(HandshakeStep::Status),
        }
    }

    /// The peer rejected us because its connection table is full
    pub fn is_too_many_peers(&self) -> bool {
        matches!(
            self,
            HandshakeError::Disconnected {
                reason: DisconnectReason::TooManyPeers,
                ..
            }
        )
    }

    /// The peer belongs to a foreign or incompatible chain
    pub fn is_chain_mismatch(&self) -> bool {
        matches!(
            self,
            HandshakeError::NetworkMismatch { .. }
                | HandshakeError::GenesisMismatch { .. }
                | HandshakeError::VersionMismatch { .. }
        )
    }
}
