//! Chain identity the crawler presents and checks during the status step.
//!
//! Built once at startup from configuration and shared immutably with the
//! handshake client; nothing here is process-global.

use super::entities::Capability;

/// Synthetic chain progress advertised to peers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChainProgress {
    /// Current epoch
    pub epoch: u32,
    /// Index of the last block
    pub last_block: u64,
    /// Hash of the checkpoint event closing the last block
    pub checkpoint: [u8; 32],
}

/// Static chain configuration (network, genesis, protocol)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainIdentity {
    /// Network identifier
    pub network_id: u64,
    /// Genesis hash, MUST match for same network
    pub genesis_hash: [u8; 32],
    /// Name of the application protocol (e.g. `opera`)
    pub protocol_name: String,
    /// Supported application protocol versions
    pub protocol_versions: Vec<u32>,
    /// Progress sent in the progress exchange
    pub progress: ChainProgress,
}

impl ChainIdentity {
    /// Create a chain identity.
    pub fn new(
        network_id: u64,
        genesis_hash: [u8; 32],
        protocol_name: impl Into<String>,
        protocol_versions: Vec<u32>,
        progress: ChainProgress,
    ) -> Self {
        Self {
            network_id,
            genesis_hash,
            protocol_name: protocol_name.into(),
            protocol_versions,
            progress,
        }
    }

    /// Capability table advertised in our hello message.
    pub fn capabilities(&self) -> Vec<Capability> {
        self.protocol_versions
            .iter()
            .map(|v| Capability::new(self.protocol_name.clone(), *v))
            .collect()
    }

    /// Highest application protocol version we speak.
    pub fn highest_version(&self) -> Option<u32> {
        self.protocol_versions.iter().copied().max()
    }

    /// Minimal identity for tests
    #[cfg(any(test, feature = "test-utils"))]
    pub fn for_testing() -> Self {
        Self::new(
            250,
            [0xab; 32],
            "opera",
            vec![62, 63],
            ChainProgress {
                epoch: 1,
                last_block: 100,
                checkpoint: [0xcd; 32],
            },
        )
    }
}
