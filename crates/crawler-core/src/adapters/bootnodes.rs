//! Static bootnode list as a discovery provider.

use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::{AddressRecord, RecordParseError};
use crate::ports::{DiscoveryError, DiscoveryProvider, DiscoverySource, RecordResolver};
use crate::service::round::StaticNodeIterator;

/// Mainnet bootnodes.
pub const MAINNET_BOOTNODES: &[&str] = &[
    "enode://03c70d4597d731ef182678b7664f2a4a3add07056f23d4e01aba86f066080d18fa13abbd2e13e9d4ea762a2715a983b5ac6151162d05ee0434f1847da1a626e9@34.242.220.16:5050",
    "enode://01c64d1a9dd8a65c56f2d4e373795eb6efd27b714b2b5999363a42a0edc39d7417a431416ceb5c67b1a170983af109e8a15d0c2d44a2ac41ecfb5c23c1a1a48a@3.35.200.210:5050",
    "enode://7044c88daa5df059e2f7a2667471a8149a5cf66e68643dcb86f399d48c4ff6475b73ee91486ea830d225f7f78a2fdf955208673da51c6852230c3a90a3701c06@3.1.103.70:5050",
    "enode://594d26c2338566daca9391d73f1b1821bb0b454e6f3d48715116bf42f320924d569534c143b640feec8a8eaa137a0b822426fb62b52a90162270ea5868bdc37c@18.138.254.181:5050",
    "enode://339e331912e5239a9e13eb82b47be58ea4d3946e91caa2992103a8d4f0226c1e86f9134822d5b238f25c9cbdd473f806caa8e4f8ef1748a6c66395f4bf0dd569@54.66.206.151:5050",
];

/// Parse a list of enode URLs.
pub fn parse_bootnodes<S: AsRef<str>>(urls: &[S]) -> Result<Vec<AddressRecord>, RecordParseError> {
    urls.iter()
        .map(|url| AddressRecord::parse_enode(url.as_ref()))
        .collect()
}

/// Replays the configured bootnodes every round.
///
/// Stands in for a DHT crawl when no discovery listener is wired in: the
/// round still revalidates every known node and handshakes the bootnodes.
pub struct BootnodeDiscovery {
    bootnodes: Vec<AddressRecord>,
    resolver: Arc<dyn RecordResolver>,
}

impl BootnodeDiscovery {
    /// Provider over `bootnodes`, refreshed through `resolver`.
    pub fn new(bootnodes: Vec<AddressRecord>, resolver: Arc<dyn RecordResolver>) -> Self {
        Self {
            bootnodes,
            resolver,
        }
    }

    /// Configured bootnodes
    pub fn bootnodes(&self) -> &[AddressRecord] {
        &self.bootnodes
    }
}

#[async_trait]
impl DiscoveryProvider for BootnodeDiscovery {
    async fn open_sources(&self) -> Result<Vec<DiscoverySource>, DiscoveryError> {
        let iterator = StaticNodeIterator::new("bootnodes", self.bootnodes.clone());
        Ok(vec![DiscoverySource::new(
            Box::new(iterator),
            Arc::clone(&self.resolver),
        )])
    }
}
