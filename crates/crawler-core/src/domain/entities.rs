//! Core Domain Entities for the Crawler
//!
//! Node identity, timestamps, capabilities and signed address records.

use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

use serde::Serialize;
use sha3::{Digest, Keccak256};

use super::errors::RecordParseError;

/// 256-bit node identifier derived from the node's public key.
///
/// Computed as keccak-256 over the 64-byte uncompressed public key (without
/// the leading `0x04` tag byte), which is how discovery v4 names nodes.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub [u8; 32]);

impl NodeId {
    /// Create a NodeId from raw 32-byte array.
    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Derive the id of the node owning `public_key`.
    pub fn from_public_key(public_key: &PublicKey) -> Self {
        let digest = Keccak256::digest(public_key.as_bytes());
        let mut id = [0u8; 32];
        id.copy_from_slice(&digest);
        Self(id)
    }

    /// Get the underlying bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Lower-case hex rendering, used as the persistence key.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({}..)", &self.to_hex()[..16])
    }
}

impl FromStr for NodeId {
    type Err = RecordParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s.trim_start_matches("0x"))
            .map_err(|_| RecordParseError::InvalidHex)?;
        let id: [u8; 32] = bytes
            .try_into()
            .map_err(|_| RecordParseError::InvalidLength { expected: 32 })?;
        Ok(Self(id))
    }
}

/// Uncompressed secp256k1 public key without the leading type-tag byte.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PublicKey(pub [u8; 64]);

impl PublicKey {
    /// Wrap raw key bytes.
    pub fn new(bytes: [u8; 64]) -> Self {
        Self(bytes)
    }

    /// Get the underlying bytes.
    pub fn as_bytes(&self) -> &[u8; 64] {
        &self.0
    }

    /// Parse from the 128-character hex form used in enode URLs.
    pub fn from_hex(s: &str) -> Result<Self, RecordParseError> {
        let bytes = hex::decode(s).map_err(|_| RecordParseError::InvalidHex)?;
        let key: [u8; 64] = bytes
            .try_into()
            .map_err(|_| RecordParseError::InvalidLength { expected: 64 })?;
        Ok(Self(key))
    }

    /// Hex form used in enode URLs.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({}..)", &self.to_hex()[..16])
    }
}

/// Unix timestamp in seconds (UTC).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize)]
#[serde(transparent)]
pub struct Timestamp(u64);

impl Timestamp {
    /// Maximum reasonable timestamp (year 9999).
    pub const MAX_REASONABLE: u64 = 253_402_300_799;

    /// Create a new timestamp, clamping to MAX_REASONABLE.
    pub fn new(secs: u64) -> Self {
        Self(secs.min(Self::MAX_REASONABLE))
    }

    /// Get the underlying seconds value.
    pub fn as_secs(&self) -> u64 {
        self.0
    }

    /// Time elapsed since `earlier`, zero if `earlier` is in the future.
    pub fn duration_since(&self, earlier: Timestamp) -> Duration {
        Duration::from_secs(self.0.saturating_sub(earlier.0))
    }

    /// Add a duration, truncated to whole seconds.
    pub fn saturating_add(&self, duration: Duration) -> Self {
        Self::new(self.0.saturating_add(duration.as_secs()))
    }

    /// Subtract a duration, truncated to whole seconds.
    pub fn saturating_sub(&self, duration: Duration) -> Self {
        Self(self.0.saturating_sub(duration.as_secs()))
    }
}

/// An application protocol a peer claims to speak (`name/version`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Capability {
    /// Protocol name, e.g. `opera` or `snap`
    pub name: String,
    /// Protocol version
    pub version: u32,
}

impl Capability {
    /// Create a new capability
    pub fn new(name: impl Into<String>, version: u32) -> Self {
        Self {
            name: name.into(),
            version,
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.name, self.version)
    }
}

/// The latest signed address record a node advertises.
///
/// Records are versioned by `seq`; a newer record replaces an older one
/// wholesale rather than being merged field by field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressRecord {
    /// Sequence number, increases whenever the node changes its record
    pub seq: u64,
    /// Node's public key
    pub public_key: PublicKey,
    /// Advertised IP address
    pub ip: IpAddr,
    /// TCP port for the application protocol (0 if not advertised)
    pub tcp_port: u16,
    /// UDP port for discovery
    pub udp_port: u16,
}

impl AddressRecord {
    /// Create a record with the same port for TCP and UDP.
    pub fn new(seq: u64, public_key: PublicKey, ip: IpAddr, port: u16) -> Self {
        Self {
            seq,
            public_key,
            ip,
            tcp_port: port,
            udp_port: port,
        }
    }

    /// Get the Node ID derived from public key
    pub fn id(&self) -> NodeId {
        NodeId::from_public_key(&self.public_key)
    }

    /// Address to dial for the application handshake.
    pub fn tcp_addr(&self) -> SocketAddr {
        SocketAddr::new(self.ip, self.tcp_port)
    }

    /// True when `other` is a strictly newer version of this record.
    pub fn is_superseded_by(&self, other: &AddressRecord) -> bool {
        other.seq > self.seq
    }

    /// Parse an `enode://<pubkey>@<ip>:<tcp>[?discport=<udp>]` URL.
    ///
    /// The `enode://` prefix is optional; parsed records carry `seq = 0`.
    pub fn parse_enode(url: &str) -> Result<Self, RecordParseError> {
        let rest = url.trim().strip_prefix("enode://").unwrap_or(url.trim());
        let (key_hex, host) = rest
            .split_once('@')
            .ok_or(RecordParseError::MissingHost)?;
        let public_key = PublicKey::from_hex(key_hex)?;

        let (addr_part, query) = match host.split_once('?') {
            Some((addr, query)) => (addr, Some(query)),
            None => (host, None),
        };
        let addr: SocketAddr = addr_part
            .parse()
            .map_err(|_| RecordParseError::InvalidAddress(addr_part.to_string()))?;

        let mut udp_port = addr.port();
        if let Some(query) = query {
            for pair in query.split('&') {
                if let Some(value) = pair.strip_prefix("discport=") {
                    udp_port = value
                        .parse()
                        .map_err(|_| RecordParseError::InvalidAddress(pair.to_string()))?;
                }
            }
        }

        Ok(Self {
            seq: 0,
            public_key,
            ip: addr.ip(),
            tcp_port: addr.port(),
            udp_port,
        })
    }

    /// Render as an enode URL.
    pub fn to_enode(&self) -> String {
        let addr = SocketAddr::new(self.ip, self.tcp_port);
        if self.udp_port == self.tcp_port {
            format!("enode://{}@{}", self.public_key.to_hex(), addr)
        } else {
            format!(
                "enode://{}@{}?discport={}",
                self.public_key.to_hex(),
                addr,
                self.udp_port
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str = "03c70d4597d731ef182678b7664f2a4a3add07056f23d4e01aba86f066080d18fa13abbd2e13e9d4ea762a2715a983b5ac6151162d05ee0434f1847da1a626e9";

    #[test]
    fn test_parse_enode_with_prefix() {
        let url = format!("enode://{}@34.242.220.16:5050", KEY);
        let record = AddressRecord::parse_enode(&url).unwrap();

        assert_eq!(record.seq, 0);
        assert_eq!(record.tcp_port, 5050);
        assert_eq!(record.udp_port, 5050);
        assert_eq!(record.ip.to_string(), "34.242.220.16");
        assert_eq!(record.to_enode(), url);
    }

    #[test]
    fn test_parse_enode_without_prefix_and_discport() {
        let url = format!("{}@10.0.0.1:30303?discport=30301", KEY);
        let record = AddressRecord::parse_enode(&url).unwrap();

        assert_eq!(record.tcp_port, 30303);
        assert_eq!(record.udp_port, 30301);
        assert!(record.to_enode().ends_with("?discport=30301"));
    }

    #[test]
    fn test_parse_enode_rejects_short_key() {
        let err = AddressRecord::parse_enode("enode://abcd@1.2.3.4:1").unwrap_err();
        assert_eq!(err, RecordParseError::InvalidLength { expected: 64 });
    }

    #[test]
    fn test_parse_enode_rejects_missing_host() {
        let err = AddressRecord::parse_enode(KEY).unwrap_err();
        assert_eq!(err, RecordParseError::MissingHost);
    }

    #[test]
    fn test_node_id_is_stable_and_round_trips_through_hex() {
        let key = PublicKey::from_hex(KEY).unwrap();
        let id = NodeId::from_public_key(&key);

        assert_eq!(id, NodeId::from_public_key(&key));
        assert_eq!(id.to_hex().parse::<NodeId>().unwrap(), id);
    }

    #[test]
    fn test_seq_supersedes() {
        let key = PublicKey::from_hex(KEY).unwrap();
        let old = AddressRecord::new(1, key, "1.2.3.4".parse().unwrap(), 1);
        let mut new = old.clone();
        new.seq = 2;

        assert!(old.is_superseded_by(&new));
        assert!(!new.is_superseded_by(&old));
        assert!(!old.is_superseded_by(&old));
    }

    #[test]
    fn test_timestamp_arithmetic() {
        let t = Timestamp::new(1000);
        assert_eq!(t.saturating_add(Duration::from_secs(5)).as_secs(), 1005);
        assert_eq!(t.duration_since(Timestamp::new(990)), Duration::from_secs(10));
        assert_eq!(t.duration_since(Timestamp::new(2000)), Duration::ZERO);
        assert_eq!(Timestamp::new(u64::MAX).as_secs(), Timestamp::MAX_REASONABLE);
    }
}
