//! # Node Crawler Core
//!
//! Discovers peers of a devp2p network, handshakes with each one to learn
//! its client software and chain status, and keeps a liveness-weighted
//! registry of every node it has seen.
//!
//! ## Architecture
//!
//! The crate follows Hexagonal Architecture with:
//! - **Domain Layer:** node records, scoring policy, version string parser
//! - **Protocol Layer:** RLP wire messages and capability negotiation
//! - **Ports Layer:** discovery, secure channel, persistence and clock traits
//! - **Service Layer:** handshake client, round engine, supervisor
//! - **Adapters Layer:** system clock, node file, framed TCP channel, stores
//!
//! ## Example
//!
//! ```rust
//! use crawler_core::parse_version_string;
//!
//! let parsed = parse_version_string("go-opera/v1.1.2-rc.6-825a85c9-1689192286/linux-amd64/go1.20.4");
//! assert_eq!(parsed.name, "go-opera");
//! assert_eq!(parsed.version.tag, "rc.6");
//! assert_eq!(parsed.os.architecture, "amd64");
//! assert_eq!(parsed.runtime.version, "1.20.4");
//! ```

// =============================================================================
// CORE MODULES
// =============================================================================

pub mod domain;
pub mod ports;
pub mod protocol;
pub mod service;

/// Concrete implementations of the driven ports.
pub mod adapters;

/// Test utilities (FixedTimeSource, scripted channels, mock resolvers)
/// Requires feature: `test-utils`
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

// =============================================================================
// RE-EXPORTS
// =============================================================================

// Domain entities
pub use domain::{
    parse_version_string, AddressRecord, Capability, ChainIdentity, ChainProgress, ClientInfo,
    CrawledNode, NodeFileError, NodeId, NodeRecord, NodeRegistry, NodeSet, ParsedVersion,
    PublicKey, RecordParseError, RegistryConfig, ResolveError, StoreError, Timestamp,
};

// Port traits
pub use ports::{
    ChannelError, ChannelFactory, ConnectTimeouts, DiscoveryError, DiscoveryProvider, DiscoverySource, InfoFetcher,
    NodeIterator, NodeStore, RecordResolver, SecureChannel, TimeSource,
};

// Services
pub use service::{
    HandshakeClient, HandshakeConfig, HandshakeError, RoundConfig, RoundEngine, RoundError,
    StaticNodeIterator, Supervisor, SupervisorConfig, SupervisorError,
};

// Adapters
pub use adapters::{
    BootnodeDiscovery, JsonLinesStore, MemoryStore, ProbeResolver, SystemTimeSource,
    TcpChannelFactory,
};

#[cfg(any(test, feature = "test-utils"))]
pub use test_utils::FixedTimeSource;
