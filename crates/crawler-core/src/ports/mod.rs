//! # Ports Layer - Hexagonal Architecture Boundaries
//!
//! Driven ports the crawler requires from its host: discovery iterators and
//! record refresh, the secure channel used for handshakes, persistence and
//! a clock. Concrete implementations live in `adapters` or in the host.

pub mod outbound;

pub use outbound::{
    ChannelError, ChannelFactory, ConnectTimeouts, DiscoveryError, DiscoveryProvider, DiscoverySource,
    InfoFetcher, NodeIterator, NodeStore, RecordResolver, SecureChannel, TimeSource,
};
