//! # Driven Ports (Outbound SPI)
//!
//! These are the interfaces the crawler **requires** its host to implement.
//! All async ports are object safe through `async_trait` so the round engine
//! can hold heterogeneous discovery variants side by side.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::{AddressRecord, ClientInfo, CrawledNode, ResolveError, StoreError, Timestamp};
use crate::protocol::SessionKey;
use crate::service::handshake::HandshakeError;

/// Lazy, possibly infinite sequence of candidate nodes from one
/// discovery variant. Not restartable.
///
/// # Cancel Safety
///
/// `next_node` is raced against round shutdown, so dropping its future
/// must not lose internal state.
#[async_trait]
pub trait NodeIterator: Send {
    /// Next candidate, or `None` once exhausted or closed.
    async fn next_node(&mut self) -> Option<AddressRecord>;

    /// Stop producing candidates and release resources.
    async fn close(&mut self);

    /// Short name for log lines (e.g. `discv4`).
    fn name(&self) -> &str;
}

/// Requests a node's current signed address record (EIP-868 style).
#[async_trait]
pub trait RecordResolver: Send + Sync {
    /// Ask the node behind `record` for its latest record.
    async fn request_record(&self, record: &AddressRecord) -> Result<AddressRecord, ResolveError>;
}

/// One discovery variant for a round: its iterator and its resolver.
pub struct DiscoverySource {
    /// Candidate stream
    pub iterator: Box<dyn NodeIterator>,
    /// Record refresh for candidates of this variant
    pub resolver: Arc<dyn RecordResolver>,
}

impl DiscoverySource {
    /// Pair an iterator with its resolver
    pub fn new(iterator: Box<dyn NodeIterator>, resolver: Arc<dyn RecordResolver>) -> Self {
        Self { iterator, resolver }
    }
}

impl std::fmt::Debug for DiscoverySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscoverySource")
            .field("iterator", &self.iterator.name())
            .finish_non_exhaustive()
    }
}

/// Failure to set up discovery for a round.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// Listener could not be bound
    #[error("cannot bind discovery listener: {0}")]
    Bind(#[from] std::io::Error),
    /// Variant could not start
    #[error("discovery unavailable: {0}")]
    Unavailable(String),
}

/// Opens fresh discovery sources; called once per round since iterators
/// cannot be restarted.
#[async_trait]
pub trait DiscoveryProvider: Send + Sync {
    /// Sources for the next round; the first one is the primary variant.
    async fn open_sources(&self) -> Result<Vec<DiscoverySource>, DiscoveryError>;
}

/// Errors from the secure channel.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// TCP connection refused or unreachable
    #[error("dial failed: {0}")]
    Dial(String),
    /// Encryption handshake failed
    #[error("encryption handshake failed: {0}")]
    Handshake(String),
    /// Read or write failed
    #[error("channel I/O failed: {0}")]
    Io(#[from] std::io::Error),
    /// A deadline expired
    #[error("channel operation timed out")]
    Timeout,
    /// Peer closed the connection
    #[error("connection closed by peer")]
    Closed,
    /// Frame exceeds the size limit
    #[error("frame of {size} bytes exceeds limit of {max}")]
    FrameTooLarge {
        /// Announced frame size
        size: usize,
        /// Allowed maximum
        max: usize,
    },
    /// Snappy payload could not be processed
    #[error("compression failed: {0}")]
    Compression(String),
}

/// Message-level secure channel to one peer.
#[async_trait]
pub trait SecureChannel: Send {
    /// Write one message.
    async fn write_msg(&mut self, code: u64, payload: &[u8]) -> Result<(), ChannelError>;

    /// Read one message.
    async fn read_msg(&mut self) -> Result<(u64, Vec<u8>), ChannelError>;

    /// Toggle snappy compression of payloads.
    fn set_snappy(&mut self, enabled: bool);

    /// Close the channel.
    async fn close(&mut self);
}

/// Separate deadlines for the two phases of opening a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectTimeouts {
    /// TCP connect
    pub dial: Duration,
    /// Encryption handshake, starting once the connection is up
    pub handshake: Duration,
}

/// Establishes secure channels.
#[async_trait]
pub trait ChannelFactory: Send + Sync {
    /// Dial `record` and complete the encryption handshake using `key`.
    ///
    /// Each phase must give up with [`ChannelError::Timeout`] once its
    /// deadline in `timeouts` expires.
    async fn connect(
        &self,
        record: &AddressRecord,
        key: &SessionKey,
        timeouts: ConnectTimeouts,
    ) -> Result<Box<dyn SecureChannel>, ChannelError>;
}

/// Full handshake-based info refresh, as run by the round's workers.
#[async_trait]
pub trait InfoFetcher: Send + Sync {
    /// Connect to `record` and collect its client info.
    async fn fetch_client_info(&self, record: &AddressRecord) -> Result<ClientInfo, HandshakeError>;
}

/// Persistence collaborator. Rows are upserted by node id, last write wins.
#[async_trait]
pub trait NodeStore: Send + Sync {
    /// Write one flush of rows, presented oldest-first.
    async fn upsert_nodes(&self, rows: &[CrawledNode]) -> Result<(), StoreError>;

    /// Remove rows last observed before `cutoff`; returns the number removed.
    async fn drop_older_than(&self, cutoff: Timestamp) -> Result<usize, StoreError>;
}

/// Abstract interface for time operations.
///
/// Allows deterministic testing by injecting controlled time.
pub trait TimeSource: Send + Sync {
    /// Get the current timestamp.
    fn now(&self) -> Timestamp;
}
