//! Test utilities for the crawler.
//!
//! This module provides mock implementations of the driven ports for
//! deterministic testing. Enable with the `test-utils` feature flag.
//!
//! # Example
//!
//! ```rust
//! use crawler_core::test_utils::FixedTimeSource;
//! use crawler_core::TimeSource;
//!
//! let time_source = FixedTimeSource::new(1000);
//! assert_eq!(time_source.now().as_secs(), 1000);
//! ```

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::domain::{
    AddressRecord, ClientInfo, CrawledNode, NodeId, PublicKey, ResolveError, StoreError, Timestamp,
};
use crate::ports::{
    ChannelError, ChannelFactory, ConnectTimeouts, DiscoveryError, DiscoveryProvider, DiscoverySource, InfoFetcher,
    NodeIterator, NodeStore, RecordResolver, SecureChannel, TimeSource,
};
use crate::protocol::{DisconnectReason, Message, SessionKey};
use crate::service::handshake::{HandshakeError, HandshakeStep};

/// Address record with a public key filled with `byte`.
pub fn make_record(byte: u8, seq: u64) -> AddressRecord {
    AddressRecord::new(
        seq,
        PublicKey::new([byte; 64]),
        std::net::IpAddr::from([10, 0, 0, byte]),
        30303,
    )
}

// =============================================================================
// TIME
// =============================================================================

/// A time source that returns a fixed timestamp.
#[derive(Debug, Clone)]
pub struct FixedTimeSource {
    timestamp: u64,
}

impl FixedTimeSource {
    /// Create a new fixed time source with the given timestamp (in seconds).
    pub fn new(timestamp: u64) -> Self {
        Self { timestamp }
    }
}

impl TimeSource for FixedTimeSource {
    fn now(&self) -> Timestamp {
        Timestamp::new(self.timestamp)
    }
}

/// A time source that only moves when told to.
#[derive(Debug, Default)]
pub struct ControllableTimeSource {
    time: AtomicU64,
}

impl ControllableTimeSource {
    /// Start the clock at `initial` seconds.
    pub fn new(initial: u64) -> Self {
        Self {
            time: AtomicU64::new(initial),
        }
    }

    /// Advances the internal clock by the specified seconds.
    pub fn advance(&self, secs: u64) {
        self.time.fetch_add(secs, Ordering::SeqCst);
    }
}

impl TimeSource for ControllableTimeSource {
    fn now(&self) -> Timestamp {
        Timestamp::new(self.time.load(Ordering::SeqCst))
    }
}

// =============================================================================
// SECURE CHANNEL
// =============================================================================

/// One scripted reply of a fake peer.
#[derive(Debug, Clone)]
pub enum PeerReply {
    /// Reply with a well-formed message
    Send(Message),
    /// Reply with arbitrary bytes under `code`
    Raw {
        /// Message code
        code: u64,
        /// Payload bytes
        payload: Vec<u8>,
    },
    /// Never answer
    Stall,
}

/// What a scripted channel observed.
#[derive(Debug, Default, Clone)]
pub struct ChannelLog {
    /// Messages written by the crawler, as `(code, payload)`
    pub written: Vec<(u64, Vec<u8>)>,
    /// Snappy was enabled
    pub snappy: bool,
    /// Channel was closed
    pub closed: bool,
}

impl ChannelLog {
    /// Codes of all written messages, in order.
    pub fn written_codes(&self) -> Vec<u64> {
        self.written.iter().map(|(code, _)| *code).collect()
    }

    /// Decoded written messages, skipping anything undecodable.
    pub fn written_messages(&self) -> Vec<Message> {
        self.written
            .iter()
            .filter_map(|(code, payload)| Message::decode(*code, payload).ok())
            .collect()
    }
}

/// Channel replaying a fixed list of replies, one per read.
pub struct ScriptedChannel {
    replies: VecDeque<PeerReply>,
    log: Arc<Mutex<ChannelLog>>,
}

#[async_trait]
impl SecureChannel for ScriptedChannel {
    async fn write_msg(&mut self, code: u64, payload: &[u8]) -> Result<(), ChannelError> {
        self.log.lock().written.push((code, payload.to_vec()));
        Ok(())
    }

    async fn read_msg(&mut self) -> Result<(u64, Vec<u8>), ChannelError> {
        match self.replies.pop_front() {
            Some(PeerReply::Send(msg)) => Ok((msg.code(), msg.encode())),
            Some(PeerReply::Raw { code, payload }) => Ok((code, payload)),
            Some(PeerReply::Stall) => std::future::pending().await,
            None => Err(ChannelError::Closed),
        }
    }

    fn set_snappy(&mut self, enabled: bool) {
        self.log.lock().snappy = enabled;
    }

    async fn close(&mut self) {
        self.log.lock().closed = true;
    }
}

/// Factory handing out [`ScriptedChannel`]s that all play the same script.
pub struct ScriptedChannelFactory {
    script: Vec<PeerReply>,
    refuse: bool,
    stall_handshake: bool,
    connects: AtomicUsize,
    session_ids: Mutex<Vec<PublicKey>>,
    timeouts: Mutex<Option<ConnectTimeouts>>,
    log: Arc<Mutex<ChannelLog>>,
}

impl ScriptedChannelFactory {
    /// Every connection replays `script`.
    pub fn new(script: Vec<PeerReply>) -> Self {
        Self {
            script,
            refuse: false,
            stall_handshake: false,
            connects: AtomicUsize::new(0),
            session_ids: Mutex::new(Vec::new()),
            timeouts: Mutex::new(None),
            log: Arc::new(Mutex::new(ChannelLog::default())),
        }
    }

    /// Every dial is refused.
    pub fn refusing() -> Self {
        Self {
            refuse: true,
            ..Self::new(Vec::new())
        }
    }

    /// Every dial connects but the encryption handshake never answers.
    pub fn stalling_handshake() -> Self {
        Self {
            stall_handshake: true,
            ..Self::new(Vec::new())
        }
    }

    /// Deadlines passed to the most recent dial.
    pub fn last_timeouts(&self) -> Option<ConnectTimeouts> {
        *self.timeouts.lock()
    }

    /// Log shared by all channels of this factory.
    pub fn log(&self) -> ChannelLog {
        self.log.lock().clone()
    }

    /// Number of connection attempts.
    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    /// Session public keys used, one per dial.
    pub fn session_ids(&self) -> Vec<PublicKey> {
        self.session_ids.lock().clone()
    }
}

#[async_trait]
impl ChannelFactory for ScriptedChannelFactory {
    async fn connect(
        &self,
        record: &AddressRecord,
        key: &SessionKey,
        timeouts: ConnectTimeouts,
    ) -> Result<Box<dyn SecureChannel>, ChannelError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        *self.timeouts.lock() = Some(timeouts);
        self.session_ids.lock().push(key.public_key());
        if self.refuse {
            return Err(ChannelError::Dial(format!("{} refused", record.tcp_addr())));
        }
        if self.stall_handshake {
            tokio::time::sleep(timeouts.handshake).await;
            return Err(ChannelError::Timeout);
        }
        Ok(Box::new(ScriptedChannel {
            replies: self.script.iter().cloned().collect(),
            log: Arc::clone(&self.log),
        }))
    }
}

// =============================================================================
// DISCOVERY
// =============================================================================

/// Resolver answering from a table; unknown nodes echo their own record.
#[derive(Default)]
pub struct StaticResolver {
    answers: Mutex<HashMap<NodeId, Result<AddressRecord, ResolveError>>>,
    calls: AtomicUsize,
}

impl StaticResolver {
    /// Resolver echoing every record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer requests for `record`'s node with `record`.
    pub fn with_record(self, record: AddressRecord) -> Self {
        self.answers.lock().insert(record.id(), Ok(record));
        self
    }

    /// Fail requests for `id`.
    pub fn with_failure(self, id: NodeId) -> Self {
        self.answers.lock().insert(id, Err(ResolveError::Timeout));
        self
    }

    /// Number of requests served.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RecordResolver for StaticResolver {
    async fn request_record(&self, record: &AddressRecord) -> Result<AddressRecord, ResolveError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.answers
            .lock()
            .get(&record.id())
            .cloned()
            .unwrap_or_else(|| Ok(record.clone()))
    }
}

/// Yields its records, then waits until closed instead of finishing.
pub struct EndlessIterator {
    name: String,
    records: VecDeque<AddressRecord>,
    closed: bool,
}

impl EndlessIterator {
    /// Iterator named `name` producing `records` before idling.
    pub fn new(name: &str, records: Vec<AddressRecord>) -> Self {
        Self {
            name: name.to_string(),
            records: records.into(),
            closed: false,
        }
    }
}

#[async_trait]
impl NodeIterator for EndlessIterator {
    async fn next_node(&mut self) -> Option<AddressRecord> {
        if self.closed {
            return None;
        }
        match self.records.pop_front() {
            Some(record) => Some(record),
            None => std::future::pending().await,
        }
    }

    async fn close(&mut self) {
        self.closed = true;
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Discovery provider opening one finite source per round.
pub struct MockDiscovery {
    records: Vec<AddressRecord>,
    resolver: Arc<StaticResolver>,
    failures: AtomicUsize,
    opens: AtomicUsize,
    no_sources: bool,
    shutdown: Mutex<Option<(usize, tokio::sync::watch::Sender<bool>)>>,
}

impl MockDiscovery {
    /// Every round replays `records`, resolved by an echoing resolver.
    pub fn new(records: Vec<AddressRecord>) -> Self {
        Self {
            records,
            resolver: Arc::new(StaticResolver::new()),
            failures: AtomicUsize::new(0),
            opens: AtomicUsize::new(0),
            no_sources: false,
            shutdown: Mutex::new(None),
        }
    }

    /// Fail the first `failures` opens.
    pub fn failing(self, failures: usize) -> Self {
        self.failures.store(failures, Ordering::SeqCst);
        self
    }

    /// Open successfully but return no sources.
    pub fn without_sources(mut self) -> Self {
        self.no_sources = true;
        self
    }

    /// Request shutdown through `tx` once `opens` sources have been opened.
    pub fn with_shutdown_after(self, opens: usize, tx: tokio::sync::watch::Sender<bool>) -> Self {
        *self.shutdown.lock() = Some((opens, tx));
        self
    }

    /// Number of `open_sources` calls, failed or not.
    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DiscoveryProvider for MockDiscovery {
    async fn open_sources(&self) -> Result<Vec<DiscoverySource>, DiscoveryError> {
        let opens = self.opens.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some((after, tx)) = self.shutdown.lock().as_ref() {
            if opens >= *after {
                let _ = tx.send(true);
            }
        }

        let remaining = self.failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures.store(remaining - 1, Ordering::SeqCst);
            return Err(DiscoveryError::Unavailable("listener not ready".into()));
        }
        if self.no_sources {
            return Ok(Vec::new());
        }

        let iterator = crate::service::round::StaticNodeIterator::new("discv4", self.records.clone());
        let resolver: Arc<dyn RecordResolver> = self.resolver.clone();
        Ok(vec![DiscoverySource::new(Box::new(iterator), resolver)])
    }
}

// =============================================================================
// HANDSHAKES
// =============================================================================

/// Scripted handshake result for one node.
#[derive(Debug, Clone)]
pub enum MockHandshake {
    /// Succeeds with this info
    Success(ClientInfo),
    /// Peer is full
    TooManyPeers,
    /// Peer times out
    Fail,
}

/// Info fetcher with scripted results that tracks concurrency per node.
pub struct MockInfoFetcher {
    results: Mutex<HashMap<NodeId, MockHandshake>>,
    delay: Duration,
    active: Mutex<HashMap<NodeId, usize>>,
    max_concurrent_per_node: AtomicUsize,
    calls: Mutex<Vec<NodeId>>,
}

impl MockInfoFetcher {
    /// Every handshake takes `delay` and succeeds unless scripted otherwise.
    pub fn new(delay: Duration) -> Self {
        Self {
            results: Mutex::new(HashMap::new()),
            delay,
            active: Mutex::new(HashMap::new()),
            max_concurrent_per_node: AtomicUsize::new(0),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Script the result for `id`.
    pub fn with_result(self, id: NodeId, result: MockHandshake) -> Self {
        self.results.lock().insert(id, result);
        self
    }

    /// Nodes handshaked, in call order.
    pub fn calls(&self) -> Vec<NodeId> {
        self.calls.lock().clone()
    }

    /// Highest number of simultaneous handshakes seen for any single node.
    pub fn max_concurrent_per_node(&self) -> usize {
        self.max_concurrent_per_node.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl InfoFetcher for MockInfoFetcher {
    async fn fetch_client_info(&self, record: &AddressRecord) -> Result<ClientInfo, HandshakeError> {
        let id = record.id();
        self.calls.lock().push(id);
        {
            let mut active = self.active.lock();
            let count = active.entry(id).or_insert(0);
            *count += 1;
            self.max_concurrent_per_node.fetch_max(*count, Ordering::SeqCst);
        }

        tokio::time::sleep(self.delay).await;

        if let Some(count) = self.active.lock().get_mut(&id) {
            *count -= 1;
        }

        let result = self.results.lock().get(&id).cloned();
        match result {
            None => Ok(ClientInfo {
                client_type: "geth/v1.10.0-stable/linux-amd64/go1.20".into(),
                software_version: 5,
                ..ClientInfo::default()
            }),
            Some(MockHandshake::Success(info)) => Ok(info),
            Some(MockHandshake::TooManyPeers) => Err(HandshakeError::Disconnected {
                step: HandshakeStep::Hello,
                reason: DisconnectReason::TooManyPeers,
            }),
            Some(MockHandshake::Fail) => Err(HandshakeError::Timeout {
                step: HandshakeStep::Hello,
            }),
        }
    }
}

// =============================================================================
// PERSISTENCE
// =============================================================================

/// Store failing the first `failures` flushes and recording the rest.
#[derive(Default)]
pub struct FlakyStore {
    failures: AtomicUsize,
    attempts: AtomicUsize,
    flushes: Mutex<Vec<Vec<CrawledNode>>>,
    prunes: Mutex<Vec<Timestamp>>,
}

impl FlakyStore {
    /// Fail the first `failures` upserts.
    pub fn new(failures: usize) -> Self {
        Self {
            failures: AtomicUsize::new(failures),
            ..Self::default()
        }
    }

    /// Number of upsert attempts, failed or not.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Successful flushes, in order.
    pub fn flushes(&self) -> Vec<Vec<CrawledNode>> {
        self.flushes.lock().clone()
    }

    /// Cutoffs passed to `drop_older_than`.
    pub fn prunes(&self) -> Vec<Timestamp> {
        self.prunes.lock().clone()
    }
}

#[async_trait]
impl NodeStore for FlakyStore {
    async fn upsert_nodes(&self, rows: &[CrawledNode]) -> Result<(), StoreError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let remaining = self.failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures.store(remaining - 1, Ordering::SeqCst);
            return Err(StoreError::Transaction("database is locked".into()));
        }
        self.flushes.lock().push(rows.to_vec());
        Ok(())
    }

    async fn drop_older_than(&self, cutoff: Timestamp) -> Result<usize, StoreError> {
        self.prunes.lock().push(cutoff);
        Ok(0)
    }
}
