//! Round coordinator, iterator tasks and handshake workers.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{timeout, Instant};
use tracing::{debug, info, warn};

use super::config::RoundConfig;
use super::seed::StaticNodeIterator;
use crate::domain::{AddressRecord, CheckOutcome, NodeRegistry, NodeSet, ResolveError};
use crate::ports::{DiscoverySource, InfoFetcher, NodeIterator, RecordResolver, TimeSource};

/// Index of the iterator replaying the input set
const SEED_ITERATOR: usize = 0;

/// Errors that prevent a round from starting.
#[derive(Debug, Error)]
pub enum RoundError {
    /// At least one discovery source is needed to resolve records
    #[error("no discovery sources configured")]
    NoDiscoverySources,
}

/// A candidate sighting and the iterator that produced it.
struct Candidate {
    record: AddressRecord,
    source: usize,
}

/// Shared state of one running round.
struct RoundState {
    registry: Mutex<NodeRegistry>,
    resolvers: Vec<Arc<dyn RecordResolver>>,
}

/// Runs discovery rounds.
pub struct RoundEngine {
    config: RoundConfig,
    fetcher: Arc<dyn InfoFetcher>,
    time: Arc<dyn TimeSource>,
}

impl RoundEngine {
    /// Create an engine handshaking through `fetcher`.
    pub fn new(config: RoundConfig, fetcher: Arc<dyn InfoFetcher>, time: Arc<dyn TimeSource>) -> Self {
        Self {
            config,
            fetcher,
            time,
        }
    }

    /// Engine configuration
    pub fn config(&self) -> &RoundConfig {
        &self.config
    }

    /// Fail the way [`RoundEngine::run`] would before it consumes its input.
    pub fn check_sources(sources: &[DiscoverySource]) -> Result<(), RoundError> {
        if sources.is_empty() {
            return Err(RoundError::NoDiscoverySources);
        }
        Ok(())
    }

    /// Run one round seeded with `input`, returning the updated node set.
    ///
    /// Candidates replayed from `input` are resolved with the first source's
    /// resolver. The round ends when every iterator is exhausted or when the
    /// deadline fires. Handshakes already queued or running are finished
    /// before the snapshot is returned.
    pub async fn run(&self, input: NodeSet, sources: Vec<DiscoverySource>) -> Result<NodeSet, RoundError> {
        Self::check_sources(&sources)?;
        let primary = sources
            .first()
            .map(|source| Arc::clone(&source.resolver))
            .ok_or(RoundError::NoDiscoverySources)?;

        let started = Instant::now();
        let input_len = input.len();
        let seed: Box<dyn NodeIterator> =
            Box::new(StaticNodeIterator::new("input", input.address_records()));

        let mut iterators = vec![seed];
        let mut resolvers = vec![primary];
        for source in sources {
            iterators.push(source.iterator);
            resolvers.push(source.resolver);
        }

        let state = Arc::new(RoundState {
            registry: Mutex::new(NodeRegistry::from_node_set(input, self.config.registry.clone())),
            resolvers,
        });

        let (intake_tx, mut intake_rx) = mpsc::channel(self.config.intake_queue_capacity.max(1));
        let (done_tx, mut done_rx) = mpsc::channel(iterators.len());
        let (closed_tx, closed_rx) = watch::channel(false);
        let (refresh_tx, refresh_rx) = mpsc::channel(self.config.refresh_queue_capacity.max(1));
        let refresh_rx = Arc::new(tokio::sync::Mutex::new(refresh_rx));

        let mut live = iterators.len();
        let mut iterator_tasks = Vec::with_capacity(live);
        for (index, iterator) in iterators.into_iter().enumerate() {
            iterator_tasks.push(tokio::spawn(run_iterator(
                index,
                iterator,
                intake_tx.clone(),
                closed_rx.clone(),
                done_tx.clone(),
            )));
        }
        drop(intake_tx);
        drop(done_tx);

        let mut workers = Vec::with_capacity(self.config.workers);
        for _ in 0..self.config.workers {
            workers.push(tokio::spawn(run_worker(
                Arc::clone(&refresh_rx),
                Arc::clone(&self.fetcher),
                Arc::clone(&state),
            )));
        }

        let deadline = tokio::time::sleep(Duration::ZERO);
        tokio::pin!(deadline);
        let mut armed = false;
        let mut timed_out = false;

        loop {
            tokio::select! {
                Some(candidate) = intake_rx.recv() => {
                    self.process(candidate, &state, &refresh_tx).await;
                }
                Some(index) = done_rx.recv() => {
                    if index == SEED_ITERATOR {
                        // Seed candidates were queued before the done signal.
                        while let Ok(candidate) = intake_rx.try_recv() {
                            self.process(candidate, &state, &refresh_tx).await;
                        }
                        info!(len = input_len, "Revalidation of input set is done");
                        if !self.config.timeout.is_zero() {
                            deadline.as_mut().reset(Instant::now() + self.config.timeout);
                            armed = true;
                        }
                    }
                    live -= 1;
                    if live == 0 {
                        break;
                    }
                }
                () = &mut deadline, if armed => {
                    timed_out = true;
                    break;
                }
                else => break,
            }
        }

        if !timed_out {
            while let Ok(candidate) = intake_rx.try_recv() {
                self.process(candidate, &state, &refresh_tx).await;
            }
        }

        let _ = closed_tx.send(true);
        drop(refresh_tx);
        drop(intake_rx);

        join_all("iterator", iterator_tasks).await;
        join_all("worker", workers).await;

        let output = match Arc::try_unwrap(state) {
            Ok(state) => state.registry.into_inner().into_node_set(),
            Err(shared) => shared.registry.lock().snapshot(),
        };

        info!(
            nodes = output.len(),
            input = input_len,
            timed_out,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Round finished"
        );
        Ok(output)
    }

    /// Apply the liveness policy to one candidate.
    ///
    /// The registry lock is taken twice, around the gate and around the
    /// update, and never held while the record request is in flight.
    async fn process(
        &self,
        candidate: Candidate,
        state: &RoundState,
        refresh_tx: &mpsc::Sender<AddressRecord>,
    ) {
        let Candidate { record, source } = candidate;
        let id = record.id();
        let now = self.time.now();

        let needs_check = state.registry.lock().needs_check(&id, now);
        if !needs_check {
            debug!(node_id = %id, "Skipping recently checked node");
            return;
        }

        let resolver = match state.resolvers.get(source) {
            Some(resolver) => resolver,
            None => return,
        };
        let refreshed = match timeout(self.config.resolve_timeout, resolver.request_record(&record)).await {
            Ok(result) => result,
            Err(_) => Err(ResolveError::Timeout),
        };

        let outcome = state
            .registry
            .lock()
            .apply_check_outcome(&record, refreshed, now);

        match outcome {
            CheckOutcome::SkippedRecent => {
                debug!(node_id = %id, "Skipping recently checked node");
            }
            CheckOutcome::SkippedIncompatible => {
                debug!(node_id = %id, "Skipping node without record support");
            }
            CheckOutcome::Removed => {
                info!(node_id = %id, "Removing node");
            }
            CheckOutcome::Updated {
                record,
                score,
                added,
                refresh,
            } => {
                info!(node_id = %id, seq = record.seq, score, added, "Updating node");
                if refresh && refresh_tx.send(record).await.is_err() {
                    state.registry.lock().cancel_refresh(&id);
                }
            }
        }
    }
}

/// Push candidates from one iterator until it ends or the round closes.
async fn run_iterator(
    index: usize,
    mut iterator: Box<dyn NodeIterator>,
    intake: mpsc::Sender<Candidate>,
    mut closed: watch::Receiver<bool>,
    done: mpsc::Sender<usize>,
) {
    loop {
        let next = tokio::select! {
            biased;
            _ = closed.wait_for(|closed| *closed) => break,
            next = iterator.next_node() => next,
        };
        let Some(record) = next else {
            break;
        };

        let candidate = Candidate {
            record,
            source: index,
        };
        tokio::select! {
            biased;
            _ = closed.wait_for(|closed| *closed) => break,
            sent = intake.send(candidate) => {
                if sent.is_err() {
                    break;
                }
            }
        }
    }

    iterator.close().await;
    debug!(iterator = iterator.name(), "Iterator finished");
    let _ = done.send(index).await;
}

/// Take refresh requests one handshake at a time until the queue is closed
/// and drained.
async fn run_worker(
    queue: Arc<tokio::sync::Mutex<mpsc::Receiver<AddressRecord>>>,
    fetcher: Arc<dyn InfoFetcher>,
    state: Arc<RoundState>,
) {
    loop {
        let next = queue.lock().await.recv().await;
        let Some(record) = next else {
            break;
        };

        let id = record.id();
        let (info, too_many_peers) = match fetcher.fetch_client_info(&record).await {
            Ok(info) => {
                info!(
                    node_id = %id,
                    client_type = %info.client_type,
                    version = info.software_version,
                    network_id = info.network_id,
                    caps = %info.capabilities_label(),
                    "Updating node info"
                );
                (Some(info), false)
            }
            Err(e) if e.is_chain_mismatch() => {
                warn!(node_id = %id, error = %e, mismatch = true, "Handshake failed");
                (None, false)
            }
            Err(e) => {
                warn!(node_id = %id, step = ?e.step(), error = %e, "Handshake failed");
                (None, e.is_too_many_peers())
            }
        };

        state
            .registry
            .lock()
            .apply_handshake_outcome(&record, info, too_many_peers);
    }
}

async fn join_all(kind: &str, handles: Vec<JoinHandle<()>>) {
    for handle in handles {
        if let Err(e) = handle.await {
            warn!(task = kind, error = %e, "Round task failed");
        }
    }
}
