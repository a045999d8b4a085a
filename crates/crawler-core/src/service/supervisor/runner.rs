//! Supervisor loop.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use super::backoff::FlushBackoff;
use super::config::SupervisorConfig;
use crate::adapters::node_file;
use crate::domain::{sort_for_flush, CrawledNode, NodeSet, Timestamp};
use crate::ports::{DiscoveryError, DiscoveryProvider, NodeStore, TimeSource};
use crate::service::round::{RoundEngine, RoundError};

/// Why a round could not run.
#[derive(Debug, Error)]
pub enum SupervisorError {
    /// Discovery sources could not be opened
    #[error(transparent)]
    Discovery(#[from] DiscoveryError),
    /// Round engine refused to start
    #[error(transparent)]
    Round(#[from] RoundError),
}

/// What happened to the pending flush at the end of a round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    /// Rows were written and stale rows pruned
    Flushed {
        /// Rows written
        rows: usize,
        /// Stale rows removed
        pruned: usize,
    },
    /// A previous failure is still backing off
    Deferred {
        /// Earliest retry time
        until: Timestamp,
    },
    /// The store rejected the flush
    Failed {
        /// Wait before the next attempt
        retry_in: Duration,
    },
}

/// Result of one completed round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoundSummary {
    /// Nodes in the registry after the round
    pub nodes: usize,
    /// Nodes reporting a client string the version parser rejected
    pub unparsed_clients: usize,
    /// Persistence result
    pub flush: FlushOutcome,
}

/// Drives rounds until shutdown.
pub struct Supervisor {
    config: SupervisorConfig,
    engine: RoundEngine,
    discovery: Arc<dyn DiscoveryProvider>,
    store: Arc<dyn NodeStore>,
    time: Arc<dyn TimeSource>,
    nodes: NodeSet,
    pending: Option<Vec<CrawledNode>>,
    backoff: FlushBackoff,
    rounds: u64,
}

impl Supervisor {
    /// Create a supervisor whose first round is seeded with `nodes`.
    pub fn new(
        config: SupervisorConfig,
        engine: RoundEngine,
        discovery: Arc<dyn DiscoveryProvider>,
        store: Arc<dyn NodeStore>,
        time: Arc<dyn TimeSource>,
        nodes: NodeSet,
    ) -> Self {
        let backoff = FlushBackoff::new(config.flush_backoff_baseline, config.flush_backoff_max);
        Self {
            config,
            engine,
            discovery,
            store,
            time,
            nodes,
            pending: None,
            backoff,
            rounds: 0,
        }
    }

    /// Current node set
    pub fn nodes(&self) -> &NodeSet {
        &self.nodes
    }

    /// True while a failed flush waits for its retry
    pub fn has_pending_flush(&self) -> bool {
        self.pending.is_some()
    }

    /// Flush retry schedule
    pub fn backoff(&self) -> &FlushBackoff {
        &self.backoff
    }

    /// Run rounds until `shutdown` turns true, then make a last flush
    /// attempt and return the final node set.
    ///
    /// Shutdown is observed between rounds; a running round is finished.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> NodeSet {
        loop {
            if *shutdown.borrow() {
                break;
            }

            match self.run_round().await {
                Ok(summary) => {
                    debug!(round = self.rounds, flush = ?summary.flush, "Round persisted");
                }
                Err(e) => {
                    error!(error = %e, "Round could not start");
                    tokio::select! {
                        _ = shutdown.wait_for(|stop| *stop) => break,
                        () = tokio::time::sleep(self.config.discovery_retry_delay) => {}
                    }
                }
            }
        }

        if self.pending.is_some() {
            let now = self.time.now();
            self.flush_pending(now).await;
        }
        info!(nodes = self.nodes.len(), rounds = self.rounds, "Crawler stopped");
        self.nodes
    }

    /// Run one round and persist its snapshot.
    pub async fn run_round(&mut self) -> Result<RoundSummary, SupervisorError> {
        let sources = self.discovery.open_sources().await?;
        RoundEngine::check_sources(&sources)?;
        let input = std::mem::take(&mut self.nodes);
        self.nodes = self.engine.run(input, sources).await?;
        self.rounds += 1;

        let now = self.time.now();
        let mut rows: Vec<CrawledNode> = self
            .nodes
            .iter()
            .map(|node| CrawledNode::from_record(node, now))
            .collect();

        let mut unparsed_clients = 0;
        for row in rows.iter().filter(|row| row.has_unparsed_client()) {
            warn!(node_id = %row.id, client = %row.client_type, "Unparseable client version");
            unparsed_clients += 1;
        }

        sort_for_flush(&mut rows);
        self.pending = Some(rows);
        let flush = self.try_flush(now).await;

        self.write_node_file().await;

        info!(
            round = self.rounds,
            nodes = self.nodes.len(),
            unparsed_clients,
            "Round complete"
        );
        Ok(RoundSummary {
            nodes: self.nodes.len(),
            unparsed_clients,
            flush,
        })
    }

    /// Flush the pending snapshot unless a previous failure is backing off.
    async fn try_flush(&mut self, now: Timestamp) -> FlushOutcome {
        if !self.backoff.is_ready(now) {
            let until = self.backoff.next_attempt().unwrap_or(now);
            debug!(until = until.as_secs(), "Flush deferred");
            return FlushOutcome::Deferred { until };
        }
        self.flush_pending(now).await
    }

    async fn flush_pending(&mut self, now: Timestamp) -> FlushOutcome {
        let Some(rows) = self.pending.take() else {
            return FlushOutcome::Flushed { rows: 0, pruned: 0 };
        };

        if let Err(e) = self.store.upsert_nodes(&rows).await {
            let retry_in = self.backoff.record_failure(now);
            error!(
                error = %e,
                rows = rows.len(),
                failures = self.backoff.consecutive_failures(),
                retry_in_secs = retry_in.as_secs(),
                "Failed to persist nodes"
            );
            self.pending = Some(rows);
            return FlushOutcome::Failed { retry_in };
        }
        self.backoff.record_success();

        let cutoff = now.saturating_sub(self.config.drop_after);
        let pruned = match self.store.drop_older_than(cutoff).await {
            Ok(pruned) => pruned,
            Err(e) => {
                error!(error = %e, "Failed to drop stale nodes");
                0
            }
        };

        info!(rows = rows.len(), pruned, "Nodes persisted");
        FlushOutcome::Flushed {
            rows: rows.len(),
            pruned,
        }
    }

    async fn write_node_file(&self) {
        let Some(path) = &self.config.node_file else {
            return;
        };
        match node_file::write_node_file(path, &self.nodes).await {
            Ok(()) => debug!(path = %path.display(), nodes = self.nodes.len(), "Node file written"),
            Err(e) => error!(path = %path.display(), error = %e, "Failed to write node file"),
        }
    }
}
