//! Node registry implementation.

use std::collections::HashSet;

use super::config::RegistryConfig;
use super::policy::{CheckOutcome, HandshakeUpdate};
use crate::domain::{AddressRecord, ClientInfo, NodeId, NodeRecord, NodeSet, ResolveError, Timestamp};

/// Liveness-weighted registry of every node seen during a round
#[derive(Debug)]
pub struct NodeRegistry {
    /// Records by node id; never contains a record with `score <= 0`
    nodes: NodeSet,
    /// Nodes with a queued or running handshake refresh
    in_flight: HashSet<NodeId>,
    /// Configuration
    config: RegistryConfig,
}

impl NodeRegistry {
    /// Create an empty registry
    pub fn new(config: RegistryConfig) -> Self {
        Self::from_node_set(NodeSet::new(), config)
    }

    /// Seed the registry from a prior round's output.
    ///
    /// Records with a non-positive score are discarded so the eviction
    /// invariant holds from the start.
    pub fn from_node_set(set: NodeSet, config: RegistryConfig) -> Self {
        let nodes = set.into_iter().filter(|n| n.score > 0).collect();
        Self {
            nodes,
            in_flight: HashSet::new(),
            config,
        }
    }

    /// Registry configuration
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Look up a node
    pub fn get(&self, id: &NodeId) -> Option<&NodeRecord> {
        self.nodes.get(id)
    }

    /// Insert or replace a record; a non-positive score removes it instead
    pub fn upsert(&mut self, node: NodeRecord) {
        if node.score <= 0 {
            self.nodes.remove(&node.id());
        } else {
            self.nodes.insert(node);
        }
    }

    /// Number of stored nodes
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// True if no nodes are stored
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Number of nodes with a pending handshake refresh
    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    /// Copy of the current contents
    pub fn snapshot(&self) -> NodeSet {
        self.nodes.clone()
    }

    /// Consume the registry, returning its contents
    pub fn into_node_set(self) -> NodeSet {
        self.nodes
    }

    /// Revalidation gate: false if the node is known, not flagged as full,
    /// and was checked less than `revalidate_interval` ago.
    pub fn needs_check(&self, id: &NodeId, now: Timestamp) -> bool {
        match self.nodes.get(id) {
            Some(node) if !node.too_many_peers => match node.last_check {
                Some(last) => now.duration_since(last) >= self.config.revalidate_interval,
                None => true,
            },
            _ => true,
        }
    }

    /// Apply the result of an address-record refresh for `candidate`.
    pub fn apply_check_outcome(
        &mut self,
        candidate: &AddressRecord,
        refreshed: Result<AddressRecord, ResolveError>,
        now: Timestamp,
    ) -> CheckOutcome {
        let id = candidate.id();
        if !self.needs_check(&id, now) {
            return CheckOutcome::SkippedRecent;
        }

        let existed = self.nodes.contains(&id);
        let mut node = self
            .nodes
            .get(&id)
            .cloned()
            .unwrap_or_else(|| NodeRecord::new(candidate.clone()));
        node.last_check = Some(now);

        let mut added = false;
        match refreshed {
            Err(_) => {
                if node.score == 0 {
                    return CheckOutcome::SkippedIncompatible;
                }
                node.score /= 2;
            }
            Ok(record) => {
                if !existed || node.record.is_superseded_by(&record) {
                    node.record = record;
                }
                node.score += 1;
                if node.first_response.is_none() {
                    node.first_response = Some(now);
                    added = true;
                }
                node.last_response = Some(now);
            }
        }

        if node.score <= 0 {
            self.nodes.remove(&id);
            return CheckOutcome::Removed;
        }

        let record = node.record.clone();
        let score = node.score;
        self.nodes.insert(node);
        let refresh = self.in_flight.insert(id);
        CheckOutcome::Updated {
            record,
            score,
            added,
            refresh,
        }
    }

    /// Release an in-flight marker without applying a result, e.g. when the
    /// refresh queue is already closed.
    pub fn cancel_refresh(&mut self, id: &NodeId) {
        self.in_flight.remove(id);
    }

    /// Apply the result of a handshake refresh.
    ///
    /// The address bookkeeping and `too_many_peers` flag are always updated;
    /// the score bonus and client info only on success.
    pub fn apply_handshake_outcome(
        &mut self,
        record: &AddressRecord,
        info: Option<ClientInfo>,
        too_many_peers: bool,
    ) -> HandshakeUpdate {
        let id = record.id();
        self.in_flight.remove(&id);

        let bonus = self.config.handshake_bonus;
        let Some(node) = self.nodes.get_mut(&id) else {
            return HandshakeUpdate::Dropped;
        };

        if record.seq >= node.record.seq {
            node.record = record.clone();
        }
        node.too_many_peers = too_many_peers;
        if let Some(info) = info {
            node.score += bonus;
            node.client_info = Some(info);
        }
        HandshakeUpdate::Applied
    }
}
