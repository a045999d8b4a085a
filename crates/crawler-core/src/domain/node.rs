//! Per-node observation records and the node set exchanged between rounds.

use std::collections::HashMap;

use super::entities::{AddressRecord, Capability, NodeId, Timestamp};

/// Metadata learned from a completed handshake.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ClientInfo {
    /// Raw client identification string from the hello message
    pub client_type: String,
    /// Base protocol version the peer advertised
    pub software_version: u64,
    /// Capabilities the peer advertised
    pub capabilities: Vec<Capability>,
    /// Network id confirmed by the status exchange (0 if not reached)
    pub network_id: u64,
    /// Chain head hash, if known
    pub head_hash: Option<[u8; 32]>,
    /// Human readable block height label, if known
    pub block_height: String,
}

impl ClientInfo {
    /// Capabilities rendered as a comma-separated `name/version` list.
    pub fn capabilities_label(&self) -> String {
        self.capabilities
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Everything the crawler knows about one node identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeRecord {
    /// Latest address record; replaced wholesale when a newer seq is seen
    pub record: AddressRecord,
    /// Reputation counter; a record with `score <= 0` is evicted
    pub score: i64,
    /// Last liveness probe
    pub last_check: Option<Timestamp>,
    /// First successful liveness probe
    pub first_response: Option<Timestamp>,
    /// Most recent successful liveness probe
    pub last_response: Option<Timestamp>,
    /// Last handshake was rejected because the peer was full
    pub too_many_peers: bool,
    /// Handshake results, absent until one succeeds
    pub client_info: Option<ClientInfo>,
}

impl NodeRecord {
    /// A never-contacted record for `record`.
    pub fn new(record: AddressRecord) -> Self {
        Self {
            record,
            score: 0,
            last_check: None,
            first_response: None,
            last_response: None,
            too_many_peers: false,
            client_info: None,
        }
    }

    /// Stable identifier of the node.
    pub fn id(&self) -> NodeId {
        self.record.id()
    }

    /// Sequence number of the stored address record.
    pub fn seq(&self) -> u64 {
        self.record.seq
    }
}

/// Mapping from node id to its record. Iteration order is irrelevant.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeSet {
    nodes: HashMap<NodeId, NodeRecord>,
}

impl NodeSet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// True if the set holds no nodes.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Look up a node.
    pub fn get(&self, id: &NodeId) -> Option<&NodeRecord> {
        self.nodes.get(id)
    }

    /// Mutable lookup.
    pub fn get_mut(&mut self, id: &NodeId) -> Option<&mut NodeRecord> {
        self.nodes.get_mut(id)
    }

    /// Insert or replace a node keyed by its id.
    pub fn insert(&mut self, node: NodeRecord) -> Option<NodeRecord> {
        self.nodes.insert(node.id(), node)
    }

    /// Remove a node.
    pub fn remove(&mut self, id: &NodeId) -> Option<NodeRecord> {
        self.nodes.remove(id)
    }

    /// True if the id is present.
    pub fn contains(&self, id: &NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    /// Iterate over all records.
    pub fn iter(&self) -> impl Iterator<Item = &NodeRecord> {
        self.nodes.values()
    }

    /// Address records of every node, for replaying the set as a candidate source.
    pub fn address_records(&self) -> Vec<AddressRecord> {
        self.nodes.values().map(|n| n.record.clone()).collect()
    }

    /// Merge `other` into this set, keeping the entry with the newer record
    /// when both contain the same node.
    pub fn merge(&mut self, other: NodeSet) {
        for (id, node) in other.nodes {
            match self.nodes.get(&id) {
                Some(existing) if existing.seq() > node.seq() => {}
                _ => {
                    self.nodes.insert(id, node);
                }
            }
        }
    }
}

impl FromIterator<NodeRecord> for NodeSet {
    fn from_iter<I: IntoIterator<Item = NodeRecord>>(iter: I) -> Self {
        let mut set = NodeSet::new();
        for node in iter {
            set.insert(node);
        }
        set
    }
}

impl IntoIterator for NodeSet {
    type Item = NodeRecord;
    type IntoIter = std::collections::hash_map::IntoValues<NodeId, NodeRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.nodes.into_values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::PublicKey;

    fn record(byte: u8, seq: u64) -> AddressRecord {
        AddressRecord::new(
            seq,
            PublicKey::new([byte; 64]),
            "127.0.0.1".parse().unwrap(),
            30303,
        )
    }

    #[test]
    fn test_insert_is_keyed_by_record_id() {
        let mut set = NodeSet::new();
        set.insert(NodeRecord::new(record(1, 1)));
        set.insert(NodeRecord::new(record(1, 2)));
        set.insert(NodeRecord::new(record(2, 1)));

        assert_eq!(set.len(), 2);
        assert_eq!(set.get(&record(1, 0).id()).unwrap().seq(), 2);
    }

    #[test]
    fn test_merge_keeps_newer_record() {
        let mut a: NodeSet = [NodeRecord::new(record(1, 5))].into_iter().collect();
        let b: NodeSet = [NodeRecord::new(record(1, 3)), NodeRecord::new(record(2, 1))]
            .into_iter()
            .collect();

        a.merge(b);

        assert_eq!(a.len(), 2);
        assert_eq!(a.get(&record(1, 0).id()).unwrap().seq(), 5);
    }

    #[test]
    fn test_capabilities_label() {
        let info = ClientInfo {
            capabilities: vec![Capability::new("opera", 62), Capability::new("snap", 1)],
            ..ClientInfo::default()
        };
        assert_eq!(info.capabilities_label(), "opera/62, snap/1");
    }
}
