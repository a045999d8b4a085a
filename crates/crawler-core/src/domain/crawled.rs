//! Per-round rows handed to the persistence collaborator.

use serde::Serialize;

use super::entities::Timestamp;
use super::node::NodeRecord;
use super::version::{parse_version_string, ParsedVersion};

/// Client type reported for full peers that never completed a handshake
pub const TOO_MANY_PEERS_CLIENT: &str = "tmp";

/// One persisted observation of a node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CrawledNode {
    /// Hex node id
    pub id: String,
    /// Observation time used for last-write-wins ordering
    pub observed_at: Timestamp,
    /// Raw client identification string
    pub client_type: String,
    /// Structured form of `client_type`, if it parsed
    pub parsed_version: Option<ParsedVersion>,
    /// Public key hex
    pub public_key: String,
    /// Base protocol version
    pub software_version: u64,
    /// Capabilities as `name/version, ...`
    pub capabilities: String,
    /// Network id from the status step
    pub network_id: u64,
    /// Block height label
    pub block_height: String,
    /// Head hash hex
    pub head_hash: String,
    /// Advertised IP
    pub ip: String,
    /// First successful probe
    pub first_seen: Option<Timestamp>,
    /// Last successful probe
    pub last_seen: Option<Timestamp>,
    /// Address record sequence number
    pub seq: u64,
    /// Registry score
    pub score: i64,
    /// `TCP` if a TCP port is advertised, else `UDP`
    pub conn_type: String,
}

impl CrawledNode {
    /// Build the row for `node`, observed no later than `now`.
    pub fn from_record(node: &NodeRecord, now: Timestamp) -> Self {
        let info = node.client_info.clone().unwrap_or_default();
        let client_type = if info.client_type.is_empty() && node.too_many_peers {
            TOO_MANY_PEERS_CLIENT.to_string()
        } else {
            info.client_type.clone()
        };
        let parsed_version = if info.client_type.is_empty() {
            None
        } else {
            parse_version_string(&info.client_type).ok()
        };
        let conn_type = if node.record.tcp_port != 0 { "TCP" } else { "UDP" };

        Self {
            id: node.id().to_hex(),
            observed_at: node.last_check.or(node.last_response).unwrap_or(now),
            client_type,
            parsed_version,
            public_key: node.record.public_key.to_hex(),
            software_version: info.software_version,
            capabilities: info.capabilities_label(),
            network_id: info.network_id,
            block_height: info.block_height.clone(),
            head_hash: info.head_hash.map(hex::encode).unwrap_or_default(),
            ip: node.record.ip.to_string(),
            first_seen: node.first_response,
            last_seen: node.last_response,
            seq: node.record.seq,
            score: node.score,
            conn_type: conn_type.to_string(),
        }
    }

    /// True if a client string was reported but could not be parsed.
    pub fn has_unparsed_client(&self) -> bool {
        self.parsed_version.is_none()
            && !self.client_type.is_empty()
            && self.client_type != TOO_MANY_PEERS_CLIENT
    }
}

/// Stable sort oldest-first so a last-write-wins upsert keeps the newest row.
pub fn sort_for_flush(rows: &mut [CrawledNode]) {
    rows.sort_by_key(|row| row.observed_at);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AddressRecord, ClientInfo, PublicKey};

    fn node(byte: u8) -> NodeRecord {
        let mut node = NodeRecord::new(AddressRecord::new(
            3,
            PublicKey::new([byte; 64]),
            "192.168.0.9".parse().unwrap(),
            5050,
        ));
        node.score = 4;
        node.last_check = Some(Timestamp::new(100));
        node
    }

    #[test]
    fn test_full_peer_without_info_reports_tmp() {
        let mut n = node(1);
        n.too_many_peers = true;

        let row = CrawledNode::from_record(&n, Timestamp::new(200));

        assert_eq!(row.client_type, TOO_MANY_PEERS_CLIENT);
        assert!(row.parsed_version.is_none());
        assert!(!row.has_unparsed_client());
        assert_eq!(row.observed_at, Timestamp::new(100));
        assert_eq!(row.conn_type, "TCP");
    }

    #[test]
    fn test_row_carries_parsed_version() {
        let mut n = node(2);
        n.client_info = Some(ClientInfo {
            client_type: "go-opera/v1.1.2-rc.6/linux-amd64/go1.19.3".into(),
            software_version: 5,
            head_hash: Some([0xaa; 32]),
            ..ClientInfo::default()
        });

        let row = CrawledNode::from_record(&n, Timestamp::new(200));

        assert_eq!(row.parsed_version.unwrap().name, "go-opera");
        assert_eq!(row.head_hash, "aa".repeat(32));
        assert_eq!(row.software_version, 5);
    }

    #[test]
    fn test_unparseable_client_is_kept_raw() {
        let mut n = node(3);
        n.client_info = Some(ClientInfo {
            client_type: "geth/v0.0.0/linux-amd64/go1.20".into(),
            ..ClientInfo::default()
        });

        let row = CrawledNode::from_record(&n, Timestamp::new(200));

        assert_eq!(row.client_type, "geth/v0.0.0/linux-amd64/go1.20");
        assert!(row.has_unparsed_client());
    }

    #[test]
    fn test_sort_for_flush_is_stable_oldest_first() {
        let now = Timestamp::new(500);
        let mut newer = CrawledNode::from_record(&node(1), now);
        newer.observed_at = Timestamp::new(300);
        newer.score = 9;
        let mut older = newer.clone();
        older.observed_at = Timestamp::new(100);
        older.score = 1;
        let mut tie = newer.clone();
        tie.score = 10;

        let mut rows = vec![newer.clone(), older.clone(), tie.clone()];
        sort_for_flush(&mut rows);

        assert_eq!(rows, vec![older, newer, tie]);
    }
}
