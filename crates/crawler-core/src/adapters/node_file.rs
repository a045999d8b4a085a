//! JSON node file: the round-zero input and the per-round output.
//!
//! The file is a JSON object keyed by hex node id:
//!
//! ```json
//! {
//!   "6f8a...": {
//!     "record": "enode://<pubkey>@10.0.0.1:5050",
//!     "seq": 3,
//!     "score": 12,
//!     "firstResponse": "2024-01-02T03:04:05Z",
//!     "lastResponse": "2024-01-02T05:04:05Z",
//!     "lastCheck": "2024-01-02T05:04:05Z",
//!     "tooManyPeers": false
//!   }
//! }
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;

use crate::domain::{
    AddressRecord, Capability, ClientInfo, NodeFileError, NodeRecord, NodeSet, RecordParseError,
    Timestamp,
};

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NodeEntry {
    record: String,
    #[serde(default)]
    seq: u64,
    score: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    first_response: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    last_response: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    last_check: Option<String>,
    #[serde(default)]
    too_many_peers: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    client_info: Option<ClientInfoEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ClientInfoEntry {
    client_type: String,
    software_version: u64,
    #[serde(default)]
    capabilities: Vec<CapabilityEntry>,
    #[serde(default)]
    network_id: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    head_hash: Option<String>,
    #[serde(default)]
    block_height: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct CapabilityEntry {
    name: String,
    version: u32,
}

/// Load a node file. Entries with a non-positive score are skipped.
pub fn read_node_file(path: &Path) -> Result<NodeSet, NodeFileError> {
    let content = fs::read_to_string(path)?;
    let entries: BTreeMap<String, NodeEntry> = serde_json::from_str(&content)?;

    let mut nodes = NodeSet::new();
    for (key, entry) in entries {
        if entry.score <= 0 {
            continue;
        }
        let node = decode_entry(entry).map_err(|source| NodeFileError::InvalidEntry {
            key: key.clone(),
            source,
        })?;
        nodes.insert(node);
    }
    Ok(nodes)
}

/// Load a node file if it exists, or start from an empty set.
pub fn read_node_file_or_default(path: &Path) -> Result<NodeSet, NodeFileError> {
    if path.exists() {
        read_node_file(path)
    } else {
        Ok(NodeSet::new())
    }
}

/// Write `nodes` to `path` through a temporary file and a rename, so that
/// readers never see a half-written file.
pub async fn write_node_file(path: &Path, nodes: &NodeSet) -> Result<(), NodeFileError> {
    let entries: BTreeMap<String, NodeEntry> = nodes
        .iter()
        .map(|node| (node.id().to_hex(), encode_entry(node)))
        .collect();
    let mut json = serde_json::to_vec_pretty(&entries)?;
    json.push(b'\n');

    let tmp = path.with_extension("json.tmp");
    let mut file = tokio::fs::File::create(&tmp).await?;
    file.write_all(&json).await?;
    file.sync_all().await?;
    drop(file);
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

fn encode_entry(node: &NodeRecord) -> NodeEntry {
    NodeEntry {
        record: node.record.to_enode(),
        seq: node.record.seq,
        score: node.score,
        first_response: node.first_response.map(format_time),
        last_response: node.last_response.map(format_time),
        last_check: node.last_check.map(format_time),
        too_many_peers: node.too_many_peers,
        client_info: node.client_info.as_ref().map(|info| ClientInfoEntry {
            client_type: info.client_type.clone(),
            software_version: info.software_version,
            capabilities: info
                .capabilities
                .iter()
                .map(|cap| CapabilityEntry {
                    name: cap.name.clone(),
                    version: cap.version,
                })
                .collect(),
            network_id: info.network_id,
            head_hash: info.head_hash.map(hex::encode),
            block_height: info.block_height.clone(),
        }),
    }
}

fn decode_entry(entry: NodeEntry) -> Result<NodeRecord, RecordParseError> {
    let mut record = AddressRecord::parse_enode(&entry.record)?;
    record.seq = entry.seq;

    let client_info = entry.client_info.map(decode_client_info).transpose()?;

    Ok(NodeRecord {
        record,
        score: entry.score,
        last_check: entry.last_check.as_deref().and_then(parse_time),
        first_response: entry.first_response.as_deref().and_then(parse_time),
        last_response: entry.last_response.as_deref().and_then(parse_time),
        too_many_peers: entry.too_many_peers,
        client_info,
    })
}

fn decode_client_info(entry: ClientInfoEntry) -> Result<ClientInfo, RecordParseError> {
    let head_hash = match entry.head_hash {
        Some(hash) => {
            let bytes = hex::decode(hash.trim_start_matches("0x"))
                .map_err(|_| RecordParseError::InvalidHex)?;
            let hash: [u8; 32] = bytes
                .try_into()
                .map_err(|_| RecordParseError::InvalidLength { expected: 32 })?;
            Some(hash)
        }
        None => None,
    };

    Ok(ClientInfo {
        client_type: entry.client_type,
        software_version: entry.software_version,
        capabilities: entry
            .capabilities
            .into_iter()
            .map(|cap| Capability::new(cap.name, cap.version))
            .collect(),
        network_id: entry.network_id,
        head_hash,
        block_height: entry.block_height,
    })
}

fn format_time(ts: Timestamp) -> String {
    DateTime::<Utc>::from_timestamp(ts.as_secs() as i64, 0)
        .unwrap_or_default()
        .to_rfc3339_opts(SecondsFormat::Secs, true)
}

// Unparseable times are dropped rather than failing the whole file.
fn parse_time(s: &str) -> Option<Timestamp> {
    let parsed = DateTime::parse_from_rfc3339(s).ok()?;
    u64::try_from(parsed.timestamp()).ok().map(Timestamp::new)
}
