//! # Crawler Configuration
//!
//! TOML configuration file, every section optional:
//!
//! ```toml
//! [crawler]
//! timeout_secs = 300
//! workers = 16
//!
//! [network]
//! listen_addr = "0.0.0.0:0"
//! bootnodes = ["enode://<pubkey>@34.242.220.16:5050"]
//!
//! [chain]
//! network_id = 250
//! genesis_hash = "0x..."
//!
//! [output]
//! node_file = "nodes.json"
//! store_path = "crawled.jsonl"
//! ```

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crawler_core::adapters::bootnodes::{parse_bootnodes, MAINNET_BOOTNODES};
use crawler_core::protocol::{SessionKey, SessionKeyError};
use crawler_core::{
    AddressRecord, ChainIdentity, ChainProgress, HandshakeConfig, RecordParseError,
    RegistryConfig, RoundConfig, SupervisorConfig,
};
use serde::Deserialize;
use thiserror::Error;

/// Configuration errors. All of them abort startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("cannot read config file {path}: {source}")]
    Io {
        /// File path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },
    /// Config file is not valid TOML for this schema
    #[error("invalid config file: {0}")]
    Parse(#[from] toml::de::Error),
    /// Worker pool would be empty
    #[error("crawler.workers must be at least 1")]
    ZeroWorkers,
    /// A queue would have no capacity
    #[error("crawler.{0} must be at least 1")]
    ZeroCapacity(&'static str),
    /// Listen address does not parse
    #[error("invalid network.listen_addr {0:?}")]
    InvalidListenAddr(String),
    /// Genesis hash not configured
    #[error("chain.genesis_hash is required")]
    MissingGenesis,
    /// Hash is not 32 hex bytes
    #[error("chain.{field} must be 32 hex-encoded bytes")]
    InvalidHash {
        /// Offending field
        field: &'static str,
    },
    /// No application protocol versions
    #[error("chain.protocol_versions must not be empty")]
    NoProtocolVersions,
    /// Node key is malformed
    #[error("invalid network.node_key: {0}")]
    InvalidNodeKey(#[from] SessionKeyError),
    /// A bootnode URL does not parse
    #[error("invalid bootnode: {0}")]
    InvalidBootnode(#[from] RecordParseError),
}

/// Complete crawler configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CrawlerConfig {
    /// Round parameters
    pub crawler: CrawlerSection,
    /// Discovery and identity
    pub network: NetworkSection,
    /// Chain identity checked in the status step
    pub chain: ChainSection,
    /// Handshake deadlines
    pub timeouts: TimeoutSection,
    /// Node file and persistence
    pub output: OutputSection,
}

/// `[crawler]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CrawlerSection {
    /// Round deadline after the input set is revalidated (0 disables it)
    pub timeout_secs: u64,
    /// Handshake worker pool size
    pub workers: usize,
    /// Minimum time between two probes of a healthy node
    pub revalidate_interval_secs: u64,
    /// Handshake refresh queue capacity
    pub refresh_queue_capacity: usize,
    /// Candidate intake queue capacity
    pub intake_queue_capacity: usize,
}

impl Default for CrawlerSection {
    fn default() -> Self {
        let round = RoundConfig::default();
        Self {
            timeout_secs: round.timeout.as_secs(),
            workers: round.workers,
            revalidate_interval_secs: round.registry.revalidate_interval.as_secs(),
            refresh_queue_capacity: round.refresh_queue_capacity,
            intake_queue_capacity: round.intake_queue_capacity,
        }
    }
}

/// `[network]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NetworkSection {
    /// Local listen address; its port is advertised in hello messages
    pub listen_addr: String,
    /// Bootnode enode URLs; empty means the built-in mainnet list
    pub bootnodes: Vec<String>,
    /// Hex secp256k1 secret key; random per dial if absent
    pub node_key: Option<String>,
}

impl Default for NetworkSection {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:0".to_string(),
            bootnodes: Vec::new(),
            node_key: None,
        }
    }
}

/// `[chain]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ChainSection {
    /// Network id
    pub network_id: u64,
    /// Genesis hash, hex
    pub genesis_hash: Option<String>,
    /// Application protocol name
    pub protocol_name: String,
    /// Supported application protocol versions
    pub protocol_versions: Vec<u32>,
    /// Progress advertised to peers
    pub progress: ProgressSection,
}

impl Default for ChainSection {
    fn default() -> Self {
        Self {
            network_id: 250,
            genesis_hash: None,
            protocol_name: "opera".to_string(),
            protocol_versions: vec![62, 63],
            progress: ProgressSection::default(),
        }
    }
}

/// `[chain.progress]` section.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProgressSection {
    /// Epoch
    pub epoch: u32,
    /// Last block index
    pub last_block: u64,
    /// Checkpoint hash, hex (zero if absent)
    pub checkpoint_hash: Option<String>,
}

/// `[timeouts]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TimeoutSection {
    /// TCP dial deadline
    pub dial_secs: u64,
    /// Encryption handshake and hello deadline
    pub handshake_secs: u64,
    /// Status and progress deadline
    pub status_secs: u64,
}

impl Default for TimeoutSection {
    fn default() -> Self {
        let handshake = HandshakeConfig::default();
        Self {
            dial_secs: handshake.dial_timeout.as_secs(),
            handshake_secs: handshake.handshake_timeout.as_secs(),
            status_secs: handshake.status_timeout.as_secs(),
        }
    }
}

/// `[output]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OutputSection {
    /// Seed input and per-round output node file
    pub node_file: Option<PathBuf>,
    /// JSON-lines persistence target; in-memory if absent
    pub store_path: Option<PathBuf>,
    /// Stored rows older than this are pruned
    pub drop_after_secs: u64,
}

impl Default for OutputSection {
    fn default() -> Self {
        Self {
            node_file: None,
            store_path: None,
            drop_after_secs: SupervisorConfig::default().drop_after.as_secs(),
        }
    }
}

impl CrawlerConfig {
    /// Load from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Parse TOML text.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Check every value that startup depends on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.crawler.workers == 0 {
            return Err(ConfigError::ZeroWorkers);
        }
        if self.crawler.refresh_queue_capacity == 0 {
            return Err(ConfigError::ZeroCapacity("refresh_queue_capacity"));
        }
        if self.crawler.intake_queue_capacity == 0 {
            return Err(ConfigError::ZeroCapacity("intake_queue_capacity"));
        }
        self.listen_addr()?;
        self.chain_identity()?;
        self.node_key()?;
        self.bootnodes()?;
        Ok(())
    }

    /// Parsed listen address.
    pub fn listen_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.network
            .listen_addr
            .parse()
            .map_err(|_| ConfigError::InvalidListenAddr(self.network.listen_addr.clone()))
    }

    /// Immutable chain identity for the handshake client.
    pub fn chain_identity(&self) -> Result<ChainIdentity, ConfigError> {
        let chain = &self.chain;
        let genesis = chain
            .genesis_hash
            .as_deref()
            .ok_or(ConfigError::MissingGenesis)?;
        if chain.protocol_versions.is_empty() {
            return Err(ConfigError::NoProtocolVersions);
        }
        let checkpoint = match chain.progress.checkpoint_hash.as_deref() {
            Some(hash) => parse_hash(hash, "progress.checkpoint_hash")?,
            None => [0u8; 32],
        };

        Ok(ChainIdentity::new(
            chain.network_id,
            parse_hash(genesis, "genesis_hash")?,
            chain.protocol_name.clone(),
            chain.protocol_versions.clone(),
            ChainProgress {
                epoch: chain.progress.epoch,
                last_block: chain.progress.last_block,
                checkpoint,
            },
        ))
    }

    /// Fixed node key, if configured.
    pub fn node_key(&self) -> Result<Option<SessionKey>, ConfigError> {
        Ok(self
            .network
            .node_key
            .as_deref()
            .map(SessionKey::from_hex)
            .transpose()?)
    }

    /// Configured bootnodes, or the mainnet list.
    pub fn bootnodes(&self) -> Result<Vec<AddressRecord>, ConfigError> {
        if self.network.bootnodes.is_empty() {
            Ok(parse_bootnodes(MAINNET_BOOTNODES)?)
        } else {
            Ok(parse_bootnodes(self.network.bootnodes.as_slice())?)
        }
    }

    /// Round engine configuration.
    pub fn round_config(&self) -> RoundConfig {
        RoundConfig {
            workers: self.crawler.workers,
            timeout: Duration::from_secs(self.crawler.timeout_secs),
            refresh_queue_capacity: self.crawler.refresh_queue_capacity,
            intake_queue_capacity: self.crawler.intake_queue_capacity,
            registry: RegistryConfig {
                revalidate_interval: Duration::from_secs(self.crawler.revalidate_interval_secs),
                ..RegistryConfig::default()
            },
            ..RoundConfig::default()
        }
    }

    /// Handshake client configuration.
    pub fn handshake_config(&self) -> HandshakeConfig {
        HandshakeConfig {
            dial_timeout: Duration::from_secs(self.timeouts.dial_secs),
            handshake_timeout: Duration::from_secs(self.timeouts.handshake_secs),
            status_timeout: Duration::from_secs(self.timeouts.status_secs),
            listen_port: self.listen_addr().map(|a| a.port()).unwrap_or_default(),
            ..HandshakeConfig::default()
        }
    }

    /// Supervisor configuration.
    pub fn supervisor_config(&self) -> SupervisorConfig {
        SupervisorConfig {
            drop_after: Duration::from_secs(self.output.drop_after_secs),
            node_file: self.output.node_file.clone(),
            ..SupervisorConfig::default()
        }
    }
}

fn parse_hash(s: &str, field: &'static str) -> Result<[u8; 32], ConfigError> {
    let bytes = hex::decode(s.trim().trim_start_matches("0x"))
        .map_err(|_| ConfigError::InvalidHash { field })?;
    bytes
        .try_into()
        .map_err(|_| ConfigError::InvalidHash { field })
}

#[cfg(test)]
mod tests {
    use super::*;

    const GENESIS: &str = "0x4a53c5445584b3bfc20dbfb2ec18ae20037c716f3ba2d9e1da768a9deca17cb4";

    fn minimal() -> CrawlerConfig {
        CrawlerConfig::from_toml(&format!("[chain]\ngenesis_hash = \"{GENESIS}\"\n")).unwrap()
    }

    #[test]
    fn test_defaults_are_valid_with_genesis() {
        let config = minimal();

        config.validate().unwrap();
        assert_eq!(config.crawler.workers, 16);
        assert_eq!(config.round_config().timeout, Duration::from_secs(300));
        assert_eq!(config.bootnodes().unwrap().len(), MAINNET_BOOTNODES.len());
        assert!(config.node_key().unwrap().is_none());
    }

    #[test]
    fn test_missing_genesis_is_fatal() {
        let err = CrawlerConfig::default().validate().unwrap_err();

        assert!(matches!(err, ConfigError::MissingGenesis));
    }

    #[test]
    fn test_full_file_overrides() {
        let config = CrawlerConfig::from_toml(&format!(
            r#"
            [crawler]
            timeout_secs = 0
            workers = 4
            revalidate_interval_secs = 120

            [network]
            listen_addr = "0.0.0.0:30303"
            bootnodes = ["enode://{key}@10.0.0.1:5050?discport=5051"]

            [chain]
            network_id = 4002
            genesis_hash = "{GENESIS}"
            protocol_versions = [63]

            [chain.progress]
            epoch = 12
            last_block = 3400

            [output]
            node_file = "nodes.json"
            "#,
            key = "11".repeat(64),
        ))
        .unwrap();

        config.validate().unwrap();
        let round = config.round_config();
        assert_eq!(round.workers, 4);
        assert!(round.timeout.is_zero());
        assert_eq!(round.registry.revalidate_interval, Duration::from_secs(120));
        assert_eq!(config.handshake_config().listen_port, 30303);
        let chain = config.chain_identity().unwrap();
        assert_eq!(chain.network_id, 4002);
        assert_eq!(chain.protocol_versions, vec![63]);
        assert_eq!(chain.progress.last_block, 3400);
        let bootnodes = config.bootnodes().unwrap();
        assert_eq!(bootnodes[0].udp_port, 5051);
        assert_eq!(
            config.supervisor_config().node_file,
            Some(PathBuf::from("nodes.json"))
        );
    }

    #[test]
    fn test_zero_workers_rejected() {
        let mut config = minimal();
        config.crawler.workers = 0;

        assert!(matches!(config.validate(), Err(ConfigError::ZeroWorkers)));
    }

    #[test]
    fn test_bad_values_rejected() {
        let mut config = minimal();
        config.chain.genesis_hash = Some("abcd".into());
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidHash { field: "genesis_hash" })
        ));

        let mut config = minimal();
        config.network.node_key = Some("zz".into());
        assert!(matches!(config.validate(), Err(ConfigError::InvalidNodeKey(_))));

        let mut config = minimal();
        config.network.bootnodes = vec!["enode://00@1.2.3.4:1".into()];
        assert!(matches!(config.validate(), Err(ConfigError::InvalidBootnode(_))));

        let mut config = minimal();
        config.network.listen_addr = "nowhere".into();
        assert!(matches!(config.validate(), Err(ConfigError::InvalidListenAddr(_))));
    }

    #[test]
    fn test_unknown_keys_rejected() {
        assert!(CrawlerConfig::from_toml("[crawler]\nthreads = 3\n").is_err());
    }

    #[test]
    fn test_load_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.toml");

        let err = CrawlerConfig::load(&path).unwrap_err();

        assert!(err.to_string().contains("missing.toml"));
    }
}
