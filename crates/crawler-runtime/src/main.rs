//! # Node Crawler
//!
//! Entry point for the crawler service. Loads the TOML configuration,
//! applies command-line overrides, seeds the registry from the node file and
//! runs discovery rounds until Ctrl-C or SIGTERM.
//!
//! ```text
//! node-crawler --config crawler.toml --node-file nodes.json --store crawled.jsonl
//! ```

mod config;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use crawler_core::adapters::{
    read_node_file_or_default, BootnodeDiscovery, JsonLinesStore, MemoryStore, ProbeResolver,
    SystemTimeSource, TcpChannelFactory,
};
use crawler_core::{HandshakeClient, NodeSet, NodeStore, RoundEngine, Supervisor};
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::CrawlerConfig;

/// Environment variable holding the log filter.
const LOG_ENV: &str = "CRAWLER_LOG";

#[derive(Parser, Debug)]
#[command(name = "node-crawler")]
#[command(about = "Crawls a devp2p network and records the client software of every reachable node")]
struct Args {
    /// Configuration file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Round deadline in seconds (0 = wait for discovery to finish)
    #[arg(short, long)]
    timeout: Option<u64>,

    /// Number of concurrent handshake workers
    #[arg(short, long)]
    workers: Option<usize>,

    /// Node file used as seed input and rewritten after every round
    #[arg(long)]
    node_file: Option<PathBuf>,

    /// JSON-lines file for crawled rows
    #[arg(long)]
    store: Option<PathBuf>,

    /// Bootnode enode URLs (repeatable)
    #[arg(long)]
    bootnodes: Vec<String>,

    /// Network id expected in peer status messages
    #[arg(long)]
    network_id: Option<u64>,

    /// Genesis hash expected in peer status messages (hex)
    #[arg(long)]
    genesis: Option<String>,

    /// Fixed secp256k1 node key (hex)
    #[arg(long)]
    node_key: Option<String>,

    /// Emit logs as JSON
    #[arg(long)]
    log_json: bool,
}

impl Args {
    fn apply(self, config: &mut CrawlerConfig) {
        if let Some(timeout) = self.timeout {
            config.crawler.timeout_secs = timeout;
        }
        if let Some(workers) = self.workers {
            config.crawler.workers = workers;
        }
        if self.node_file.is_some() {
            config.output.node_file = self.node_file;
        }
        if self.store.is_some() {
            config.output.store_path = self.store;
        }
        if !self.bootnodes.is_empty() {
            config.network.bootnodes = self.bootnodes;
        }
        if let Some(network_id) = self.network_id {
            config.chain.network_id = network_id;
        }
        if self.genesis.is_some() {
            config.chain.genesis_hash = self.genesis;
        }
        if self.node_key.is_some() {
            config.network.node_key = self.node_key;
        }
    }
}

fn init_logging(json: bool) -> Result<()> {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true);

    if json {
        builder
            .json()
            .try_init()
            .map_err(|e| anyhow::anyhow!("failed to install logger: {e}"))
    } else {
        builder
            .try_init()
            .map_err(|e| anyhow::anyhow!("failed to install logger: {e}"))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.log_json)?;

    let mut config = match &args.config {
        Some(path) => CrawlerConfig::load(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => CrawlerConfig::default(),
    };
    args.apply(&mut config);
    config.validate().context("invalid configuration")?;

    let chain = Arc::new(config.chain_identity()?);
    info!(
        network_id = chain.network_id,
        genesis = %hex::encode(chain.genesis_hash),
        protocol = %chain.protocol_name,
        "Starting node crawler"
    );

    let mut client = HandshakeClient::new(
        chain.clone(),
        Arc::new(TcpChannelFactory::new()),
        config.handshake_config(),
    );
    if let Some(key) = config.node_key()? {
        client = client.with_identity(key);
    }

    let time = Arc::new(SystemTimeSource::new());
    let engine = RoundEngine::new(config.round_config(), Arc::new(client), time.clone());

    let bootnodes = config.bootnodes()?;
    info!(count = bootnodes.len(), "Loaded bootnodes");
    let resolver = Arc::new(ProbeResolver::new(config.handshake_config().dial_timeout));
    let discovery = Arc::new(BootnodeDiscovery::new(bootnodes, resolver));

    let store: Arc<dyn NodeStore> = match &config.output.store_path {
        Some(path) => {
            info!(path = %path.display(), "Persisting crawled nodes");
            Arc::new(JsonLinesStore::new(path.clone()))
        }
        None => {
            warn!("No store configured, crawled rows are kept in memory only");
            Arc::new(MemoryStore::new())
        }
    };

    let seed = match &config.output.node_file {
        Some(path) => read_node_file_or_default(path)
            .with_context(|| format!("reading node file {}", path.display()))?,
        None => NodeSet::new(),
    };
    info!(nodes = seed.len(), "Seeded node registry");

    let supervisor = Supervisor::new(
        config.supervisor_config(),
        engine,
        discovery,
        store,
        time,
        seed,
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let crawler = tokio::spawn(supervisor.run(shutdown_rx));

    wait_for_signal().await?;
    info!("Shutdown signal received, finishing current round");
    let _ = shutdown_tx.send(true);

    let nodes = crawler.await.context("crawler task panicked")?;
    info!(nodes = nodes.len(), "Node crawler stopped");
    Ok(())
}

#[cfg(unix)]
async fn wait_for_signal() -> Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = signal(SignalKind::terminate()).context("installing SIGTERM handler")?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result.context("listening for Ctrl-C")?,
        _ = terminate.recv() => {}
    }
    Ok(())
}

#[cfg(not(unix))]
async fn wait_for_signal() -> Result<()> {
    tokio::signal::ctrl_c().await.context("listening for Ctrl-C")
}
