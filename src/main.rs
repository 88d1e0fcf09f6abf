//! Chain Gateway
//!
//! Gateway service in front of a Tendermint-style chain node. Its core is a
//! topology crawler that discovers, authenticates and classifies every
//! reachable peer of the local node.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      CHAIN GATEWAY                          │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Local Status Sync          ←── Polls the local node /status│
//! │  Topology Crawler           ←── BFS over the peer graph     │
//! │    └─ Handshake             ←── Proves claimed node ids     │
//! │  Registries                 ←── public/private/gw/snapshots │
//! │  HTTP API (8080)            ←── Topology, status, metrics   │
//! └─────────────────────────────────────────────────────────────┘
//! ```

use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

mod address;
mod api;
mod classify;
mod config;
mod crawler;
mod crypto;
mod handshake;
mod local;
mod probe;
mod registry;
mod snapshot;
mod types;

use api::{ApiState, Metrics};
use config::GatewayConfig;
use crawler::Crawler;
use handshake::LocalIdentity;
use local::LocalNode;
use probe::{HttpProbe, NetworkProbe};
use registry::Registries;

/// Chain Gateway - topology crawler and read-only API
#[derive(Parser, Debug)]
#[command(name = "chain-gateway")]
#[command(version)]
#[command(about = "Gateway and network topology crawler for Tendermint-style chains", long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "gateway.toml")]
    config: PathBuf,

    /// HTTP API port (overrides the config file)
    #[arg(long)]
    api_port: Option<u16>,

    /// RPC URL of the local chain node (overrides the config file)
    #[arg(long)]
    local_rpc: Option<String>,

    /// Path to the identity key file; an ephemeral key is used if omitted
    #[arg(long)]
    key_file: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Generate a new identity key and exit
    #[arg(long)]
    generate_key: bool,

    /// Write the effective configuration to the --config path and exit
    #[arg(long)]
    init_config: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| args.log_level.clone().into()),
        )
        .init();

    info!("🌐 Chain Gateway v{}", env!("CARGO_PKG_VERSION"));

    if args.generate_key {
        let path = args
            .key_file
            .clone()
            .unwrap_or_else(|| PathBuf::from("gateway.key"));
        return generate_key(&path).await;
    }

    // Load configuration
    let config = if args.config.exists() {
        GatewayConfig::load(&args.config)?
    } else {
        warn!("Config file {:?} not found, using defaults", args.config);
        GatewayConfig::default()
    };

    let config = config
        .with_api_port(args.api_port)
        .with_local_rpc_url(args.local_rpc);

    config.validate()?;

    if args.init_config {
        config.save(&args.config)?;
        info!("📝 Configuration written to {:?}", args.config);
        return Ok(());
    }

    info!("⚙️  Configuration:");
    info!("   Local RPC: {}", config.local_rpc_url);
    info!("   API port: {}", config.api_port);
    info!("   Crawl interval: {}s", config.crawl_interval_secs);
    info!("   Dial timeout: {}ms", config.dial_timeout_ms);
    info!("   Block diff limit: {}", config.block_diff_limit);

    let config = Arc::new(config);

    // Identity
    let keypair = crypto::load_or_ephemeral(args.key_file.as_deref()).await?;
    let identity = Arc::new(LocalIdentity::new(
        keypair,
        format!("tcp://0.0.0.0:{}", config.api_port),
        config.moniker.clone(),
    ));
    info!("📝 Gateway node id: {}", identity.node_id());

    // Shared state
    let local = Arc::new(LocalNode::new(config.local_rpc_url.clone()));
    let registries = Arc::new(Registries::new());
    let metrics = Arc::new(Metrics::new());
    let snapshot = snapshot::load_local_snapshot(config.snapshot_path.as_deref()).await;

    let probe: Arc<dyn NetworkProbe> =
        Arc::new(HttpProbe::new(&config, identity.clone(), local.clone())?);

    if !local.sync(probe.as_ref()).await {
        warn!("Local node not reachable yet, crawling starts once it answers");
    }

    let shutdown = CancellationToken::new();

    // Start all services concurrently
    let sync_handle = tokio::spawn(local::run_status_sync(
        probe.clone(),
        local.clone(),
        config.status_sync_interval(),
        shutdown.clone(),
    ));

    let crawler = Crawler::new(
        config.clone(),
        probe.clone(),
        local.clone(),
        registries.clone(),
        metrics.clone(),
    );
    let crawler_shutdown = shutdown.clone();
    let crawler_handle = tokio::spawn(async move { crawler.run(crawler_shutdown).await });

    let api_state = Arc::new(ApiState {
        config: config.clone(),
        node_id: identity.node_id().clone(),
        local: local.clone(),
        registries: registries.clone(),
        metrics: metrics.clone(),
        snapshot,
    });
    let api_handle = tokio::spawn(api::run_api_server(api_state, shutdown.clone()));

    info!("✅ All services started");
    info!("   Press Ctrl+C to shutdown gracefully");

    // Wait for shutdown signal
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("🛑 Shutdown signal received");
        }
        result = crawler_handle => {
            error!("Crawler exited: {:?}", result);
        }
        result = api_handle => {
            error!("HTTP API exited: {:?}", result);
        }
    }

    shutdown.cancel();
    let _ = sync_handle.await;

    info!("👋 Chain Gateway shutting down");
    Ok(())
}

/// Generate a new identity key
async fn generate_key(path: &Path) -> anyhow::Result<()> {
    let keypair = crypto::generate_keypair();
    crypto::save_keypair(&keypair, path).await?;

    info!("🔑 New identity key generated");
    info!("   Node id: {}", crypto::keypair_to_node_id(&keypair));
    info!("   Key saved to: {:?}", path);

    Ok(())
}
