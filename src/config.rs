//! Gateway Configuration
//!
//! Configurable parameters for the gateway and its topology crawler.
//! Every magic number the crawler uses (ports, limits, timeouts) lives here
//! so tests can run it with small, fast values.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// URL scheme used when probing a chain RPC port
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scheme {
    Http,
    Https,
}

impl Scheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scheme::Http => "http",
            Scheme::Https => "https",
        }
    }
}

/// One candidate (scheme, port) pair for the chain RPC probes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeTarget {
    pub scheme: Scheme,
    pub port: u16,
}

impl ProbeTarget {
    pub const fn http(port: u16) -> Self {
        Self { scheme: Scheme::Http, port }
    }

    #[cfg(test)]
    pub const fn https(port: u16) -> Self {
        Self { scheme: Scheme::Https, port }
    }
}

/// Main configuration for the gateway
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    // === Local node ===

    /// RPC URL of the chain node this gateway fronts
    pub local_rpc_url: String,

    // === Network ===

    /// Port for the HTTP API
    pub api_port: u16,

    /// Port companion gateways are probed on
    pub gateway_port: u16,

    /// Port snapshot metadata is probed on
    pub snapshot_port: u16,

    /// P2P port assumed when a node's listen address has none
    pub default_p2p_port: u16,

    /// Ordered (scheme, port) candidates for chain RPC probes.
    ///
    /// Probes dial bare IPs, so an https target only answers if the node
    /// serves a certificate valid for its IP address.
    pub chain_probe_targets: Vec<ProbeTarget>,

    // === Crawler ===

    /// Maximum height difference for a node to count as synced
    pub block_diff_limit: i64,

    /// Timeout for every probe and handshake phase (milliseconds)
    pub dial_timeout_ms: u64,

    /// Sleep between crawl passes (seconds)
    pub crawl_interval_secs: u64,

    /// Interval for refreshing the local chain state (seconds)
    pub status_sync_interval_secs: u64,

    /// ip-api style geo lookup endpoint; `None` disables geo probes
    pub geoip_url: Option<String>,

    // === Identity served to companion gateways ===

    pub moniker: String,
    pub faucet_address: String,
    pub node_type: String,

    /// Snapshot file advertised at /snapshot/info
    pub snapshot_path: Option<PathBuf>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            local_rpc_url: "http://127.0.0.1:26657".to_string(),

            // Network
            api_port: 8080,
            gateway_port: 8080,  // Companions run the same service
            snapshot_port: 8080,
            default_p2p_port: 26656,
            chain_probe_targets: vec![
                ProbeTarget::http(26657),
                ProbeTarget::http(36657),
                ProbeTarget::http(80),
            ],

            // Crawler
            block_diff_limit: 20,
            dial_timeout_ms: 3000,
            crawl_interval_secs: 10,
            status_sync_interval_secs: 5,
            geoip_url: Some("http://ip-api.com/json".to_string()),

            // Identity
            moniker: "chain-gateway".to_string(),
            faucet_address: String::new(),
            node_type: "gateway".to_string(),
            snapshot_path: None,
        }
    }
}

impl GatewayConfig {
    /// Load configuration from TOML file
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    // Builder-style methods for CLI overrides

    pub fn with_api_port(mut self, port: Option<u16>) -> Self {
        if let Some(port) = port {
            self.api_port = port;
        }
        self
    }

    pub fn with_local_rpc_url(mut self, url: Option<String>) -> Self {
        if let Some(url) = url {
            self.local_rpc_url = url;
        }
        self
    }

    pub fn dial_timeout(&self) -> Duration {
        Duration::from_millis(self.dial_timeout_ms)
    }

    pub fn crawl_interval(&self) -> Duration {
        Duration::from_secs(self.crawl_interval_secs)
    }

    pub fn status_sync_interval(&self) -> Duration {
        Duration::from_secs(self.status_sync_interval_secs)
    }

    /// Validate configuration values
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.chain_probe_targets.is_empty() {
            anyhow::bail!("chain_probe_targets must list at least one (scheme, port) pair");
        }

        if self.dial_timeout_ms == 0 {
            anyhow::bail!("dial_timeout_ms must be greater than zero");
        }

        if self.crawl_interval_secs == 0 || self.status_sync_interval_secs == 0 {
            anyhow::bail!(
                "crawl_interval_secs ({}) and status_sync_interval_secs ({}) must be greater than zero",
                self.crawl_interval_secs,
                self.status_sync_interval_secs
            );
        }

        if self.block_diff_limit < 0 {
            anyhow::bail!("block_diff_limit ({}) must not be negative", self.block_diff_limit);
        }

        if !(self.local_rpc_url.starts_with("http://") || self.local_rpc_url.starts_with("https://")) {
            anyhow::bail!("local_rpc_url ({}) must be an http(s) URL", self.local_rpc_url);
        }

        Ok(())
    }
}
