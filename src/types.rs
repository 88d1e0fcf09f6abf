//! Core types for the gateway and its topology crawler
//!
//! Registry records (what the crawler publishes) and probe results (what the
//! network tells us) live here. Records serialize to the JSON served by the
//! topology endpoints.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::net::IpAddr;

/// Node identity string: lowercase hex of the first 20 bytes of
/// SHA-256(ed25519 public key)
pub type NodeId = String;

/// Block height as reported by Tendermint-style RPC
pub type BlockHeight = i64;

// =============================================================================
// REGISTRY RECORDS
// =============================================================================

/// A chain node reachable on a public IP
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublicNode {
    pub id: NodeId,
    pub ip: IpAddr,
    /// P2P port the handshake succeeded on
    pub port: u16,
    /// Ids of the peers this node reported
    pub peers: BTreeSet<NodeId>,
    pub alive: bool,
    pub synced: bool,
    pub safe: bool,
    pub block_height: BlockHeight,
    /// Local height minus this node's height
    pub block_diff: i64,
    pub ping_ms: u64,
    /// Validator/wallet address exposed in the node's status, if any
    pub wallet_address: Option<String>,
    /// RPC endpoint that answered the status probe
    pub rpc_address: Option<String>,
    pub country: String,
    pub isp: String,
    /// Direct peer of the local node
    pub connected: bool,
    pub peers_count: usize,
    pub moniker: String,
    pub version: String,
    pub last_seen: i64,
}

/// A peer on a private/loopback address, known only through the public
/// node that reported it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrivateNode {
    pub id: NodeId,
    pub ip: IpAddr,
    pub port: u16,
    /// Ids of the nodes that reported this peer during the pass
    pub peers: BTreeSet<NodeId>,
    /// Node that vouched for this peer
    pub discovered_by: NodeId,
    pub alive: bool,
    pub synced: bool,
    pub safe: bool,
    pub block_height: BlockHeight,
    pub block_diff: i64,
    pub connected: bool,
    pub peers_count: usize,
    pub last_seen: i64,
}

/// A companion gateway instance running next to a chain node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayNode {
    /// The gateway's own reported id
    pub id: NodeId,
    pub ip: IpAddr,
    pub port: u16,
    /// Authenticated chain node on the same host
    pub chain_node_id: NodeId,
    pub moniker: String,
    pub faucet_address: String,
    pub node_type: String,
    pub version: String,
    pub app_version: String,
    pub alive: bool,
    pub synced: bool,
    pub safe: bool,
    pub block_height: BlockHeight,
    pub block_diff: i64,
    pub ping_ms: u64,
    pub country: String,
    pub isp: String,
    pub last_seen: i64,
}

/// A node serving a downloadable chain-state snapshot, keyed by IP
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotNode {
    pub ip: IpAddr,
    pub port: u16,
    pub checksum: String,
    pub size: u64,
    pub alive: bool,
    pub synced: bool,
    pub block_height: BlockHeight,
    pub last_seen: i64,
}

/// Point-in-time copy of a registry handed to readers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryView<T> {
    pub nodes: Vec<T>,
    /// Unix timestamp of the last completed pass (0 if none yet)
    pub last_update: i64,
    /// A pass is in progress; data may be mid-update
    pub scanning: bool,
}

// =============================================================================
// PROBE RESULTS
// =============================================================================

/// Chain status reported by a node's RPC `/status`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainStatus {
    pub node_id: NodeId,
    pub chain_id: String,
    pub listen_addr: String,
    pub latest_block_height: BlockHeight,
    pub latest_block_time: Option<DateTime<Utc>>,
    pub wallet_address: Option<String>,
    pub moniker: String,
    pub version: String,
    pub protocol_version: ProtocolVersion,
    /// RPC URL that produced this status
    pub rpc_url: String,
}

/// P2P, block and app protocol versions a node advertises
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolVersion {
    pub p2p: u64,
    pub block: u64,
    pub app: u64,
}

/// A peer entry from a node's RPC `/net_info`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainPeer {
    pub node_id: NodeId,
    pub remote_ip: String,
    pub listen_addr: String,
}

/// Status document served by a gateway at `/status`
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GatewayStatus {
    pub id: NodeId,
    #[serde(default)]
    pub moniker: String,
    #[serde(default)]
    pub faucet_address: String,
    #[serde(default)]
    pub node_type: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub app_version: String,
    #[serde(default)]
    pub latest_block_height: BlockHeight,
}

/// Snapshot metadata served at `/snapshot/info`. A zero size means no
/// snapshot is available.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SnapshotInfo {
    #[serde(default)]
    pub checksum: String,
    #[serde(default)]
    pub size: u64,
}

impl SnapshotInfo {
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }
}

/// Geo-IP metadata. Empty strings when unknown.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GeoInfo {
    pub country_code: String,
    pub isp: String,
}

/// A block as seen from one node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockRef {
    pub height: BlockHeight,
    pub hash: String,
    pub chain_id: String,
}

/// Timings of a successful handshake
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct HandshakeReport {
    pub connect_ms: u64,
    pub channel_ms: u64,
    pub exchange_ms: u64,
}

// =============================================================================
// LOCAL NODE
// =============================================================================

/// Latest known state of the local chain node
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LocalChainState {
    pub node_id: NodeId,
    pub chain_id: String,
    pub latest_block_height: BlockHeight,
    pub latest_block_time: Option<DateTime<Utc>>,
    /// Software version the local node reports
    pub version: String,
    /// Echoed in the node info the crawler advertises during handshakes
    pub protocol_version: ProtocolVersion,
    pub rpc_url: String,
    /// Unix timestamp of the last successful sync
    pub updated_at: i64,
}

impl LocalChainState {
    /// The crawler needs at least a chain id to classify candidates
    pub fn is_ready(&self) -> bool {
        !self.chain_id.is_empty()
    }
}

/// Current Unix timestamp in seconds
pub fn unix_now() -> i64 {
    Utc::now().timestamp()
}
