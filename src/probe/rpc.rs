//! Tendermint-style RPC response shapes
//!
//! Only the fields the crawler reads are modelled. Heights arrive as
//! strings from Tendermint and as integers from some proxies; both decode.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer};

use crate::types::{BlockHeight, BlockRef, ChainPeer, ChainStatus, ProtocolVersion};

/// JSON-RPC wrapper around every response
#[derive(Debug, Deserialize)]
pub struct RpcEnvelope<T> {
    pub result: Option<T>,
    pub error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
pub struct RpcErrorBody {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub data: String,
}

impl RpcErrorBody {
    pub fn describe(&self) -> String {
        if self.data.is_empty() {
            self.message.clone()
        } else {
            format!("{}: {}", self.message, self.data)
        }
    }
}

fn height<'de, D>(deserializer: D) -> Result<BlockHeight, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Int(i64),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Int(h) => Ok(h),
        Raw::Text(s) => s.parse().map_err(serde::de::Error::custom),
    }
}

/// Tendermint encodes uint64 fields as JSON strings
fn uint<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Int(u64),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Int(v) => Ok(v),
        Raw::Text(s) => s.parse().map_err(serde::de::Error::custom),
    }
}

// =============================================================================
// /status
// =============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct RpcProtocolVersion {
    #[serde(default, deserialize_with = "uint")]
    pub p2p: u64,
    #[serde(default, deserialize_with = "uint")]
    pub block: u64,
    #[serde(default, deserialize_with = "uint")]
    pub app: u64,
}

impl From<RpcProtocolVersion> for ProtocolVersion {
    fn from(raw: RpcProtocolVersion) -> Self {
        ProtocolVersion {
            p2p: raw.p2p,
            block: raw.block,
            app: raw.app,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct NodeInfo {
    #[serde(default)]
    pub protocol_version: RpcProtocolVersion,
    pub id: String,
    #[serde(default)]
    pub listen_addr: String,
    #[serde(default)]
    pub network: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub moniker: String,
}

#[derive(Debug, Deserialize)]
pub struct SyncInfo {
    #[serde(deserialize_with = "height")]
    pub latest_block_height: BlockHeight,
    #[serde(default)]
    pub latest_block_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ValidatorInfo {
    #[serde(default)]
    pub address: String,
}

#[derive(Debug, Deserialize)]
pub struct StatusResult {
    pub node_info: NodeInfo,
    pub sync_info: SyncInfo,
    #[serde(default)]
    pub validator_info: ValidatorInfo,
}

impl StatusResult {
    pub fn into_status(self, rpc_url: String) -> ChainStatus {
        let wallet_address = Some(self.validator_info.address).filter(|a| !a.is_empty());

        ChainStatus {
            node_id: self.node_info.id,
            chain_id: self.node_info.network,
            listen_addr: self.node_info.listen_addr,
            latest_block_height: self.sync_info.latest_block_height,
            latest_block_time: self.sync_info.latest_block_time,
            wallet_address,
            moniker: self.node_info.moniker,
            version: self.node_info.version,
            protocol_version: self.node_info.protocol_version.into(),
            rpc_url,
        }
    }
}

// =============================================================================
// /net_info
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct NetInfoPeer {
    pub node_info: NodeInfo,
    #[serde(default)]
    pub remote_ip: String,
}

#[derive(Debug, Deserialize)]
pub struct NetInfoResult {
    #[serde(default)]
    pub peers: Vec<NetInfoPeer>,
}

impl NetInfoResult {
    pub fn into_peers(self) -> Vec<ChainPeer> {
        self.peers
            .into_iter()
            .map(|peer| ChainPeer {
                node_id: peer.node_info.id,
                remote_ip: peer.remote_ip,
                listen_addr: peer.node_info.listen_addr,
            })
            .collect()
    }
}

// =============================================================================
// /block?height=
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct BlockId {
    pub hash: String,
}

#[derive(Debug, Deserialize)]
pub struct BlockHeader {
    pub chain_id: String,
    #[serde(deserialize_with = "height")]
    pub height: BlockHeight,
}

#[derive(Debug, Deserialize)]
pub struct Block {
    pub header: BlockHeader,
}

#[derive(Debug, Deserialize)]
pub struct BlockResult {
    pub block_id: BlockId,
    pub block: Block,
}

impl From<BlockResult> for BlockRef {
    fn from(result: BlockResult) -> Self {
        BlockRef {
            height: result.block.header.height,
            hash: result.block_id.hash,
            chain_id: result.block.header.chain_id,
        }
    }
}

// =============================================================================
// Geo lookup (ip-api.com shape)
// =============================================================================

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeoResponse {
    #[serde(default)]
    pub country_code: String,
    #[serde(default)]
    pub isp: String,
}
