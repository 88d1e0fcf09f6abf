//! Network probes
//!
//! Everything the crawler learns about a candidate comes through the
//! [`NetworkProbe`] trait. [`HttpProbe`] is the production implementation;
//! tests substitute an in-process mock.
//!
//! No probe failure is fatal: the crawler logs it and moves on.

mod http;
#[cfg(test)]
pub mod mock;
pub mod rpc;
pub mod strategy;

pub use http::HttpProbe;

use async_trait::async_trait;
use std::fmt;
use std::net::{IpAddr, SocketAddr};

use crate::handshake::HandshakeError;
use crate::types::{
    BlockHeight, BlockRef, ChainPeer, ChainStatus, GatewayStatus, GeoInfo, HandshakeReport,
    SnapshotInfo,
};

/// Where to send a chain RPC query
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RpcTarget {
    /// Try the configured (scheme, port) candidates in order
    Host(IpAddr),
    /// A known endpoint, e.g. the one that answered a previous probe
    Url(String),
}

impl fmt::Display for RpcTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RpcTarget::Host(ip) => write!(f, "{}", ip),
            RpcTarget::Url(url) => write!(f, "{}", url),
        }
    }
}

#[async_trait]
pub trait NetworkProbe: Send + Sync {
    /// Node id, chain id, listen address and sync info from `/status`
    async fn chain_status(&self, target: &RpcTarget) -> Result<ChainStatus, ProbeError>;

    /// Connected peers from `/net_info`
    async fn chain_peers(&self, target: &RpcTarget) -> Result<Vec<ChainPeer>, ProbeError>;

    /// Status document of a companion gateway on `ip`
    async fn gateway_status(&self, ip: IpAddr) -> Result<GatewayStatus, ProbeError>;

    /// Snapshot metadata served by `ip`. Size 0 is a valid answer.
    async fn snapshot_info(&self, ip: IpAddr) -> Result<SnapshotInfo, ProbeError>;

    /// Best effort: empty fields when the lookup fails
    async fn geo_ip(&self, ip: IpAddr) -> GeoInfo;

    /// Hash and chain id of the block at `height`
    async fn block_at_height(
        &self,
        target: &RpcTarget,
        height: BlockHeight,
    ) -> Result<BlockRef, ProbeError>;

    /// Prove that `addr` is controlled by `expected_id`
    async fn authenticate(
        &self,
        addr: SocketAddr,
        expected_id: &str,
    ) -> Result<HandshakeReport, HandshakeError>;
}

#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{url} answered {status}")]
    Status { url: String, status: u16 },

    #[error("Invalid response from {url}: {reason}")]
    Decode { url: String, reason: String },

    #[error("RPC error from {url}: {message}")]
    Rpc { url: String, message: String },

    #[error("No probe target answered for {host} (last error: {last})")]
    AllTargetsFailed { host: String, last: String },
}
