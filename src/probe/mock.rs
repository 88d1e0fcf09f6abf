//! In-process probe for tests: a scripted network of hosts keyed by IP

use async_trait::async_trait;
use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::Mutex;

use super::{NetworkProbe, ProbeError, RpcTarget};
use crate::address::split_host_port;
use crate::handshake::HandshakeError;
use crate::types::{
    BlockHeight, BlockRef, ChainPeer, ChainStatus, GatewayStatus, GeoInfo, HandshakeReport,
    NodeId, ProtocolVersion, SnapshotInfo,
};

/// What one IP answers
#[derive(Debug, Clone)]
pub struct MockHost {
    pub status: Option<ChainStatus>,
    pub peers: Vec<ChainPeer>,
    pub gateway: Option<GatewayStatus>,
    pub snapshot: Option<SnapshotInfo>,
    pub geo: GeoInfo,
    /// Block hashes are `<fork>-<height>`; hosts on different forks disagree
    pub fork: String,
    /// Id proven by the handshake; `None` makes it fail
    pub handshake_id: Option<NodeId>,
    pub report: HandshakeReport,
}

impl MockHost {
    /// A healthy chain node on `testnet-1`
    pub fn chain(ip: &str, id: &str, height: BlockHeight) -> Self {
        Self {
            status: Some(ChainStatus {
                node_id: id.to_string(),
                chain_id: "testnet-1".to_string(),
                listen_addr: "tcp://0.0.0.0:26656".to_string(),
                latest_block_height: height,
                latest_block_time: None,
                wallet_address: None,
                moniker: format!("moniker-{}", id),
                version: "0.34.27".to_string(),
                protocol_version: ProtocolVersion {
                    p2p: 8,
                    block: 11,
                    app: 0,
                },
                rpc_url: format!("http://{}:26657", ip),
            }),
            peers: Vec::new(),
            gateway: None,
            snapshot: None,
            geo: GeoInfo::default(),
            fork: "main".to_string(),
            handshake_id: Some(id.to_string()),
            report: HandshakeReport {
                connect_ms: 5,
                channel_ms: 12,
                exchange_ms: 7,
            },
        }
    }

    pub fn with_peer(mut self, id: &str, ip: &str) -> Self {
        self.peers.push(ChainPeer {
            node_id: id.to_string(),
            remote_ip: ip.to_string(),
            listen_addr: "tcp://0.0.0.0:26656".to_string(),
        });
        self
    }
}

#[derive(Default)]
pub struct MockProbe {
    hosts: Mutex<HashMap<String, MockHost>>,
    auth_attempts: Mutex<Vec<(SocketAddr, String)>>,
}

impl MockProbe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, ip: &str, host: MockHost) {
        self.hosts.lock().unwrap().insert(ip.to_string(), host);
    }

    pub fn remove(&self, ip: &str) {
        self.hosts.lock().unwrap().remove(ip);
    }

    pub fn update(&self, ip: &str, f: impl FnOnce(&mut MockHost)) {
        if let Some(host) = self.hosts.lock().unwrap().get_mut(ip) {
            f(host);
        }
    }

    pub fn auth_attempts(&self) -> Vec<(SocketAddr, String)> {
        self.auth_attempts.lock().unwrap().clone()
    }

    fn host(&self, key: &str) -> Option<MockHost> {
        self.hosts.lock().unwrap().get(key).cloned()
    }

    fn lookup(&self, target: &RpcTarget) -> Result<MockHost, ProbeError> {
        let key = match target {
            RpcTarget::Host(ip) => ip.to_string(),
            RpcTarget::Url(url) => split_host_port(url)
                .map(|(host, _)| host)
                .unwrap_or_else(|| url.clone()),
        };

        self.host(&key).ok_or(ProbeError::AllTargetsFailed {
            host: key,
            last: "unreachable".to_string(),
        })
    }
}

/// The host does not serve `what`
fn unreachable(what: &'static str) -> ProbeError {
    ProbeError::Status {
        url: format!("mock://{}", what),
        status: 404,
    }
}

#[async_trait]
impl NetworkProbe for MockProbe {
    async fn chain_status(&self, target: &RpcTarget) -> Result<ChainStatus, ProbeError> {
        self.lookup(target)?.status.ok_or(unreachable("status"))
    }

    async fn chain_peers(&self, target: &RpcTarget) -> Result<Vec<ChainPeer>, ProbeError> {
        Ok(self.lookup(target)?.peers)
    }

    async fn gateway_status(&self, ip: IpAddr) -> Result<GatewayStatus, ProbeError> {
        self.lookup(&RpcTarget::Host(ip))?
            .gateway
            .ok_or(unreachable("gateway"))
    }

    async fn snapshot_info(&self, ip: IpAddr) -> Result<SnapshotInfo, ProbeError> {
        self.lookup(&RpcTarget::Host(ip))?
            .snapshot
            .ok_or(unreachable("snapshot"))
    }

    async fn geo_ip(&self, ip: IpAddr) -> GeoInfo {
        self.host(&ip.to_string())
            .map(|host| host.geo)
            .unwrap_or_default()
    }

    async fn block_at_height(
        &self,
        target: &RpcTarget,
        height: BlockHeight,
    ) -> Result<BlockRef, ProbeError> {
        let host = self.lookup(target)?;
        let status = host.status.ok_or(unreachable("block"))?;

        if height > status.latest_block_height {
            return Err(unreachable("block"));
        }

        Ok(BlockRef {
            height,
            hash: format!("{}-{}", host.fork, height),
            chain_id: status.chain_id,
        })
    }

    async fn authenticate(
        &self,
        addr: SocketAddr,
        expected_id: &str,
    ) -> Result<HandshakeReport, HandshakeError> {
        self.auth_attempts
            .lock()
            .unwrap()
            .push((addr, expected_id.to_string()));

        let host = self
            .host(&addr.ip().to_string())
            .ok_or_else(|| HandshakeError::Connect(std::io::ErrorKind::ConnectionRefused.into()))?;

        match host.handshake_id {
            Some(actual) if actual == expected_id => Ok(host.report),
            Some(actual) => Err(HandshakeError::IdMismatch {
                expected: expected_id.to_string(),
                actual,
            }),
            None => Err(HandshakeError::Timeout {
                phase: "connect",
                timeout_ms: 0,
            }),
        }
    }
}
