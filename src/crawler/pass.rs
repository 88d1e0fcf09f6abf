//! One breadth-first crawl pass
//!
//! The pass collects everything it learns into its own view; nothing is
//! visible to readers until the driver publishes the view at the end.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::net::{IpAddr, SocketAddr};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::Crawler;
use crate::address::{is_ip, is_private, split_host_port};
use crate::classify::{self, Classification};
use crate::probe::RpcTarget;
use crate::types::{
    unix_now, ChainPeer, ChainStatus, GatewayNode, GeoInfo, LocalChainState, NodeId, PrivateNode,
    PublicNode, SnapshotNode,
};

/// The pass was cancelled; its partial view is discarded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cancelled;

/// Everything a completed pass touched
#[derive(Debug, Default)]
pub struct PassView {
    pub public: Vec<PublicNode>,
    pub private: Vec<PrivateNode>,
    pub gateways: Vec<GatewayNode>,
    pub snapshots: Vec<SnapshotNode>,
    /// IPs whose snapshot probe explicitly reported "no snapshot"
    pub empty_snapshots: HashSet<String>,
}

/// Where a reported peer goes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerRoute {
    Crawl(IpAddr),
    Private { ip: IpAddr, port: u16 },
    Unroutable,
}

/// Route a reported peer: private addresses are recorded, never crawled
pub fn route_peer(peer: &ChainPeer, default_port: u16) -> PeerRoute {
    let listen = split_host_port(&peer.listen_addr);
    let port = listen.as_ref().map(|(_, port)| *port).unwrap_or(default_port);

    // Hostnames are never resolved; only literal IPs are routable
    let host = if is_ip(&peer.remote_ip) {
        Some(peer.remote_ip.clone())
    } else {
        listen.map(|(host, _)| host).filter(|host| is_ip(host))
    };
    let ip = host.and_then(|host| host.parse::<IpAddr>().ok());

    match ip {
        Some(ip) if ip.is_unspecified() => PeerRoute::Unroutable,
        Some(ip) if is_private(&ip) => PeerRoute::Private { ip, port },
        Some(ip) => PeerRoute::Crawl(ip),
        None => PeerRoute::Unroutable,
    }
}

pub(super) struct Pass<'a> {
    crawler: &'a Crawler,
    local: LocalChainState,
    shutdown: &'a CancellationToken,
    now: i64,

    frontier: VecDeque<IpAddr>,
    queued: HashSet<IpAddr>,
    confirmed: HashSet<NodeId>,
    /// Direct peers of the local node
    connected: HashSet<NodeId>,

    view: PassView,
    private_index: HashMap<NodeId, usize>,
    gateway_ids: HashSet<NodeId>,
}

impl<'a> Pass<'a> {
    pub(super) fn new(
        crawler: &'a Crawler,
        local: LocalChainState,
        shutdown: &'a CancellationToken,
    ) -> Self {
        let mut confirmed = HashSet::new();
        // Never list ourselves when a peer reports our public address
        confirmed.insert(local.node_id.clone());

        Self {
            crawler,
            local,
            shutdown,
            now: unix_now(),
            frontier: VecDeque::new(),
            queued: HashSet::new(),
            confirmed,
            connected: HashSet::new(),
            view: PassView::default(),
            private_index: HashMap::new(),
            gateway_ids: HashSet::new(),
        }
    }

    pub(super) async fn run(mut self) -> Result<PassView, Cancelled> {
        self.seed().await?;

        while let Some(ip) = self.frontier.pop_front() {
            self.check_cancelled()?;
            self.visit(ip).await?;
        }

        Ok(self.view)
    }

    fn check_cancelled(&self) -> Result<(), Cancelled> {
        if self.shutdown.is_cancelled() {
            Err(Cancelled)
        } else {
            Ok(())
        }
    }

    /// Seed the frontier from the local node's own peers
    async fn seed(&mut self) -> Result<(), Cancelled> {
        let target = RpcTarget::Url(self.local.rpc_url.clone());
        let peers = match self.crawler.probe.chain_peers(&target).await {
            Ok(peers) => peers,
            Err(e) => {
                debug!("Local peer list unavailable: {}", e);
                Vec::new()
            }
        };
        self.check_cancelled()?;

        self.connected = peers.iter().map(|p| p.node_id.clone()).collect();

        let own = Classification {
            synced: true,
            safe: true,
            block_diff: 0,
        };
        let local_id = self.local.node_id.clone();
        let height = self.local.latest_block_height;
        self.route_peers(&local_id, &peers, own, height);

        debug!(
            "Seeded pass with {} of {} local peers",
            self.frontier.len(),
            peers.len()
        );
        Ok(())
    }

    /// Enqueue public peers, record private ones under `reporter`
    fn route_peers(
        &mut self,
        reporter: &NodeId,
        peers: &[ChainPeer],
        class: Classification,
        height: i64,
    ) {
        let default_port = self.crawler.config.default_p2p_port;

        for peer in peers {
            match route_peer(peer, default_port) {
                PeerRoute::Crawl(ip) => {
                    if self.queued.insert(ip) {
                        self.frontier.push_back(ip);
                    }
                }
                PeerRoute::Private { ip, port } => {
                    self.record_private(reporter, peer, ip, port, class, height)
                }
                PeerRoute::Unroutable => {
                    debug!("Peer {} has no usable address", peer.node_id);
                }
            }
        }
    }

    fn record_private(
        &mut self,
        reporter: &NodeId,
        peer: &ChainPeer,
        ip: IpAddr,
        port: u16,
        class: Classification,
        height: i64,
    ) {
        if let Some(&idx) = self.private_index.get(&peer.node_id) {
            let node = &mut self.view.private[idx];
            node.peers.insert(reporter.clone());
            node.peers_count = node.peers.len();
            return;
        }

        let mut peers = BTreeSet::new();
        peers.insert(reporter.clone());

        self.private_index
            .insert(peer.node_id.clone(), self.view.private.len());
        self.view.private.push(PrivateNode {
            id: peer.node_id.clone(),
            ip,
            port,
            peers,
            discovered_by: reporter.clone(),
            alive: true,
            synced: class.synced,
            safe: class.safe,
            block_height: height,
            block_diff: class.block_diff,
            connected: self.connected.contains(&peer.node_id),
            peers_count: 1,
            last_seen: self.now,
        });
    }

    async fn visit(&mut self, ip: IpAddr) -> Result<(), Cancelled> {
        let crawler = self.crawler;
        crawler.metrics.inc_candidates_probed();

        // 1. Who does this IP claim to be?
        let status = match crawler.probe.chain_status(&RpcTarget::Host(ip)).await {
            Ok(status) => status,
            Err(e) => {
                crawler.metrics.inc_status_failures();
                debug!("Status probe {} failed: {}", ip, e);
                return Ok(());
            }
        };
        self.check_cancelled()?;

        if status.node_id.is_empty() || self.confirmed.contains(&status.node_id) {
            debug!("Skipping {}: node {} already seen this pass", ip, status.node_id);
            return Ok(());
        }

        // 2. Classify against the local node
        let class = classify::classify(
            crawler.probe.as_ref(),
            &self.local,
            &status,
            crawler.config.block_diff_limit,
        )
        .await;
        self.check_cancelled()?;

        // 3. Prove the claim
        let port = split_host_port(&status.listen_addr)
            .map(|(_, port)| port)
            .unwrap_or(crawler.config.default_p2p_port);
        let report = match crawler
            .probe
            .authenticate(SocketAddr::new(ip, port), &status.node_id)
            .await
        {
            Ok(report) => report,
            Err(e) => {
                crawler.metrics.inc_auth_failures();
                debug!("Handshake with {} ({}:{}) failed: {}", status.node_id, ip, port, e);
                return Ok(());
            }
        };
        self.confirmed.insert(status.node_id.clone());
        self.check_cancelled()?;

        // 4. Geo
        let geo = crawler.probe.geo_ip(ip).await;
        self.check_cancelled()?;

        // 5. Peers
        let peers = match crawler
            .probe
            .chain_peers(&RpcTarget::Url(status.rpc_url.clone()))
            .await
        {
            Ok(peers) => peers,
            Err(e) => {
                debug!("Peer list of {} unavailable: {}", status.node_id, e);
                Vec::new()
            }
        };
        self.route_peers(&status.node_id, &peers, class, status.latest_block_height);
        self.check_cancelled()?;

        let node = PublicNode {
            id: status.node_id.clone(),
            ip,
            port,
            peers: peers.iter().map(|p| p.node_id.clone()).collect(),
            alive: true,
            synced: class.synced,
            safe: class.safe,
            block_height: status.latest_block_height,
            block_diff: class.block_diff,
            ping_ms: classify::ping_ms(&report),
            wallet_address: status.wallet_address.clone(),
            rpc_address: Some(status.rpc_url.clone()),
            country: geo.country_code.clone(),
            isp: geo.isp.clone(),
            connected: self.connected.contains(&status.node_id),
            peers_count: peers.len(),
            moniker: status.moniker.clone(),
            version: status.version.clone(),
            last_seen: self.now,
        };

        // 6. Companion gateway and its snapshot
        self.probe_gateway(ip, &status, &node, &geo, class).await?;

        // 7. Record
        self.view.public.push(node);
        Ok(())
    }

    async fn probe_gateway(
        &mut self,
        ip: IpAddr,
        status: &ChainStatus,
        node: &PublicNode,
        geo: &GeoInfo,
        class: Classification,
    ) -> Result<(), Cancelled> {
        let crawler = self.crawler;

        let gateway = match crawler.probe.gateway_status(ip).await {
            Ok(gateway) if !gateway.id.is_empty() => gateway,
            Ok(_) => return Ok(()),
            Err(e) => {
                debug!("No gateway on {}: {}", ip, e);
                return Ok(());
            }
        };
        self.check_cancelled()?;

        if self.gateway_ids.insert(gateway.id.clone()) {
            self.view.gateways.push(GatewayNode {
                id: gateway.id,
                ip,
                port: crawler.config.gateway_port,
                chain_node_id: status.node_id.clone(),
                moniker: gateway.moniker,
                faucet_address: gateway.faucet_address,
                node_type: gateway.node_type,
                version: gateway.version,
                app_version: gateway.app_version,
                alive: true,
                synced: class.synced,
                safe: class.safe,
                block_height: status.latest_block_height,
                block_diff: class.block_diff,
                ping_ms: node.ping_ms,
                country: geo.country_code.clone(),
                isp: geo.isp.clone(),
                last_seen: self.now,
            });
        }

        match crawler.probe.snapshot_info(ip).await {
            Ok(info) if info.is_empty() => {
                self.view.empty_snapshots.insert(ip.to_string());
            }
            Ok(info) => self.view.snapshots.push(SnapshotNode {
                ip,
                port: crawler.config.snapshot_port,
                checksum: info.checksum,
                size: info.size,
                alive: true,
                synced: class.synced,
                block_height: status.latest_block_height,
                last_seen: self.now,
            }),
            Err(e) => debug!("Snapshot probe {} failed: {}", ip, e),
        }
        self.check_cancelled()
    }
}
