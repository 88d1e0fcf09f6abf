//! Production probe: HTTP(S) via reqwest, handshakes over TCP

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use super::rpc::{BlockResult, GeoResponse, NetInfoResult, RpcEnvelope, StatusResult};
use super::strategy::{self, base_url, candidate_urls, first_success};
use super::{NetworkProbe, ProbeError, RpcTarget};
use crate::config::{GatewayConfig, ProbeTarget, Scheme};
use crate::handshake::{self, HandshakeError, LocalIdentity};
use crate::local::LocalNode;
use crate::types::{
    BlockHeight, BlockRef, ChainPeer, ChainStatus, GatewayStatus, GeoInfo, HandshakeReport,
    SnapshotInfo,
};

pub struct HttpProbe {
    client: reqwest::Client,
    targets: Vec<ProbeTarget>,
    gateway_port: u16,
    snapshot_port: u16,
    geoip_url: Option<String>,
    dial_timeout: Duration,
    identity: Arc<LocalIdentity>,
    /// Source of the network and protocol versions we advertise in handshakes
    local: Arc<LocalNode>,
}

impl HttpProbe {
    pub fn new(
        config: &GatewayConfig,
        identity: Arc<LocalIdentity>,
        local: Arc<LocalNode>,
    ) -> Result<Self, ProbeError> {
        let client = reqwest::Client::builder()
            .timeout(config.dial_timeout())
            .connect_timeout(config.dial_timeout())
            .user_agent(concat!("chain-gateway/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            targets: config.chain_probe_targets.clone(),
            gateway_port: config.gateway_port,
            snapshot_port: config.snapshot_port,
            geoip_url: config.geoip_url.clone(),
            dial_timeout: config.dial_timeout(),
            identity,
            local,
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, ProbeError> {
        let response = self.client.get(url).send().await?;

        if !response.status().is_success() {
            return Err(ProbeError::Status {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }

        response.json::<T>().await.map_err(|e| ProbeError::Decode {
            url: url.to_string(),
            reason: e.to_string(),
        })
    }

    /// GET a JSON-RPC endpoint and unwrap its result
    async fn rpc<T: DeserializeOwned>(&self, url: String) -> Result<T, ProbeError> {
        let envelope: RpcEnvelope<T> = self.get_json(&url).await?;

        match (envelope.result, envelope.error) {
            (Some(result), _) => Ok(result),
            (None, Some(error)) => Err(ProbeError::Rpc {
                url,
                message: error.describe(),
            }),
            (None, None) => Err(ProbeError::Decode {
                url,
                reason: "empty result".to_string(),
            }),
        }
    }

    /// Query `path` on the target; returns the result and the base URL
    /// that answered
    async fn query<T: DeserializeOwned>(
        &self,
        target: &RpcTarget,
        path: &str,
    ) -> Result<(T, String), ProbeError> {
        match target {
            RpcTarget::Url(base) => {
                let result = self.rpc(strategy::join(base, path)).await?;
                Ok((result, base.clone()))
            }
            RpcTarget::Host(ip) => {
                let urls = candidate_urls(*ip, &self.targets);
                first_success(&ip.to_string(), urls, move |base| async move {
                    let result = self.rpc(strategy::join(&base, path)).await?;
                    Ok((result, base))
                })
                .await
            }
        }
    }
}

#[async_trait]
impl NetworkProbe for HttpProbe {
    async fn chain_status(&self, target: &RpcTarget) -> Result<ChainStatus, ProbeError> {
        let (result, base): (StatusResult, String) = self.query(target, "/status").await?;
        Ok(result.into_status(base))
    }

    async fn chain_peers(&self, target: &RpcTarget) -> Result<Vec<ChainPeer>, ProbeError> {
        let (result, _): (NetInfoResult, String) = self.query(target, "/net_info").await?;
        Ok(result.into_peers())
    }

    async fn gateway_status(&self, ip: IpAddr) -> Result<GatewayStatus, ProbeError> {
        let url = strategy::join(&base_url(Scheme::Http, ip, self.gateway_port), "/status");
        self.get_json(&url).await
    }

    async fn snapshot_info(&self, ip: IpAddr) -> Result<SnapshotInfo, ProbeError> {
        let url = strategy::join(
            &base_url(Scheme::Http, ip, self.snapshot_port),
            "/snapshot/info",
        );
        self.get_json(&url).await
    }

    async fn geo_ip(&self, ip: IpAddr) -> GeoInfo {
        let Some(endpoint) = &self.geoip_url else {
            return GeoInfo::default();
        };

        let url = format!("{}/{}", endpoint.trim_end_matches('/'), ip);
        match self.get_json::<GeoResponse>(&url).await {
            Ok(geo) => GeoInfo {
                country_code: geo.country_code,
                isp: geo.isp,
            },
            Err(e) => {
                debug!("Geo lookup for {} failed: {}", ip, e);
                GeoInfo::default()
            }
        }
    }

    async fn block_at_height(
        &self,
        target: &RpcTarget,
        height: BlockHeight,
    ) -> Result<BlockRef, ProbeError> {
        let path = format!("/block?height={}", height);
        let (result, _): (BlockResult, String) = self.query(target, &path).await?;
        Ok(result.into())
    }

    async fn authenticate(
        &self,
        addr: SocketAddr,
        expected_id: &str,
    ) -> Result<HandshakeReport, HandshakeError> {
        let local = self.local.state().await;
        let ours = self
            .identity
            .node_info(&local.chain_id, local.protocol_version);

        handshake::authenticate(
            addr,
            expected_id,
            self.identity.keypair(),
            &ours,
            self.dial_timeout,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::generate_keypair;
    use crate::types::ProtocolVersion;
    use axum::extract::{Path, Query};
    use axum::http::StatusCode;
    use axum::routing::get;
    use axum::{Json, Router};
    use serde_json::{json, Value};
    use std::collections::HashMap;
    use tokio::net::TcpListener;

    const LOCALHOST: &str = "127.0.0.1";

    /// Serve `app` on an ephemeral loopback port
    async fn serve(app: Router) -> u16 {
        let listener = TcpListener::bind((LOCALHOST, 0)).await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        port
    }

    /// A port nothing listens on
    async fn closed_port() -> u16 {
        let listener = TcpListener::bind((LOCALHOST, 0)).await.unwrap();
        listener.local_addr().unwrap().port()
    }

    fn envelope(result: Value) -> Json<Value> {
        Json(json!({ "jsonrpc": "2.0", "id": -1, "result": result }))
    }

    /// Tendermint RPC with blocks up to height 1000
    fn chain_rpc() -> Router {
        Router::new()
            .route(
                "/status",
                get(|| async {
                    envelope(json!({
                        "node_info": {
                            "protocol_version": { "p2p": "8", "block": "11", "app": "0" },
                            "id": "21fe31dfa154a261626bf854046fd2271b7bed4b",
                            "listen_addr": "tcp://0.0.0.0:26656",
                            "network": "testnet-1",
                            "version": "0.34.27",
                            "moniker": "validator-1"
                        },
                        "sync_info": { "latest_block_height": "1000" },
                        "validator_info": { "address": "" }
                    }))
                }),
            )
            .route(
                "/net_info",
                get(|| async {
                    envelope(json!({
                        "n_peers": "1",
                        "peers": [{
                            "node_info": { "id": "p1", "listen_addr": "tcp://0.0.0.0:26656" },
                            "remote_ip": "203.0.113.10"
                        }]
                    }))
                }),
            )
            .route(
                "/block",
                get(|Query(query): Query<HashMap<String, String>>| async move {
                    let height: i64 = query.get("height").and_then(|h| h.parse().ok()).unwrap_or(0);
                    if height > 1000 {
                        return Json(json!({
                            "jsonrpc": "2.0",
                            "id": -1,
                            "error": {
                                "code": -32603,
                                "message": "Internal error",
                                "data": format!("height {} must be less than or equal to the current blockchain height 1000", height)
                            }
                        }));
                    }
                    envelope(json!({
                        "block_id": { "hash": format!("HASH{}", height) },
                        "block": { "header": { "chain_id": "testnet-1", "height": height.to_string() } }
                    }))
                }),
            )
    }

    /// Companion gateway with an empty snapshot
    fn gateway() -> Router {
        Router::new()
            .route(
                "/status",
                get(|| async {
                    Json(json!({
                        "id": "gw-1",
                        "moniker": "edge-2",
                        "node_type": "gateway",
                        "latest_block_height": 998
                    }))
                }),
            )
            .route(
                "/snapshot/info",
                get(|| async { Json(json!({ "checksum": "", "size": 0 })) }),
            )
    }

    fn geo() -> Router {
        Router::new()
            .route(
                "/json/:ip",
                get(|Path(ip): Path<String>| async move {
                    if ip == LOCALHOST {
                        Ok(Json(json!({ "status": "success", "countryCode": "NL", "isp": "Example ISP" })))
                    } else {
                        Err(StatusCode::TOO_MANY_REQUESTS)
                    }
                }),
            )
    }

    fn probe(config: GatewayConfig) -> HttpProbe {
        let identity = Arc::new(LocalIdentity::new(
            generate_keypair(),
            "tcp://0.0.0.0:8080".to_string(),
            "crawler".to_string(),
        ));
        let local = Arc::new(LocalNode::new(config.local_rpc_url.clone()));
        HttpProbe::new(&config, identity, local).unwrap()
    }

    fn config_with_targets(ports: &[u16]) -> GatewayConfig {
        let mut config = GatewayConfig::default();
        config.dial_timeout_ms = 1000;
        config.chain_probe_targets = ports.iter().map(|p| ProbeTarget::http(*p)).collect();
        config.geoip_url = None;
        config
    }

    fn localhost() -> IpAddr {
        LOCALHOST.parse().unwrap()
    }

    #[tokio::test]
    async fn test_falls_back_to_next_port() {
        let live = serve(chain_rpc()).await;
        let dead = closed_port().await;
        let probe = probe(config_with_targets(&[dead, live]));

        let status = probe.chain_status(&RpcTarget::Host(localhost())).await.unwrap();
        assert_eq!(status.node_id, "21fe31dfa154a261626bf854046fd2271b7bed4b");
        assert_eq!(status.chain_id, "testnet-1");
        assert_eq!(status.latest_block_height, 1000);
        assert_eq!(status.protocol_version.block, 11);
        assert_eq!(status.wallet_address, None);
        assert_eq!(status.rpc_url, format!("http://{}:{}", LOCALHOST, live));

        let peers = probe.chain_peers(&RpcTarget::Host(localhost())).await.unwrap();
        assert_eq!(peers.len(), 1);
        assert_eq!(peers[0].remote_ip, "203.0.113.10");
    }

    #[tokio::test]
    async fn test_all_ports_failing() {
        let probe = probe(config_with_targets(&[closed_port().await, closed_port().await]));

        let result = probe.chain_status(&RpcTarget::Host(localhost())).await;
        assert!(matches!(result, Err(ProbeError::AllTargetsFailed { .. })));
    }

    #[tokio::test]
    async fn test_non_success_status() {
        let port = serve(Router::new().route(
            "/status",
            get(|| async { StatusCode::SERVICE_UNAVAILABLE }),
        ))
        .await;
        let probe = probe(config_with_targets(&[port]));

        let base = format!("http://{}:{}", LOCALHOST, port);
        match probe.chain_status(&RpcTarget::Url(base)).await {
            Err(ProbeError::Status { status, .. }) => assert_eq!(status, 503),
            other => panic!("expected Status error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_block_at_height_and_rpc_error() {
        let port = serve(chain_rpc()).await;
        let probe = probe(config_with_targets(&[port]));
        let target = RpcTarget::Url(format!("http://{}:{}", LOCALHOST, port));

        let block = probe.block_at_height(&target, 900).await.unwrap();
        assert_eq!(block.height, 900);
        assert_eq!(block.hash, "HASH900");
        assert_eq!(block.chain_id, "testnet-1");

        match probe.block_at_height(&target, 5000).await {
            Err(ProbeError::Rpc { message, .. }) => {
                assert!(message.starts_with("Internal error: height 5000"))
            }
            other => panic!("expected Rpc error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_gateway_and_empty_snapshot() {
        let port = serve(gateway()).await;
        let mut config = config_with_targets(&[port]);
        config.gateway_port = port;
        config.snapshot_port = port;
        let probe = probe(config);

        let status = probe.gateway_status(localhost()).await.unwrap();
        assert_eq!(status.id, "gw-1");
        assert_eq!(status.moniker, "edge-2");
        assert_eq!(status.latest_block_height, 998);

        let snapshot = probe.snapshot_info(localhost()).await.unwrap();
        assert_eq!(snapshot.size, 0);
        assert!(snapshot.is_empty());
    }

    #[tokio::test]
    async fn test_geo_lookup_best_effort() {
        let port = serve(geo()).await;
        let mut config = config_with_targets(&[port]);
        config.geoip_url = Some(format!("http://{}:{}/json/", LOCALHOST, port));
        let probe = probe(config);

        let found = probe.geo_ip(localhost()).await;
        assert_eq!(found.country_code, "NL");
        assert_eq!(found.isp, "Example ISP");

        // Rate limited
        let missing = probe.geo_ip("203.0.113.9".parse().unwrap()).await;
        assert_eq!(missing, GeoInfo::default());
        assert!(missing.country_code.is_empty() && missing.isp.is_empty());

        // Unreachable endpoint
        let mut config = config_with_targets(&[port]);
        config.geoip_url = Some(format!("http://{}:{}/json", LOCALHOST, closed_port().await));
        assert_eq!(self::probe(config).geo_ip(localhost()).await, GeoInfo::default());
    }

    #[tokio::test]
    async fn test_authenticate_over_tcp() {
        let peer = LocalIdentity::new(
            generate_keypair(),
            "tcp://0.0.0.0:26656".to_string(),
            "validator-1".to_string(),
        );
        let peer_id = peer.node_id().clone();

        let listener = TcpListener::bind((LOCALHOST, 0)).await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            if let Ok((stream, _)) = listener.accept().await {
                let info = peer.node_info("testnet-1", ProtocolVersion::default());
                let _ = handshake::handshake(stream, peer.keypair(), &info, Duration::from_secs(1)).await;
            }
        });

        let probe = probe(config_with_targets(&[26657]));
        let report = probe.authenticate(addr, &peer_id).await.unwrap();
        assert!(report.exchange_ms < 1000);
    }
}
