//! Local node state
//!
//! Keeps the latest `/status` of the chain node this gateway fronts. The
//! crawler reads it at the start of every pass; the API serves its height.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::probe::{NetworkProbe, RpcTarget};
use crate::types::{unix_now, ChainStatus, LocalChainState};

pub struct LocalNode {
    rpc_url: String,
    state: RwLock<LocalChainState>,
}

impl LocalNode {
    pub fn new(rpc_url: String) -> Self {
        let state = LocalChainState {
            rpc_url: rpc_url.clone(),
            ..Default::default()
        };

        Self {
            rpc_url,
            state: RwLock::new(state),
        }
    }

    pub fn rpc_url(&self) -> &str {
        &self.rpc_url
    }

    pub fn rpc_target(&self) -> RpcTarget {
        RpcTarget::Url(self.rpc_url.clone())
    }

    /// Copy of the latest known state
    pub async fn state(&self) -> LocalChainState {
        self.state.read().await.clone()
    }

    /// Record a fresh status from the local node
    pub async fn update(&self, status: ChainStatus) {
        let mut state = self.state.write().await;
        *state = LocalChainState {
            node_id: status.node_id,
            chain_id: status.chain_id,
            latest_block_height: status.latest_block_height,
            latest_block_time: status.latest_block_time,
            version: status.version,
            protocol_version: status.protocol_version,
            rpc_url: self.rpc_url.clone(),
            updated_at: unix_now(),
        };
    }

    /// Fetch the local status once; failures keep the previous state
    pub async fn sync(&self, probe: &dyn NetworkProbe) -> bool {
        match probe.chain_status(&self.rpc_target()).await {
            Ok(status) => {
                debug!(
                    "Local node {} at height {}",
                    status.node_id, status.latest_block_height
                );
                self.update(status).await;
                true
            }
            Err(e) => {
                warn!("Local status sync failed: {}", e);
                false
            }
        }
    }
}

/// Poll the local node until cancelled
pub async fn run_status_sync(
    probe: Arc<dyn NetworkProbe>,
    local: Arc<LocalNode>,
    interval: Duration,
    shutdown: CancellationToken,
) {
    info!("🔄 Local status sync every {:?} from {}", interval, local.rpc_url());

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {
                local.sync(probe.as_ref()).await;
            }
        }
    }

    debug!("Local status sync stopped");
}
