//! Topology Crawler
//!
//! Background service that repeatedly walks the public peer graph of the
//! local node and maintains the four topology registries.
//!
//! ## Pass
//!
//! 1. Seed the frontier with the local node's own peers
//! 2. For each public IP: status, classify, authenticate, geo, peers,
//!    companion gateway, snapshot
//! 3. Publish the pass view into every registry at once; rows the pass
//!    did not touch are tombstoned
//!
//! A cancelled pass publishes nothing.

mod pass;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::api::{Metrics, RegistryCounts};
use crate::config::GatewayConfig;
use crate::local::LocalNode;
use crate::probe::NetworkProbe;
use crate::registry::{PassOutcome, Registries};
use pass::{Cancelled, Pass, PassView};

/// How a single pass ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassResult {
    Completed(PassSummary),
    /// Local node state not known yet
    Skipped,
    Cancelled,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassSummary {
    pub public: PassOutcome,
    pub private: PassOutcome,
    pub gateways: PassOutcome,
    pub snapshots: PassOutcome,
    pub duration_ms: u64,
}

pub struct Crawler {
    config: Arc<GatewayConfig>,
    probe: Arc<dyn NetworkProbe>,
    local: Arc<LocalNode>,
    registries: Arc<Registries>,
    metrics: Arc<Metrics>,
}

impl Crawler {
    pub fn new(
        config: Arc<GatewayConfig>,
        probe: Arc<dyn NetworkProbe>,
        local: Arc<LocalNode>,
        registries: Arc<Registries>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            config,
            probe,
            local,
            registries,
            metrics,
        }
    }

    /// Run passes until cancelled
    pub async fn run(&self, shutdown: CancellationToken) {
        info!(
            "🌐 Topology crawler started (interval {:?}, block diff limit {})",
            self.config.crawl_interval(),
            self.config.block_diff_limit
        );

        while !shutdown.is_cancelled() {
            if self.run_pass(&shutdown).await == PassResult::Cancelled {
                break;
            }

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(self.config.crawl_interval()) => {}
            }
        }

        info!("🛑 Topology crawler stopped");
    }

    /// Run one complete pass and publish it
    pub async fn run_pass(&self, shutdown: &CancellationToken) -> PassResult {
        let local = self.local.state().await;
        if !local.is_ready() {
            self.metrics.inc_passes_skipped();
            warn!("Local node state unknown, skipping crawl pass");
            return PassResult::Skipped;
        }

        let started = Instant::now();
        self.registries.begin_scan().await;

        let view = match Pass::new(self, local, shutdown).run().await {
            Ok(view) => view,
            Err(Cancelled) => {
                self.registries.abort_scan().await;
                debug!("Crawl pass cancelled");
                return PassResult::Cancelled;
            }
        };

        let summary = self.publish(view, started).await;
        info!(
            "📊 Pass complete in {}ms: {} public, {} private, {} gateways, {} snapshots",
            summary.duration_ms,
            summary.public.inserted + summary.public.updated,
            summary.private.inserted + summary.private.updated,
            summary.gateways.inserted + summary.gateways.updated,
            summary.snapshots.inserted + summary.snapshots.updated,
        );

        PassResult::Completed(summary)
    }

    async fn publish(&self, view: PassView, started: Instant) -> PassSummary {
        let none = HashSet::new();
        let registries = &self.registries;

        let public = registries.public.apply_pass(view.public, &none).await;
        let private = registries.private.apply_pass(view.private, &none).await;
        let gateways = registries.gateways.apply_pass(view.gateways, &none).await;
        let snapshots = registries
            .snapshots
            .apply_pass(view.snapshots, &view.empty_snapshots)
            .await;

        debug!(
            "Registries hold {} public, {} private, {} gateway, {} snapshot rows",
            registries.public.len().await,
            registries.private.len().await,
            registries.gateways.len().await,
            registries.snapshots.len().await,
        );

        let duration_ms = started.elapsed().as_millis() as u64;
        self.metrics.record_pass(
            duration_ms,
            RegistryCounts {
                public: registries.public.alive_count().await,
                private: registries.private.alive_count().await,
                gateways: registries.gateways.alive_count().await,
                snapshots: registries.snapshots.alive_count().await,
            },
        );

        PassSummary {
            public,
            private,
            gateways,
            snapshots,
            duration_ms,
        }
    }
}
