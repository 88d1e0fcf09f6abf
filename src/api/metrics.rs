//! Crawler metrics
//!
//! Counters updated by the crawler and gauges refreshed after every pass,
//! exported as Prometheus text and JSON.

use std::fmt::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

const PREFIX: &str = "chain_gateway";

#[derive(Default)]
pub struct Metrics {
    start_time: Option<Instant>,

    // Counters
    pub passes_completed: AtomicU64,
    pub passes_skipped: AtomicU64,
    pub candidates_probed: AtomicU64,
    pub status_failures: AtomicU64,
    pub auth_failures: AtomicU64,

    // Gauges, refreshed at the end of each pass
    pub public_alive: AtomicU64,
    pub private_alive: AtomicU64,
    pub gateways_alive: AtomicU64,
    pub snapshots_alive: AtomicU64,
    pub last_pass_duration_ms: AtomicU64,
    pub local_height: AtomicU64,
}

/// Alive row counts of the four registries
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegistryCounts {
    pub public: usize,
    pub private: usize,
    pub gateways: usize,
    pub snapshots: usize,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            start_time: Some(Instant::now()),
            ..Default::default()
        }
    }

    pub fn uptime_secs(&self) -> u64 {
        self.start_time
            .map(|t| t.elapsed().as_secs())
            .unwrap_or(0)
    }

    pub fn inc_candidates_probed(&self) {
        self.candidates_probed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_status_failures(&self) {
        self.status_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_auth_failures(&self) {
        self.auth_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_passes_skipped(&self) {
        self.passes_skipped.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a completed pass and the registry sizes it left behind
    pub fn record_pass(&self, duration_ms: u64, counts: RegistryCounts) {
        self.passes_completed.fetch_add(1, Ordering::Relaxed);
        self.last_pass_duration_ms.store(duration_ms, Ordering::Relaxed);
        self.public_alive.store(counts.public as u64, Ordering::Relaxed);
        self.private_alive.store(counts.private as u64, Ordering::Relaxed);
        self.gateways_alive.store(counts.gateways as u64, Ordering::Relaxed);
        self.snapshots_alive.store(counts.snapshots as u64, Ordering::Relaxed);
    }

    pub fn set_local_height(&self, height: i64) {
        self.local_height.store(height.max(0) as u64, Ordering::Relaxed);
    }

    /// Export metrics in Prometheus format
    pub fn to_prometheus(&self) -> String {
        let mut out = String::new();
        let load = |v: &AtomicU64| v.load(Ordering::Relaxed);

        push(&mut out, "uptime_seconds", "Gateway uptime in seconds", "gauge", self.uptime_secs());

        // Crawler
        push(&mut out, "passes_total", "Completed crawl passes", "counter", load(&self.passes_completed));
        push(&mut out, "passes_skipped_total", "Passes skipped while the local node was unknown", "counter", load(&self.passes_skipped));
        push(&mut out, "candidates_probed_total", "Candidates dequeued and probed", "counter", load(&self.candidates_probed));
        push(&mut out, "status_failures_total", "Chain status probes that failed", "counter", load(&self.status_failures));
        push(&mut out, "auth_failures_total", "Handshakes that failed authentication", "counter", load(&self.auth_failures));
        push(&mut out, "last_pass_duration_ms", "Duration of the last pass", "gauge", load(&self.last_pass_duration_ms));

        // Registries
        push(&mut out, "public_nodes_alive", "Alive public nodes", "gauge", load(&self.public_alive));
        push(&mut out, "private_nodes_alive", "Alive private nodes", "gauge", load(&self.private_alive));
        push(&mut out, "gateways_alive", "Alive companion gateways", "gauge", load(&self.gateways_alive));
        push(&mut out, "snapshots_alive", "Alive snapshot nodes", "gauge", load(&self.snapshots_alive));

        push(&mut out, "local_height", "Latest height of the local node", "gauge", load(&self.local_height));

        out
    }

    /// Export metrics as JSON
    pub fn to_json(&self) -> serde_json::Value {
        let load = |v: &AtomicU64| v.load(Ordering::Relaxed);

        serde_json::json!({
            "uptime_secs": self.uptime_secs(),
            "crawler": {
                "passes": load(&self.passes_completed),
                "passes_skipped": load(&self.passes_skipped),
                "candidates_probed": load(&self.candidates_probed),
                "status_failures": load(&self.status_failures),
                "auth_failures": load(&self.auth_failures),
                "last_pass_duration_ms": load(&self.last_pass_duration_ms),
            },
            "registries": {
                "public": load(&self.public_alive),
                "private": load(&self.private_alive),
                "gateways": load(&self.gateways_alive),
                "snapshots": load(&self.snapshots_alive),
            },
            "local_height": load(&self.local_height),
        })
    }
}

fn push(out: &mut String, name: &str, help: &str, kind: &str, value: u64) {
    let _ = write!(
        out,
        "# HELP {PREFIX}_{name} {help}\n# TYPE {PREFIX}_{name} {kind}\n{PREFIX}_{name} {value}\n\n"
    );
}
