//! Topology registries
//!
//! Four independent live registries produced by the crawler. Each owns its
//! lock; readers get copies and never observe a row disappear.

mod store;

pub use store::{PassOutcome, Registry};

use crate::types::{GatewayNode, PrivateNode, PublicNode, SnapshotNode};

/// A row that can live in a [`Registry`]
pub trait RegistryEntry: Clone + Send + Sync + 'static {
    /// Dedup key: node id, or IP for snapshot nodes
    fn key(&self) -> String;
    fn is_alive(&self) -> bool;
    fn set_alive(&mut self, alive: bool);
}

macro_rules! keyed_by_id {
    ($($ty:ty),*) => {
        $(
            impl RegistryEntry for $ty {
                fn key(&self) -> String {
                    self.id.clone()
                }

                fn is_alive(&self) -> bool {
                    self.alive
                }

                fn set_alive(&mut self, alive: bool) {
                    self.alive = alive;
                }
            }
        )*
    };
}

keyed_by_id!(PublicNode, PrivateNode, GatewayNode);

impl RegistryEntry for SnapshotNode {
    fn key(&self) -> String {
        self.ip.to_string()
    }

    fn is_alive(&self) -> bool {
        self.alive
    }

    fn set_alive(&mut self, alive: bool) {
        self.alive = alive;
    }
}

/// The four registries, shared between the crawler and the API
pub struct Registries {
    pub public: Registry<PublicNode>,
    pub private: Registry<PrivateNode>,
    pub gateways: Registry<GatewayNode>,
    pub snapshots: Registry<SnapshotNode>,
}

impl Registries {
    pub fn new() -> Self {
        Self {
            public: Registry::new("public"),
            private: Registry::new("private"),
            gateways: Registry::new("gateways"),
            snapshots: Registry::new("snapshots"),
        }
    }

    pub async fn begin_scan(&self) {
        self.public.begin_scan().await;
        self.private.begin_scan().await;
        self.gateways.begin_scan().await;
        self.snapshots.begin_scan().await;
    }

    pub async fn abort_scan(&self) {
        self.public.abort_scan().await;
        self.private.abort_scan().await;
        self.gateways.abort_scan().await;
        self.snapshots.abort_scan().await;
    }
}

impl Default for Registries {
    fn default() -> Self {
        Self::new()
    }
}
