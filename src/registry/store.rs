//! In-memory registry store
//!
//! An ordered list of records plus a key→index map so rediscovery updates
//! a row in place. Rows are never removed: a record that stops answering is
//! tombstoned with `alive = false` and keeps its last known fields.

use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;
use tracing::debug;

use super::RegistryEntry;
use crate::types::{unix_now, RegistryView};

/// What a pass changed in one registry
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassOutcome {
    pub inserted: usize,
    pub updated: usize,
    pub tombstoned: usize,
}

struct Inner<T> {
    nodes: Vec<T>,
    index: HashMap<String, usize>,
    last_update: i64,
    scanning: bool,
}

impl<T: RegistryEntry> Inner<T> {
    /// Returns true if the record was new
    fn upsert(&mut self, record: T) -> bool {
        let key = record.key();
        match self.index.get(&key) {
            Some(&idx) => {
                self.nodes[idx] = record;
                false
            }
            None => {
                self.index.insert(key, self.nodes.len());
                self.nodes.push(record);
                true
            }
        }
    }

    /// Flip `alive` off for every live row whose key is not in `seen`
    fn mark_stale_except(&mut self, seen: &HashSet<String>) -> usize {
        let mut count = 0;
        for node in self.nodes.iter_mut() {
            if node.is_alive() && !seen.contains(&node.key()) {
                node.set_alive(false);
                count += 1;
            }
        }
        count
    }
}

pub struct Registry<T> {
    name: &'static str,
    inner: RwLock<Inner<T>>,
}

impl<T: RegistryEntry> Registry<T> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            inner: RwLock::new(Inner {
                nodes: Vec::new(),
                index: HashMap::new(),
                last_update: 0,
                scanning: false,
            }),
        }
    }

    /// Insert or replace by key. Returns true if the record was new.
    #[cfg(test)]
    pub async fn upsert(&self, record: T) -> bool {
        self.inner.write().await.upsert(record)
    }

    pub async fn get(&self, key: &str) -> Option<T> {
        let inner = self.inner.read().await;
        inner.index.get(key).map(|&idx| inner.nodes[idx].clone())
    }

    /// Copy of the registry for readers
    pub async fn snapshot(&self) -> RegistryView<T> {
        let inner = self.inner.read().await;
        RegistryView {
            nodes: inner.nodes.clone(),
            last_update: inner.last_update,
            scanning: inner.scanning,
        }
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.nodes.len()
    }

    #[cfg(test)]
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn alive_count(&self) -> usize {
        self.inner
            .read()
            .await
            .nodes
            .iter()
            .filter(|node| node.is_alive())
            .count()
    }

    pub async fn begin_scan(&self) {
        self.inner.write().await.scanning = true;
    }

    /// Clear `scanning` without publishing anything
    pub async fn abort_scan(&self) {
        self.inner.write().await.scanning = false;
    }

    #[cfg(test)]
    pub async fn mark_stale_except(&self, seen: &HashSet<String>) -> usize {
        self.inner.write().await.mark_stale_except(seen)
    }

    /// Publish a pass in one critical section: upsert every record, force
    /// the tombstoned keys dead, and tombstone every row the pass missed.
    pub async fn apply_pass(&self, records: Vec<T>, tombstones: &HashSet<String>) -> PassOutcome {
        let mut inner = self.inner.write().await;
        let mut outcome = PassOutcome::default();
        let mut seen = HashSet::with_capacity(records.len());

        for record in records {
            let key = record.key();
            if tombstones.contains(&key) {
                continue;
            }
            seen.insert(key);
            if inner.upsert(record) {
                outcome.inserted += 1;
            } else {
                outcome.updated += 1;
            }
        }

        outcome.tombstoned = inner.mark_stale_except(&seen);
        inner.last_update = unix_now();
        inner.scanning = false;

        debug!(
            "{} registry: {} new, {} updated, {} tombstoned ({} rows)",
            self.name,
            outcome.inserted,
            outcome.updated,
            outcome.tombstoned,
            inner.nodes.len()
        );

        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SnapshotNode;

    fn snapshot_node(ip: &str, checksum: &str, size: u64) -> SnapshotNode {
        SnapshotNode {
            ip: ip.parse().unwrap(),
            port: 8080,
            checksum: checksum.to_string(),
            size,
            alive: true,
            synced: true,
            block_height: 1000,
            last_seen: 1,
        }
    }

    #[tokio::test]
    async fn test_upsert_updates_in_place() {
        let registry = Registry::new("snapshots");

        assert!(registry.upsert(snapshot_node("203.0.113.9", "aaaa", 10)).await);
        assert!(registry.upsert(snapshot_node("203.0.113.10", "bbbb", 20)).await);
        assert!(!registry.upsert(snapshot_node("203.0.113.9", "cccc", 30)).await);

        let view = registry.snapshot().await;
        assert_eq!(view.nodes.len(), 2);
        // Order of first discovery is kept
        assert_eq!(view.nodes[0].checksum, "cccc");
        assert_eq!(view.nodes[1].checksum, "bbbb");
    }

    #[tokio::test]
    async fn test_apply_pass_tombstones_missing_rows() {
        let registry = Registry::new("snapshots");
        registry
            .apply_pass(
                vec![snapshot_node("203.0.113.9", "aaaa", 10), snapshot_node("203.0.113.10", "bbbb", 20)],
                &HashSet::new(),
            )
            .await;

        let before = registry.get("203.0.113.10").await.unwrap();
        let outcome = registry
            .apply_pass(vec![snapshot_node("203.0.113.9", "aaaa", 11)], &HashSet::new())
            .await;

        assert_eq!(outcome, PassOutcome { inserted: 0, updated: 1, tombstoned: 1 });

        let after = registry.get("203.0.113.10").await.unwrap();
        assert!(!after.alive);
        assert_eq!(after, SnapshotNode { alive: false, ..before });
        assert_eq!(registry.len().await, 2);
        assert_eq!(registry.alive_count().await, 1);
    }

    #[tokio::test]
    async fn test_explicit_tombstone_wins() {
        let registry = Registry::new("snapshots");
        registry
            .apply_pass(vec![snapshot_node("203.0.113.9", "abcd", 1024)], &HashSet::new())
            .await;

        let tombstones: HashSet<String> = ["203.0.113.9".to_string()].into_iter().collect();
        let outcome = registry
            .apply_pass(vec![snapshot_node("203.0.113.9", "", 0)], &tombstones)
            .await;

        assert_eq!(outcome.tombstoned, 1);
        let node = registry.get("203.0.113.9").await.unwrap();
        assert!(!node.alive);
        assert_eq!(node.checksum, "abcd");
        assert_eq!(node.size, 1024);
    }

    #[tokio::test]
    async fn test_scanning_flag() {
        let registry: Registry<SnapshotNode> = Registry::new("snapshots");
        assert_eq!(registry.snapshot().await.last_update, 0);

        registry.begin_scan().await;
        assert!(registry.snapshot().await.scanning);

        registry.abort_scan().await;
        let view = registry.snapshot().await;
        assert!(!view.scanning);
        assert_eq!(view.last_update, 0);

        registry.begin_scan().await;
        registry.apply_pass(Vec::new(), &HashSet::new()).await;
        let view = registry.snapshot().await;
        assert!(!view.scanning);
        assert!(view.last_update > 0);
    }

    #[tokio::test]
    async fn test_mark_stale_except() {
        let registry = Registry::new("snapshots");
        registry.upsert(snapshot_node("203.0.113.9", "aaaa", 10)).await;
        registry.upsert(snapshot_node("203.0.113.10", "bbbb", 20)).await;

        let seen: HashSet<String> = ["203.0.113.9".to_string()].into_iter().collect();
        assert_eq!(registry.mark_stale_except(&seen).await, 1);
        // Already dead rows are not counted twice
        assert_eq!(registry.mark_stale_except(&seen).await, 0);
    }
}
