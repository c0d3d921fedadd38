// SPDX-License-Identifier: AGPL-3.0-or-later
//! Identity cache
//!
//! Maps canonical locations to the node currently alive for them. Only weak
//! references are held, so the cache never keeps a node alive; dead slots
//! are swept every `purge_interval` insertions or on demand.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use crate::location::Location;
use crate::node::Node;

/// Cache statistics
#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    pub entries: u64,
    pub live_entries: u64,
    pub hit_count: u64,
    pub miss_count: u64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hit_count + self.miss_count;
        if total == 0 { 0.0 } else { self.hit_count as f64 / total as f64 }
    }
}

/// One live node per location
pub struct IdentityCache {
    nodes: DashMap<Location, Weak<Node>>,
    hits: AtomicU64,
    misses: AtomicU64,
    inserts: AtomicU64,
    purge_interval: u64,
}

impl IdentityCache {
    pub fn new(purge_interval: u64) -> Self {
        Self {
            nodes: DashMap::new(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            inserts: AtomicU64::new(0),
            purge_interval: purge_interval.max(1),
        }
    }

    /// Live node for `key`, if any.
    pub fn get(&self, key: &Location) -> Option<Arc<Node>> {
        let found = self.nodes.get(key).and_then(|slot| slot.upgrade());
        match &found {
            Some(_) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                tracing::trace!("Identity cache hit: {}", key);
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
            }
        }
        found
    }

    /// Publish `node` under `key` unless another live node got there first,
    /// in which case that one is returned and `node` is discarded.
    pub fn insert_or_get(&self, key: Location, node: Arc<Node>) -> Arc<Node> {
        let winner = match self.nodes.entry(key) {
            Entry::Occupied(mut slot) => match slot.get().upgrade() {
                Some(existing) => {
                    tracing::trace!("Lost insertion race for {}", slot.key());
                    existing
                }
                None => {
                    slot.insert(Arc::downgrade(&node));
                    node
                }
            },
            Entry::Vacant(slot) => {
                slot.insert(Arc::downgrade(&node));
                node
            }
        };

        let inserted = self.inserts.fetch_add(1, Ordering::Relaxed) + 1;
        if inserted % self.purge_interval == 0 {
            self.purge();
        }
        winner
    }

    /// Swap `stale` for `fresh`. If another live node already took the slot,
    /// that node is returned and `fresh` is discarded.
    pub fn replace(&self, key: Location, stale: &Arc<Node>, fresh: Arc<Node>) -> Arc<Node> {
        match self.nodes.entry(key) {
            Entry::Occupied(mut slot) => match slot.get().upgrade() {
                Some(current) if !Arc::ptr_eq(&current, stale) => current,
                _ => {
                    tracing::debug!("Replacing cached node for {}", slot.key());
                    slot.insert(Arc::downgrade(&fresh));
                    fresh
                }
            },
            Entry::Vacant(slot) => {
                slot.insert(Arc::downgrade(&fresh));
                fresh
            }
        }
    }

    /// Drop slots whose node has died; returns how many were removed.
    pub fn purge(&self) -> usize {
        let before = self.nodes.len();
        self.nodes.retain(|_, slot| slot.strong_count() > 0);
        let removed = before.saturating_sub(self.nodes.len());
        if removed > 0 {
            tracing::debug!("Purged {} dead identity cache slots", removed);
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        let live = self
            .nodes
            .iter()
            .filter(|slot| slot.value().strong_count() > 0)
            .count();
        CacheStats {
            entries: self.nodes.len() as u64,
            live_entries: live as u64,
            hit_count: self.hits.load(Ordering::Relaxed),
            miss_count: self.misses.load(Ordering::Relaxed),
        }
    }
}
