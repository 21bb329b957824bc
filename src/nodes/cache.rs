//! Output cache for node execution
//!
//! Every successful execution stores its outputs here, keyed by node and
//! output port. Staleness propagation evicts the entries of stale nodes, so
//! a present entry always belongs to a node that is up to date.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::interface::NodeData;
use super::node::NodeId;

/// Key of one cached output value
#[derive(Hash, Eq, PartialEq, Clone, Copy, Debug, Serialize, Deserialize)]
pub struct CacheKey {
    /// The node that produced this cached data
    pub node_id: NodeId,
    /// Output port index
    pub port_index: usize,
}

impl CacheKey {
    pub fn new(node_id: NodeId, port_index: usize) -> Self {
        Self { node_id, port_index }
    }
}

/// Statistics about cache usage
#[derive(Debug, Default, Clone, PartialEq)]
pub struct CacheStatistics {
    pub total_entries: usize,
    pub cache_hits: usize,
    pub cache_misses: usize,
    /// Entries evicted by invalidation
    pub cache_invalidations: usize,
}

impl CacheStatistics {
    pub fn hit_ratio(&self) -> f32 {
        let total_accesses = self.cache_hits + self.cache_misses;
        if total_accesses == 0 {
            0.0
        } else {
            self.cache_hits as f32 / total_accesses as f32
        }
    }
}

/// Cached outputs of one graph
#[derive(Debug, Default)]
pub struct OutputCache {
    cache: HashMap<CacheKey, NodeData>,
    stats: CacheStatistics,
}

impl OutputCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: CacheKey, data: NodeData) {
        if self.cache.insert(key, data).is_none() {
            self.stats.total_entries += 1;
        }
    }

    /// Retrieve data, counting the access as a hit or miss
    pub fn get(&mut self, key: &CacheKey) -> Option<&NodeData> {
        if self.cache.contains_key(key) {
            self.stats.cache_hits += 1;
        } else {
            self.stats.cache_misses += 1;
        }
        self.cache.get(key)
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.cache.contains_key(key)
    }

    /// Evict every output of `node_id`, returning how many were removed
    pub fn invalidate_node(&mut self, node_id: NodeId) -> usize {
        let before = self.cache.len();
        self.cache.retain(|key, _| key.node_id != node_id);
        let removed_count = before - self.cache.len();
        self.stats.total_entries -= removed_count;
        self.stats.cache_invalidations += removed_count;
        removed_count
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    pub fn get_statistics(&self) -> &CacheStatistics {
        &self.stats
    }
}
