//! Path-keyed hash map split into independently locked shards.

use std::collections::HashMap;
use std::path::PathBuf;

use parking_lot::RwLock;

/// Number of shards. Must be a power of two.
const SHARD_COUNT: usize = 64;

/// A map from paths to values, partitioned by the caller's path hash.
///
/// Each shard has its own lock, so threads working on different paths
/// rarely contend.
pub(crate) struct ShardedMap<V> {
    shards: Box<[RwLock<HashMap<PathBuf, V>>]>,
}

impl<V> ShardedMap<V> {
    pub(crate) fn new() -> Self {
        let shards = (0..SHARD_COUNT)
            .map(|_| RwLock::new(HashMap::new()))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Self { shards }
    }

    /// Returns the shard holding `path_hash`.
    pub(crate) fn shard(&self, path_hash: u32) -> &RwLock<HashMap<PathBuf, V>> {
        &self.shards[path_hash as usize & (SHARD_COUNT - 1)]
    }

    pub(crate) fn shards(&self) -> impl Iterator<Item = &RwLock<HashMap<PathBuf, V>>> {
        self.shards.iter()
    }

    pub(crate) fn len(&self) -> usize {
        self.shards.iter().map(|s| s.read().len()).sum()
    }
}
