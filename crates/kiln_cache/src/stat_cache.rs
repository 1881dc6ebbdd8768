//! Per-run memoization of file existence and modification time.

use std::fs::Metadata;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::UNIX_EPOCH;

use kiln_common::ABSENT_SENTINEL;

use crate::shard::ShardedMap;

/// Snapshot of a file's existence and modification time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileInfo {
    /// Whether the file existed when it was queried.
    pub exists: bool,
    /// Modification time in nanoseconds since the Unix epoch; zero when the
    /// file does not exist. Never equal to [`ABSENT_SENTINEL`].
    pub timestamp: u64,
}

impl FileInfo {
    /// The value reported for a path that could not be stat'ed.
    pub const MISSING: FileInfo = FileInfo {
        exists: false,
        timestamp: 0,
    };

    /// Queries the filesystem directly, bypassing any cache.
    ///
    /// Any failure to read metadata is reported as a missing file.
    pub fn query(path: &Path) -> Self {
        match std::fs::metadata(path) {
            Ok(meta) => Self {
                exists: true,
                timestamp: timestamp_of(&meta),
            },
            Err(_) => Self::MISSING,
        }
    }
}

fn timestamp_of(meta: &Metadata) -> u64 {
    let Ok(modified) = meta.modified() else {
        return 0;
    };
    match modified.duration_since(UNIX_EPOCH) {
        Ok(since) => u64::try_from(since.as_nanos())
            .unwrap_or(u64::MAX)
            .min(ABSENT_SENTINEL - 1),
        Err(_) => 0,
    }
}

/// Memoizes [`FileInfo`] lookups for the duration of one build run.
///
/// The first query for a path pays one `stat` call; later queries from any
/// thread are served from memory. A fresh `StatCache` must be created for each
/// run because the filesystem may have changed in between.
pub struct StatCache {
    entries: ShardedMap<FileInfo>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl StatCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self {
            entries: ShardedMap::new(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Returns existence and timestamp for `path`.
    ///
    /// `path_hash` must be the same value every time a given path is queried;
    /// it selects the shard. The filesystem is queried without holding a lock.
    /// If two threads race on the same miss, the first inserted value wins
    /// and both callers return it.
    pub fn stat(&self, path: &Path, path_hash: u32) -> FileInfo {
        let shard = self.entries.shard(path_hash);
        if let Some(info) = shard.read().get(path) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return *info;
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let info = FileInfo::query(path);
        *shard.write().entry(path.to_path_buf()).or_insert(info)
    }

    /// Forgets the memoized entry for `path`, forcing the next `stat` to hit
    /// the filesystem. Used after the build writes to a file.
    pub fn mark_dirty(&self, path: &Path, path_hash: u32) {
        self.entries.shard(path_hash).write().remove(path);
    }

    /// Number of lookups served from memory.
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    /// Number of lookups that queried the filesystem.
    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    /// Number of memoized paths.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing has been memoized yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for StatCache {
    fn default() -> Self {
        Self::new()
    }
}
