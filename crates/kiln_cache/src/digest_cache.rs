//! Cross-run cache of file content digests keyed by modification time.
//!
//! An entry records the digest of a file together with the timestamp the file
//! had when it was hashed. A lookup only succeeds when the caller's current
//! timestamp matches the stored one; anything else is a miss and the file is
//! rehashed. Only the most recent `(timestamp, digest)` pair per path is kept.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use kiln_common::ContentHash;

use crate::error::CacheError;
use crate::persist::{self, DigestRecord};
use crate::shard::ShardedMap;

/// Retention used when no explicit maximum age is configured.
pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(7 * 24 * 60 * 60);

struct Entry {
    path_hash: u32,
    timestamp: u64,
    digest: ContentHash,
    /// Unix seconds; refreshed on every hit without taking the write lock.
    accessed: AtomicU64,
}

impl Entry {
    fn new(path_hash: u32, timestamp: u64, digest: ContentHash, accessed: u64) -> Self {
        Self {
            path_hash,
            timestamp,
            digest,
            accessed: AtomicU64::new(accessed),
        }
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Persistent `(path, timestamp) -> digest` store shared by all workers.
///
/// Reads and writes for different paths proceed in parallel; each shard of the
/// map has its own lock. Callers pick the `path_hash` for a path and must keep
/// using the same one for it; the hash is persisted with each entry so a
/// reloaded cache is sharded exactly as the previous run left it.
pub struct DigestCache {
    entries: ShardedMap<Entry>,
    backing_file: Option<PathBuf>,
    max_age: Duration,
    touched: AtomicBool,
}

impl DigestCache {
    /// Creates an empty, memory-only cache. [`save`](Self::save) is a no-op.
    pub fn new() -> Self {
        Self {
            entries: ShardedMap::new(),
            backing_file: None,
            max_age: DEFAULT_MAX_AGE,
            touched: AtomicBool::new(false),
        }
    }

    /// Loads the cache persisted at `path`.
    ///
    /// This is fail-safe: a missing, unreadable, corrupt, or incompatible file
    /// yields an empty cache (every content digest is recomputed) rather than
    /// an error. The cache will be saved back to the same path.
    pub fn load(path: &Path, max_age: Duration) -> Self {
        let mut cache = Self::new();
        cache.backing_file = Some(path.to_path_buf());
        cache.max_age = max_age;

        let raw = match std::fs::read(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::debug!("no digest cache at {}, starting empty", path.display());
                return cache;
            }
            Err(e) => {
                log::warn!("cannot read digest cache {}: {e}", path.display());
                return cache;
            }
        };

        match persist::decode(&raw, path) {
            Ok(records) => {
                let count = records.len();
                for record in records {
                    let entry = Entry::new(
                        record.path_hash,
                        record.timestamp,
                        record.digest,
                        record.accessed,
                    );
                    cache
                        .entries
                        .shard(record.path_hash)
                        .write()
                        .insert(record.path(), entry);
                }
                log::debug!("loaded {count} digest cache entries from {}", path.display());
            }
            Err(e) => log::warn!("discarding digest cache: {e}"),
        }
        cache
    }

    /// Returns the cached digest for `path` if it was computed at `timestamp`.
    ///
    /// An entry stored under any other timestamp is stale and reported as a
    /// miss.
    pub fn get(&self, path: &Path, path_hash: u32, timestamp: u64) -> Option<ContentHash> {
        let shard = self.entries.shard(path_hash).read();
        let entry = shard.get(path).filter(|e| e.timestamp == timestamp)?;
        entry.accessed.store(unix_now(), Ordering::Relaxed);
        self.touched.store(true, Ordering::Relaxed);
        Some(entry.digest)
    }

    /// Records `digest` for `path` at `timestamp`, replacing any previous entry.
    pub fn set(&self, path: &Path, path_hash: u32, timestamp: u64, digest: ContentHash) {
        self.entries
            .shard(path_hash)
            .write()
            .insert(
                path.to_path_buf(),
                Entry::new(path_hash, timestamp, digest, unix_now()),
            );
        self.touched.store(true, Ordering::Relaxed);
    }

    /// Writes the cache back to the file it was loaded from.
    ///
    /// Entries unused for longer than the configured maximum age are dropped.
    /// Nothing is written if the cache was not used since it was loaded and
    /// no entry has expired. Returns the number of entries persisted.
    pub fn save(&self) -> Result<usize, CacheError> {
        self.save_at(unix_now())
    }

    pub(crate) fn save_at(&self, now: u64) -> Result<usize, CacheError> {
        let Some(path) = &self.backing_file else {
            return Ok(0);
        };
        let records = self.live_records(now);
        let expired = self.len().saturating_sub(records.len());
        if !self.is_dirty() && expired == 0 && path.exists() {
            log::debug!("digest cache unchanged, skipping save");
            return Ok(records.len());
        }

        let bytes = persist::encode(&records)?;
        write_atomically(path, &bytes)?;
        self.touched.store(false, Ordering::Relaxed);

        log::debug!(
            "saved {} digest cache entries to {} ({expired} expired)",
            records.len(),
            path.display(),
        );
        Ok(records.len())
    }

    /// Collects entries used within the retention window, sorted by path.
    fn live_records(&self, now: u64) -> Vec<DigestRecord> {
        let max_age = self.max_age.as_secs();
        let mut records = Vec::with_capacity(self.len());
        for shard in self.entries.shards() {
            for (path, entry) in shard.read().iter() {
                let accessed = entry.accessed.load(Ordering::Relaxed);
                if now.saturating_sub(accessed) > max_age {
                    continue;
                }
                records.push(DigestRecord {
                    path: persist::path_to_bytes(path),
                    path_hash: entry.path_hash,
                    timestamp: entry.timestamp,
                    digest: entry.digest,
                    accessed,
                });
            }
        }
        records.sort_by(|a, b| a.path.cmp(&b.path));
        records
    }

    /// Deletes a persisted cache file. Returns `false` if there was none.
    pub fn remove_file(path: &Path) -> Result<bool, CacheError> {
        match std::fs::remove_file(path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(CacheError::Io {
                path: path.to_path_buf(),
                source: e,
            }),
        }
    }

    /// Returns `true` if entries were read or written since the last save.
    pub fn is_dirty(&self) -> bool {
        self.touched.load(Ordering::Relaxed)
    }

    /// Number of entries held in memory.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The file this cache is persisted to, if any.
    pub fn backing_file(&self) -> Option<&Path> {
        self.backing_file.as_deref()
    }
}

impl Default for DigestCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Writes `bytes` to a sibling temporary file and renames it over `path`, so
/// a crash mid-write never leaves a truncated cache behind.
fn write_atomically(path: &Path, bytes: &[u8]) -> Result<(), CacheError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(io_error(parent))?;
    }

    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".tmp");
    let tmp = path.with_file_name(tmp_name);

    std::fs::write(&tmp, bytes).map_err(io_error(&tmp))?;
    std::fs::rename(&tmp, path).map_err(io_error(path))
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> CacheError {
    let path = path.to_path_buf();
    move |source| CacheError::Io { path, source }
}
