//! High-level signing session for one build run.
//!
//! A `SignatureSession` owns the per-run [`StatCache`], the persistent
//! [`DigestCache`], and the run's [`SignatureStats`], and signs build steps
//! against a fixed extension policy. It is `Sync`; worker threads share one
//! session by reference while each owns the running hash of its own step.

use std::path::Path;
use std::time::Duration;

use kiln_common::{ContentHash, HashState};

use crate::digest_cache::DigestCache;
use crate::error::CacheError;
use crate::signature::{compute_file_signature, path_hash};
use crate::stat_cache::StatCache;
use crate::stats::SignatureStats;

/// Caches and policy for signing the inputs of every step in one run.
pub struct SignatureSession {
    stat_cache: StatCache,
    digest_cache: DigestCache,
    stats: SignatureStats,
    verify_extension_hashes: Vec<u32>,
}

impl SignatureSession {
    /// Creates a session around an existing digest cache.
    pub fn new(digest_cache: DigestCache, verify_extension_hashes: Vec<u32>) -> Self {
        Self {
            stat_cache: StatCache::new(),
            digest_cache,
            stats: SignatureStats::new(),
            verify_extension_hashes,
        }
    }

    /// Loads the digest cache at `cache_file` and starts a fresh run.
    ///
    /// Fail-safe like [`DigestCache::load`]: a bad cache file only costs
    /// rehashing.
    pub fn open(cache_file: &Path, max_age: Duration, verify_extension_hashes: Vec<u32>) -> Self {
        Self::new(DigestCache::load(cache_file, max_age), verify_extension_hashes)
    }

    /// Folds the signature of one file into `out`.
    pub fn sign_file(&self, out: &mut HashState, path: &Path) {
        compute_file_signature(
            out,
            &self.stat_cache,
            &self.digest_cache,
            &self.stats,
            path,
            path_hash(path),
            &self.verify_extension_hashes,
        );
    }

    /// Signs a step's inputs in the given order and returns the step signature.
    pub fn sign_step<P: AsRef<Path>>(&self, inputs: &[P]) -> ContentHash {
        let mut out = HashState::new();
        for input in inputs {
            self.sign_file(&mut out, input.as_ref());
        }
        out.finalize()
    }

    /// Persists the digest cache. Returns the number of entries written.
    pub fn save(&self) -> Result<usize, CacheError> {
        self.digest_cache.save()
    }

    /// The per-run stat cache.
    pub fn stat_cache(&self) -> &StatCache {
        &self.stat_cache
    }

    /// The persistent digest cache.
    pub fn digest_cache(&self) -> &DigestCache {
        &self.digest_cache
    }

    /// Counters for this run.
    pub fn stats(&self) -> &SignatureStats {
        &self.stats
    }
}
