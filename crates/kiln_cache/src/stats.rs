//! Counters describing how much work signature computation did.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use serde::Serialize;

/// Lock-free counters shared by every worker signing files in one run.
///
/// Passed by reference into signature computation rather than living in a
/// global, so independent runs (and tests) never see each other's numbers.
#[derive(Debug, Default)]
pub struct SignatureStats {
    digest_cache_hits: AtomicU64,
    file_digest_count: AtomicU64,
    file_digest_time_ns: AtomicU64,
}

impl SignatureStats {
    /// Creates a zeroed set of counters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that a content digest was served from the digest cache.
    pub fn record_digest_cache_hit(&self) {
        self.digest_cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    /// Starts timing a content digest recomputation.
    ///
    /// The recompute count is bumped immediately; the elapsed time is added
    /// when the returned guard is dropped.
    pub fn time_file_digest(&self) -> TimingScope<'_> {
        TimingScope::new(&self.file_digest_count, &self.file_digest_time_ns)
    }

    /// Number of digests served from the cache.
    pub fn digest_cache_hits(&self) -> u64 {
        self.digest_cache_hits.load(Ordering::Relaxed)
    }

    /// Number of digests recomputed from file contents.
    pub fn file_digest_count(&self) -> u64 {
        self.file_digest_count.load(Ordering::Relaxed)
    }

    /// Total time spent recomputing digests.
    pub fn file_digest_time(&self) -> Duration {
        Duration::from_nanos(self.file_digest_time_ns.load(Ordering::Relaxed))
    }

    /// Takes a point-in-time copy of all counters.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            digest_cache_hits: self.digest_cache_hits(),
            file_digest_count: self.file_digest_count(),
            file_digest_time_ms: self.file_digest_time().as_secs_f64() * 1000.0,
        }
    }
}

/// Plain copy of [`SignatureStats`] for reporting.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StatsSnapshot {
    /// Digests served from the cache.
    pub digest_cache_hits: u64,
    /// Digests recomputed from file contents.
    pub file_digest_count: u64,
    /// Milliseconds spent recomputing digests.
    pub file_digest_time_ms: f64,
}

/// Guard that adds its lifetime to a cumulative timer on drop.
pub struct TimingScope<'a> {
    time_ns: &'a AtomicU64,
    start: Instant,
}

impl<'a> TimingScope<'a> {
    fn new(count: &'a AtomicU64, time_ns: &'a AtomicU64) -> Self {
        count.fetch_add(1, Ordering::Relaxed);
        Self {
            time_ns,
            start: Instant::now(),
        }
    }
}

impl Drop for TimingScope<'_> {
    fn drop(&mut self) {
        let elapsed = u64::try_from(self.start.elapsed().as_nanos()).unwrap_or(u64::MAX);
        self.time_ns.fetch_add(elapsed, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_at_zero() {
        let stats = SignatureStats::new();
        assert_eq!(stats.digest_cache_hits(), 0);
        assert_eq!(stats.file_digest_count(), 0);
        assert_eq!(stats.file_digest_time(), Duration::ZERO);
    }

    #[test]
    fn hits_accumulate() {
        let stats = SignatureStats::new();
        stats.record_digest_cache_hit();
        stats.record_digest_cache_hit();
        assert_eq!(stats.digest_cache_hits(), 2);
    }

    #[test]
    fn timing_scope_counts_and_times() {
        let stats = SignatureStats::new();
        {
            let _scope = stats.time_file_digest();
            std::thread::sleep(Duration::from_millis(2));
        }
        assert_eq!(stats.file_digest_count(), 1);
        assert!(stats.file_digest_time() >= Duration::from_millis(2));
    }

    #[test]
    fn counters_are_shared_across_threads() {
        let stats = SignatureStats::new();
        std::thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| {
                    for _ in 0..100 {
                        stats.record_digest_cache_hit();
                    }
                });
            }
        });
        assert_eq!(stats.digest_cache_hits(), 800);
    }

    #[test]
    fn snapshot_serializes() {
        let stats = SignatureStats::new();
        stats.record_digest_cache_hit();
        let json = serde_json::to_string(&stats.snapshot()).unwrap();
        assert!(json.contains("\"digest_cache_hits\":1"));
    }
}
