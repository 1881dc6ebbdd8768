//! Per-file signatures folded into a build step's running hash.
//!
//! Each input file contributes either its modification time or a digest of
//! its contents, depending on whether its extension is in the caller's
//! verification set. Every failure mode is encoded as a distinct, deterministic
//! contribution instead of being reported, so signing never aborts a build.

use std::fs::File;
use std::io::{ErrorKind, Read};
use std::path::Path;

use kiln_common::{djb2_hash, ContentHash, DigestAlgorithm, HashState, ABSENT_SENTINEL};

use crate::digest_cache::DigestCache;
use crate::stat_cache::StatCache;
use crate::stats::SignatureStats;

/// Appended when a file exists but could not be opened.
pub const MISSING_MARKER: &str = "<missing>";

/// Appended when a file was opened but reading it failed part way.
pub const READ_ERROR_MARKER: &str = "<read-error>";

/// Size of each read while streaming a file into its digest.
const READ_CHUNK: usize = 8192;

/// Hash of a path's raw bytes, as expected by [`StatCache`] and [`DigestCache`].
pub fn path_hash(path: &Path) -> u32 {
    djb2_hash(path.as_os_str().as_encoded_bytes())
}

/// Hash of the text after the last `.` in `path`, or `None` if there is no `.`.
///
/// The path is inspected byte for byte, so a dot in a directory name counts.
pub fn extension_hash(path: &Path) -> Option<u32> {
    let bytes = path.as_os_str().as_encoded_bytes();
    let dot = bytes.iter().rposition(|&b| b == b'.')?;
    Some(djb2_hash(&bytes[dot + 1..]))
}

/// Folds the signature of `path` into `out`.
///
/// Files whose extension hash appears in `verify_extension_hashes` are signed
/// by content digest (cached across runs by modification time); all others
/// are signed by modification time alone. A missing file contributes
/// [`ABSENT_SENTINEL`] in both cases.
pub fn compute_file_signature(
    out: &mut HashState,
    stat_cache: &StatCache,
    digest_cache: &DigestCache,
    stats: &SignatureStats,
    path: &Path,
    path_hash: u32,
    verify_extension_hashes: &[u32],
) {
    compute_file_signature_with::<HashState>(
        out,
        stat_cache,
        digest_cache,
        stats,
        path,
        path_hash,
        verify_extension_hashes,
    );
}

/// Like [`compute_file_signature`], digesting file contents with `A`.
pub fn compute_file_signature_with<A: DigestAlgorithm>(
    out: &mut HashState,
    stat_cache: &StatCache,
    digest_cache: &DigestCache,
    stats: &SignatureStats,
    path: &Path,
    path_hash: u32,
    verify_extension_hashes: &[u32],
) {
    let verify = extension_hash(path).is_some_and(|h| verify_extension_hashes.contains(&h));
    if verify {
        sign_by_content::<A>(out, stat_cache, digest_cache, stats, path, path_hash);
    } else {
        sign_by_timestamp(out, stat_cache, path, path_hash);
    }
}

fn sign_by_timestamp(out: &mut HashState, stat_cache: &StatCache, path: &Path, path_hash: u32) {
    let info = stat_cache.stat(path, path_hash);
    if info.exists {
        out.add_integer(info.timestamp);
    } else {
        out.add_integer(ABSENT_SENTINEL);
    }
}

fn sign_by_content<A: DigestAlgorithm>(
    out: &mut HashState,
    stat_cache: &StatCache,
    digest_cache: &DigestCache,
    stats: &SignatureStats,
    path: &Path,
    path_hash: u32,
) {
    let info = stat_cache.stat(path, path_hash);
    if !info.exists {
        out.add_integer(ABSENT_SENTINEL);
        return;
    }

    if let Some(digest) = digest_cache.get(path, path_hash, info.timestamp) {
        stats.record_digest_cache_hit();
        out.update(digest.as_bytes());
        return;
    }

    let digest = {
        let _timing = stats.time_file_digest();
        match digest_file::<A>(path) {
            Ok(digest) => {
                digest_cache.set(path, path_hash, info.timestamp, digest);
                digest
            }
            Err(DigestFailure::Open(e)) => {
                log::debug!("cannot open {} for digest: {e}", path.display());
                out.add_string(MISSING_MARKER);
                return;
            }
            Err(DigestFailure::Read(e)) => {
                log::warn!("read failed while digesting {}: {e}", path.display());
                out.add_string(READ_ERROR_MARKER);
                return;
            }
        }
    };
    log::trace!("digested {} -> {digest}", path.display());
    out.update(digest.as_bytes());
}

enum DigestFailure {
    Open(std::io::Error),
    Read(std::io::Error),
}

/// Streams a file through `A` in bounded chunks.
fn digest_file<A: DigestAlgorithm>(path: &Path) -> Result<ContentHash, DigestFailure> {
    let mut file = File::open(path).map_err(DigestFailure::Open)?;
    let mut hasher = A::new();
    let mut buffer = [0u8; READ_CHUNK];
    loop {
        match file.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => hasher.update(&buffer[..n]),
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(DigestFailure::Read(e)),
        }
    }
    Ok(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    struct Fixture {
        _dir: tempfile::TempDir,
        root: PathBuf,
        stat_cache: StatCache,
        digest_cache: DigestCache,
        stats: SignatureStats,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            let root = dir.path().to_path_buf();
            Self {
                _dir: dir,
                root,
                stat_cache: StatCache::new(),
                digest_cache: DigestCache::new(),
                stats: SignatureStats::new(),
            }
        }

        fn write(&self, name: &str, content: &str) -> PathBuf {
            let path = self.root.join(name);
            std::fs::write(&path, content).unwrap();
            path
        }

        fn sign(&self, path: &Path, policy: &[u32]) -> ContentHash {
            let mut out = HashState::new();
            compute_file_signature(
                &mut out,
                &self.stat_cache,
                &self.digest_cache,
                &self.stats,
                path,
                path_hash(path),
                policy,
            );
            out.finalize()
        }
    }

    fn policy(exts: &[&str]) -> Vec<u32> {
        exts.iter().map(|e| djb2_hash(e.as_bytes())).collect()
    }

    fn expected(f: impl FnOnce(&mut HashState)) -> ContentHash {
        let mut h = HashState::new();
        f(&mut h);
        h.finalize()
    }

    #[test]
    fn extension_is_text_after_last_dot() {
        assert_eq!(extension_hash(Path::new("a/b.tar.gz")), Some(djb2_hash(b"gz")));
        assert_eq!(extension_hash(Path::new("a/b.")), Some(djb2_hash(b"")));
        assert_eq!(extension_hash(Path::new("Makefile")), None);
    }

    #[test]
    fn dotted_directory_is_not_an_extension_match() {
        assert_eq!(extension_hash(Path::new("lib.d/readme")), Some(djb2_hash(b"d/readme")));
    }

    #[test]
    fn content_signature_is_digest_bytes() {
        let fx = Fixture::new();
        let path = fx.write("foo.c", "hello");
        let sig = fx.sign(&path, &policy(&["c"]));
        let digest = ContentHash::from_bytes(b"hello");
        assert_eq!(sig, expected(|h| h.update(digest.as_bytes())));
        assert_eq!(fx.stats.file_digest_count(), 1);
        assert_eq!(fx.stats.digest_cache_hits(), 0);
    }

    #[test]
    fn second_content_signature_hits_cache() {
        let fx = Fixture::new();
        let path = fx.write("foo.c", "hello");
        let first = fx.sign(&path, &policy(&["c"]));
        let second = fx.sign(&path, &policy(&["c"]));
        assert_eq!(first, second);
        assert_eq!(fx.stats.file_digest_count(), 1);
        assert_eq!(fx.stats.digest_cache_hits(), 1);
    }

    #[test]
    fn timestamp_signature_is_mtime() {
        let fx = Fixture::new();
        let path = fx.write("foo.txt", "hello");
        let ts = fx.stat_cache.stat(&path, path_hash(&path)).timestamp;
        let sig = fx.sign(&path, &policy(&["c"]));
        assert_eq!(sig, expected(|h| h.add_integer(ts)));
        assert_eq!(fx.stats.file_digest_count(), 0);
        assert_eq!(fx.stats.digest_cache_hits(), 0);
        assert!(fx.digest_cache.is_empty());
    }

    #[test]
    fn missing_file_gives_sentinel_in_both_modes() {
        let fx = Fixture::new();
        let path = fx.root.join("nope.c");
        let sentinel = expected(|h| h.add_integer(ABSENT_SENTINEL));
        assert_eq!(fx.sign(&path, &policy(&["c"])), sentinel);
        assert_eq!(fx.sign(&path, &[]), sentinel);
        assert_eq!(fx.stats.file_digest_count(), 0);
    }

    #[test]
    fn no_extension_uses_timestamp() {
        let fx = Fixture::new();
        let path = fx.write("Makefile", "all:");
        let ts = fx.stat_cache.stat(&path, path_hash(&path)).timestamp;
        assert_eq!(fx.sign(&path, &policy(&["", "Makefile"])), expected(|h| h.add_integer(ts)));
    }

    #[test]
    fn extension_match_is_case_sensitive() {
        let fx = Fixture::new();
        let path = fx.write("x.C", "int x;");
        let ts = fx.stat_cache.stat(&path, path_hash(&path)).timestamp;
        assert_eq!(fx.sign(&path, &policy(&["c"])), expected(|h| h.add_integer(ts)));

        let digest = ContentHash::from_bytes(b"int x;");
        assert_eq!(
            fx.sign(&path, &policy(&["c", "C"])),
            expected(|h| h.update(digest.as_bytes()))
        );
    }

    #[test]
    fn open_failure_appends_missing_marker() {
        let fx = Fixture::new();
        let path = fx.write("raced.c", "content");
        // Memoize "exists", then delete so the open fails.
        assert!(fx.stat_cache.stat(&path, path_hash(&path)).exists);
        std::fs::remove_file(&path).unwrap();

        let sig = fx.sign(&path, &policy(&["c"]));
        assert_eq!(sig, expected(|h| h.add_string(MISSING_MARKER)));
        assert!(fx.digest_cache.is_empty());
        assert_ne!(sig, expected(|h| h.add_integer(ABSENT_SENTINEL)));
    }

    #[cfg(unix)]
    #[test]
    fn read_failure_appends_read_error_marker() {
        let fx = Fixture::new();
        let path = fx.root.join("headers.h");
        std::fs::create_dir(&path).unwrap();

        let sig = fx.sign(&path, &policy(&["h"]));
        assert_eq!(sig, expected(|h| h.add_string(READ_ERROR_MARKER)));
        assert!(fx.digest_cache.is_empty());
    }

    #[test]
    fn duplicate_policy_entries_are_harmless() {
        let fx = Fixture::new();
        let path = fx.write("a.c", "a");
        let once = fx.sign(&path, &policy(&["c"]));
        let twice = fx.sign(&path, &policy(&["c", "c"]));
        assert_eq!(once, twice);
    }

    #[test]
    fn custom_digest_algorithm_is_used() {
        struct Reversed(Vec<u8>);
        impl DigestAlgorithm for Reversed {
            fn new() -> Self {
                Reversed(Vec::new())
            }
            fn update(&mut self, bytes: &[u8]) {
                self.0.extend_from_slice(bytes);
            }
            fn finalize(mut self) -> ContentHash {
                self.0.reverse();
                ContentHash::from_bytes(&self.0)
            }
        }

        let fx = Fixture::new();
        let path = fx.write("r.c", "abc");
        let mut out = HashState::new();
        compute_file_signature_with::<Reversed>(
            &mut out,
            &fx.stat_cache,
            &fx.digest_cache,
            &fx.stats,
            &path,
            path_hash(&path),
            &policy(&["c"]),
        );
        let digest = ContentHash::from_bytes(b"cba");
        assert_eq!(out.finalize(), expected(|h| h.update(digest.as_bytes())));
    }

    #[test]
    fn large_file_streams_in_chunks() {
        let fx = Fixture::new();
        let content: String = (0..READ_CHUNK * 3 + 17)
            .map(|i| char::from(b'a' + (i % 26) as u8))
            .collect();
        let path = fx.write("big.c", &content);
        let digest = ContentHash::from_bytes(content.as_bytes());
        assert_eq!(
            fx.sign(&path, &policy(&["c"])),
            expected(|h| h.update(digest.as_bytes()))
        );
    }
}
