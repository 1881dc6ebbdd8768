//! Content hashing for file signatures and incremental rebuild detection.
//!
//! Provides the fixed-size [`ContentHash`] digest, the streaming [`HashState`]
//! accumulator that build steps fold their input signatures into, and the
//! [`djb2_hash`] string hash used for path and extension keys.

use serde::{Deserialize, Serialize};
use std::fmt;
use xxhash_rust::xxh3::Xxh3;

/// Value appended by [`HashState::add_integer`] for a file that does not exist.
///
/// Real timestamps are saturated below this value, so it can never be
/// produced by an existing file.
pub const ABSENT_SENTINEL: u64 = u64::MAX;

/// A 128-bit content hash computed using XXH3.
///
/// Two files with the same `ContentHash` are assumed to have identical content.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentHash([u8; 16]);

impl ContentHash {
    /// Size of a digest in bytes.
    pub const LEN: usize = 16;

    /// Computes a content hash from a byte slice using XXH3-128.
    pub fn from_bytes(data: &[u8]) -> Self {
        let hash = xxhash_rust::xxh3::xxh3_128(data);
        Self(hash.to_le_bytes())
    }

    /// Wraps raw digest bytes without hashing them.
    pub fn from_raw(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    /// Returns the raw digest bytes.
    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

impl AsRef<[u8]> for ContentHash {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({:02x}{:02x}..)", self.0[0], self.0[1])
    }
}

/// An incremental digest algorithm producing a [`ContentHash`].
///
/// File contents are streamed through an implementation of this trait, so the
/// concrete algorithm can be swapped without touching the signature logic.
pub trait DigestAlgorithm {
    /// Creates a fresh accumulator.
    fn new() -> Self;

    /// Feeds more bytes into the accumulator.
    fn update(&mut self, bytes: &[u8]);

    /// Consumes the accumulator and returns the digest.
    fn finalize(self) -> ContentHash;
}

/// Streaming XXH3-128 accumulator.
///
/// A build step owns one `HashState` and appends the signature of each of its
/// inputs in order. Appends are order-sensitive: the same inputs folded in a
/// different order yield a different digest.
#[derive(Clone)]
pub struct HashState {
    inner: Xxh3,
}

impl HashState {
    /// Creates an empty accumulator.
    pub fn new() -> Self {
        Self { inner: Xxh3::new() }
    }

    /// Appends raw bytes.
    pub fn update(&mut self, bytes: &[u8]) {
        self.inner.update(bytes);
    }

    /// Appends a `u64` as 8 little-endian bytes.
    ///
    /// [`ABSENT_SENTINEL`] is reserved for missing files.
    pub fn add_integer(&mut self, value: u64) {
        self.inner.update(&value.to_le_bytes());
    }

    /// Appends a string prefixed with its length, so that consecutive
    /// strings cannot alias (`"ab" + "c"` differs from `"a" + "bc"`).
    pub fn add_string(&mut self, s: &str) {
        self.add_integer(s.len() as u64);
        self.inner.update(s.as_bytes());
    }

    /// Returns the digest of everything appended so far.
    pub fn finalize(&self) -> ContentHash {
        ContentHash(self.inner.digest128().to_le_bytes())
    }
}

impl Default for HashState {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for HashState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HashState")
            .field("digest", &self.finalize())
            .finish()
    }
}

impl DigestAlgorithm for HashState {
    fn new() -> Self {
        HashState::new()
    }

    fn update(&mut self, bytes: &[u8]) {
        HashState::update(self, bytes);
    }

    fn finalize(self) -> ContentHash {
        HashState::finalize(&self)
    }
}

/// The djb2 string hash.
///
/// Used for both path hashes and extension hashes. Callers building an
/// extension policy must use this same function, otherwise no extension will
/// ever match.
pub fn djb2_hash(bytes: &[u8]) -> u32 {
    bytes.iter().fold(5381u32, |hash, &b| {
        hash.wrapping_shl(5).wrapping_add(hash).wrapping_add(u32::from(b))
    })
}
