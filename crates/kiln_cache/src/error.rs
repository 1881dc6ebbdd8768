//! Errors raised while persisting the digest cache.
//!
//! Signature computation never fails, so these only come out of
//! [`DigestCache::save`](crate::DigestCache::save),
//! [`DigestCache::remove_file`](crate::DigestCache::remove_file), and the
//! decoder behind [`DigestCache::load`](crate::DigestCache::load) (which logs
//! them and starts empty).

use std::path::PathBuf;

use kiln_common::ContentHash;

/// Failure reading, writing, or decoding a digest cache file.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// The cache file or its directory could not be read or written.
    #[error("digest cache I/O failed for {path}: {source}")]
    Io {
        /// File or directory being accessed.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// The file is too short or does not start with a digest cache header.
    #[error("{path} is not a digest cache ({reason})")]
    NotACache {
        /// Offending file.
        path: PathBuf,
        /// What was wrong with the header.
        reason: String,
    },

    /// The file was written by a different cache layout.
    #[error("{path} uses digest cache format v{found}, expected v{supported}")]
    FormatVersion {
        /// Offending file.
        path: PathBuf,
        /// Version recorded in the file.
        found: u32,
        /// Version this build reads and writes.
        supported: u32,
    },

    /// The record payload does not hash to the value stored in the header.
    #[error("{path} is corrupt: payload hashes to {actual}, header says {stored}")]
    Corrupt {
        /// Offending file.
        path: PathBuf,
        /// Payload hash recorded in the header.
        stored: ContentHash,
        /// Payload hash actually computed.
        actual: ContentHash,
    },

    /// Records could not be converted to or from bincode.
    #[error("digest cache records could not be encoded: {0}")]
    Encoding(String),
}
