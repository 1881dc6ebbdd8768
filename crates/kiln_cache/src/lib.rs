//! Input file signatures for incremental builds.
//!
//! This crate decides, for every input of a build step, whether to trust its
//! modification time or to verify its contents, and folds the result into the
//! step's running hash. It provides the per-run [`StatCache`], the persistent
//! [`DigestCache`], the [`SignatureStats`] counters, and the
//! [`compute_file_signature`] entry point that ties them together.

#![warn(missing_docs)]

pub mod digest_cache;
pub mod error;
mod persist;
pub mod session;
mod shard;
pub mod signature;
pub mod stat_cache;
pub mod stats;

pub use digest_cache::{DigestCache, DEFAULT_MAX_AGE};
pub use error::CacheError;
pub use session::SignatureSession;
pub use signature::{
    compute_file_signature, compute_file_signature_with, extension_hash, path_hash,
    MISSING_MARKER, READ_ERROR_MARKER,
};
pub use stat_cache::{FileInfo, StatCache};
pub use stats::{SignatureStats, StatsSnapshot, TimingScope};
