//! Shared foundational types used across the Kiln build engine.
//!
//! This crate provides the content hashing primitives that every build step
//! signature is built from.

#![warn(missing_docs)]

pub mod hash;

pub use hash::{djb2_hash, ContentHash, DigestAlgorithm, HashState, ABSENT_SENTINEL};
