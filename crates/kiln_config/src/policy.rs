//! The set of extensions whose files are signed by content.

use kiln_common::djb2_hash;

/// Extension hashes that require content verification.
///
/// Hashes are computed with [`djb2_hash`] over the extension text without its
/// leading dot, which is the same function the signature code applies to each
/// path. Membership is a linear scan; duplicates are harmless.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtensionPolicy {
    hashes: Vec<u32>,
}

impl ExtensionPolicy {
    /// Creates an empty policy (every file is signed by timestamp).
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a policy from extension names. A leading `.` is ignored, so
    /// `".c"` and `"c"` are the same entry. Matching is case-sensitive.
    pub fn from_extensions<'a>(extensions: impl IntoIterator<Item = &'a str>) -> Self {
        let mut policy = Self::new();
        for ext in extensions {
            policy.insert(ext);
        }
        policy
    }

    /// Adds an extension to the policy.
    pub fn insert(&mut self, ext: &str) {
        let ext = ext.strip_prefix('.').unwrap_or(ext);
        self.hashes.push(djb2_hash(ext.as_bytes()));
    }

    /// Returns `true` if files with this extension are signed by content.
    pub fn requires_content(&self, ext: &str) -> bool {
        let ext = ext.strip_prefix('.').unwrap_or(ext);
        self.hashes.contains(&djb2_hash(ext.as_bytes()))
    }

    /// The raw extension hashes, in insertion order.
    pub fn hashes(&self) -> &[u32] {
        &self.hashes
    }

    /// Returns `true` if no extension requires content verification.
    pub fn is_empty(&self) -> bool {
        self.hashes.is_empty()
    }
}
