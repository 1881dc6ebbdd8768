//! Configuration types deserialized from `kiln.toml`.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::policy::ExtensionPolicy;

/// Name of the persisted digest cache file inside the cache directory.
const DIGEST_CACHE_FILE: &str = "digests.bin";

/// The top-level project configuration parsed from `kiln.toml`.
#[derive(Debug, Default, Deserialize)]
pub struct ProjectConfig {
    /// How input files are signed, per extension.
    #[serde(default)]
    pub signatures: SignatureConfig,
    /// Location and retention of the persistent digest cache.
    #[serde(default)]
    pub cache: CacheConfig,
}

impl ProjectConfig {
    /// Builds the extension policy from the `[signatures.extensions]` table.
    pub fn extension_policy(&self) -> ExtensionPolicy {
        ExtensionPolicy::from_extensions(
            self.signatures
                .extensions
                .iter()
                .filter(|(_, mode)| **mode == SignatureMode::Content)
                .map(|(ext, _)| ext.as_str()),
        )
    }
}

/// The `[signatures]` section.
#[derive(Debug, Default, Deserialize)]
pub struct SignatureConfig {
    /// Extension (with or without a leading dot) to signing mode.
    ///
    /// Extensions not listed are signed by timestamp.
    #[serde(default)]
    pub extensions: BTreeMap<String, SignatureMode>,
}

/// How a file's signature is derived.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignatureMode {
    /// Hash the full file contents (cached by modification time).
    Content,
    /// Use the modification time alone.
    #[default]
    Timestamp,
}

/// The `[cache]` section.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Cache directory, relative to the project directory unless absolute.
    pub dir: PathBuf,
    /// Digest cache entries not used for this many days are dropped on save.
    pub max_age_days: u32,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from(".kiln-cache"),
            max_age_days: 7,
        }
    }
}

impl CacheConfig {
    /// Returns the path of the digest cache file for a project.
    pub fn digest_cache_file(&self, project_dir: &Path) -> PathBuf {
        project_dir.join(&self.dir).join(DIGEST_CACHE_FILE)
    }

    /// Returns the retention window for digest cache entries.
    pub fn max_age(&self) -> Duration {
        Duration::from_secs(u64::from(self.max_age_days) * 24 * 60 * 60)
    }
}
