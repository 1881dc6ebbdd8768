//! Configuration file loading and validation.

use crate::error::ConfigError;
use crate::types::{ProjectConfig, SignatureMode};
use std::collections::BTreeMap;
use std::path::Path;

/// Name of the configuration file looked up in a project directory.
pub const CONFIG_FILE: &str = "kiln.toml";

/// Loads and validates `kiln.toml` from a project directory.
///
/// A project without a `kiln.toml` gets the default configuration, in which
/// every file is signed by timestamp.
pub fn load_config(project_dir: &Path) -> Result<ProjectConfig, ConfigError> {
    let config_path = project_dir.join(CONFIG_FILE);
    match std::fs::read_to_string(&config_path) {
        Ok(content) => load_config_from_str(&content),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            log::debug!("no {} in {}, using defaults", CONFIG_FILE, project_dir.display());
            Ok(ProjectConfig::default())
        }
        Err(e) => Err(e.into()),
    }
}

/// Loads and validates a configuration from an explicit file path.
///
/// Unlike [`load_config`], a missing file is an error.
pub fn load_config_file(path: &Path) -> Result<ProjectConfig, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    load_config_from_str(&content)
}

/// Parses and validates a `kiln.toml` configuration from a string.
pub fn load_config_from_str(content: &str) -> Result<ProjectConfig, ConfigError> {
    let config: ProjectConfig =
        toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
    validate_config(&config)?;
    Ok(config)
}

/// Validates extension keys and rejects contradictory entries.
fn validate_config(config: &ProjectConfig) -> Result<(), ConfigError> {
    let mut seen: BTreeMap<&str, SignatureMode> = BTreeMap::new();
    for (key, mode) in &config.signatures.extensions {
        let ext = key.strip_prefix('.').unwrap_or(key);
        if ext.is_empty() {
            return Err(ConfigError::ValidationError(format!(
                "empty extension key '{key}'"
            )));
        }
        if ext.contains('/') {
            return Err(ConfigError::ValidationError(format!(
                "extension '{key}' contains a path separator"
            )));
        }
        if let Some(prev) = seen.insert(ext, *mode) {
            if prev != *mode {
                return Err(ConfigError::ValidationError(format!(
                    "extension '{ext}' is listed as both content and timestamp"
                )));
            }
        }
    }
    Ok(())
}
