//! Parsing and validation of `kiln.toml` project configuration files.
//!
//! This crate reads the project configuration and produces a strongly-typed
//! [`ProjectConfig`], including the [`ExtensionPolicy`] that decides which
//! input files are signed by content rather than by timestamp.

#![warn(missing_docs)]

pub mod error;
pub mod loader;
pub mod policy;
pub mod types;

pub use error::ConfigError;
pub use loader::{load_config, load_config_file, load_config_from_str, CONFIG_FILE};
pub use policy::ExtensionPolicy;
pub use types::*;
