//! Project discovery and configuration loading shared by all commands.

use std::path::{Path, PathBuf};

use kiln_config::{ProjectConfig, CONFIG_FILE};

use crate::GlobalArgs;

/// A project directory together with its parsed configuration.
pub struct Project {
    /// Directory that relative cache paths are resolved against.
    pub dir: PathBuf,
    /// Parsed `kiln.toml` (or defaults).
    pub config: ProjectConfig,
}

impl Project {
    /// Path of the persisted digest cache for this project.
    pub fn digest_cache_file(&self) -> PathBuf {
        self.config.cache.digest_cache_file(&self.dir)
    }
}

/// Resolves the project from `--config` or by searching upward from the
/// current directory.
pub fn load_project(global: &GlobalArgs) -> Result<Project, Box<dyn std::error::Error>> {
    if let Some(ref config_path) = global.config {
        let path = PathBuf::from(config_path);
        let config = kiln_config::load_config_file(&path)?;
        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        return Ok(Project { dir, config });
    }

    let cwd = std::env::current_dir()?;
    let dir = find_project_root(&cwd).unwrap_or(cwd);
    let config = kiln_config::load_config(&dir)?;
    Ok(Project { dir, config })
}

/// Walks up from `start` looking for a directory containing `kiln.toml`.
pub fn find_project_root(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .find(|dir| dir.join(CONFIG_FILE).is_file())
        .map(Path::to_path_buf)
}
