//! Implementation of `kiln cache info` and `kiln cache clear`.

use kiln_cache::DigestCache;

use crate::project::{load_project, Project};
use crate::{CacheCommand, GlobalArgs};

/// Runs a `kiln cache` subcommand.
pub fn run(cmd: &CacheCommand, global: &GlobalArgs) -> Result<i32, Box<dyn std::error::Error>> {
    let project = load_project(global)?;
    match cmd {
        CacheCommand::Info => println!("{}", info(&project)),
        CacheCommand::Clear => {
            let message = clear(&project)?;
            if !global.quiet {
                println!("{message}");
            }
        }
    }
    Ok(0)
}

fn info(project: &Project) -> String {
    let path = project.digest_cache_file();
    if !path.is_file() {
        return format!("{}: no digest cache", path.display());
    }
    let cache = DigestCache::load(&path, project.config.cache.max_age());
    format!(
        "{}: {} digest(s), retained for {} day(s)",
        path.display(),
        cache.len(),
        project.config.cache.max_age_days
    )
}

fn clear(project: &Project) -> Result<String, Box<dyn std::error::Error>> {
    let path = project.digest_cache_file();
    let message = if DigestCache::remove_file(&path)? {
        log::info!("removed {}", path.display());
        format!("cleared {}", path.display())
    } else {
        format!("{}: nothing to clear", path.display())
    };
    Ok(message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_config::ProjectConfig;

    fn project_in(dir: &std::path::Path) -> Project {
        Project {
            dir: dir.to_path_buf(),
            config: ProjectConfig::default(),
        }
    }

    fn populate(project: &Project) {
        let src = project.dir.join("a.c");
        std::fs::write(&src, "int a;").unwrap();
        let cache = DigestCache::load(&project.digest_cache_file(), project.config.cache.max_age());
        cache.set(
            &src,
            kiln_cache::path_hash(&src),
            1,
            kiln_common::ContentHash::from_bytes(b"int a;"),
        );
        cache.save().unwrap();
    }

    #[test]
    fn info_reports_entry_count() {
        let dir = tempfile::tempdir().unwrap();
        let project = project_in(dir.path());
        assert!(info(&project).contains("no digest cache"));

        populate(&project);
        assert!(info(&project).contains("1 digest(s)"));
    }

    #[test]
    fn clear_removes_cache_file() {
        let dir = tempfile::tempdir().unwrap();
        let project = project_in(dir.path());
        populate(&project);
        assert!(project.digest_cache_file().is_file());

        assert!(clear(&project).unwrap().starts_with("cleared"));
        assert!(!project.digest_cache_file().exists());
        assert!(clear(&project).unwrap().contains("nothing to clear"));
    }
}
