//! Host configuration: where plugins live and which environment variables matter
use anyhow::{Context, Result};
use std::path::PathBuf;

/// Overrides the plugins root directory
pub const PLUGIN_PATH_ENV: &str = "GREETER_PLUGIN_PATH";

/// `tracing` filter directive for host and plugins, e.g. `debug`
pub const LOG_LEVEL_ENV: &str = "GREETER_LOG_LEVEL";

/// The only plugin category greeter uses
pub const LANG_CATEGORY: &str = "lang";

/// Resolve the plugins root
///
/// An explicit directory (flag or [`PLUGIN_PATH_ENV`]) wins; otherwise plugins
/// are looked up in `plugins/` next to the running executable.
pub fn resolve_plugins_dir(explicit: Option<PathBuf>) -> Result<PathBuf> {
    match explicit {
        Some(dir) => Ok(dir),
        None => default_plugins_dir(),
    }
}

pub fn default_plugins_dir() -> Result<PathBuf> {
    let exe = std::env::current_exe().context("Failed to get executable path")?;
    let dir = exe
        .parent()
        .context("Executable path has no parent directory")?;
    Ok(dir.join("plugins"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_dir_wins() {
        let dir = resolve_plugins_dir(Some(PathBuf::from("/srv/plugins"))).unwrap();
        assert_eq!(dir, PathBuf::from("/srv/plugins"));
    }

    #[test]
    fn test_default_is_next_to_executable() {
        let dir = resolve_plugins_dir(None).unwrap();
        let exe_dir = std::env::current_exe().unwrap().parent().unwrap().to_path_buf();
        assert_eq!(dir, exe_dir.join("plugins"));
    }
}
