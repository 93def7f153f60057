//! Plugin discovery
//!
//! Plugins live at `<root>/<category>/<name>`. A candidate is any executable
//! regular file directly inside the category directory; subdirectories and
//! non-executable files are skipped.
use anyhow::{Context, Result};
use std::fs;
use std::io;
use std::path::Path;
use tracing::debug;

/// List plugin names in `dir`, sorted
///
/// A missing directory means no plugins, not an error.
pub fn discover_from_dir(dir: &Path) -> Result<Vec<String>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => {
            return Err(err).with_context(|| {
                format!("Failed to read plugins directory {}", dir.display())
            });
        }
    };

    let mut plugins = Vec::new();
    for entry in entries {
        let entry = entry
            .with_context(|| format!("Failed to read plugins directory {}", dir.display()))?;
        let path = entry.path();

        // Follow symlinks so a linked plugin binary counts as a file
        let Ok(metadata) = fs::metadata(&path) else {
            continue;
        };
        if metadata.is_dir() || !is_executable(&metadata) {
            continue;
        }

        let Some(name) = entry.file_name().to_str().map(str::to_string) else {
            continue;
        };
        debug!("Found plugin: {name} at {}", path.display());
        plugins.push(name);
    }

    plugins.sort();
    Ok(plugins)
}

#[cfg(unix)]
fn is_executable(metadata: &fs::Metadata) -> bool {
    use std::os::unix::fs::PermissionsExt;
    metadata.is_file() && metadata.permissions().mode() & 0o111 != 0
}

#[cfg(not(unix))]
fn is_executable(metadata: &fs::Metadata) -> bool {
    metadata.is_file()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_missing_directory_is_empty() {
        let dir = tempdir().unwrap();
        let plugins = discover_from_dir(&dir.path().join("lang")).unwrap();
        assert!(plugins.is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_only_executables_are_listed() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let exec = dir.path().join("hindi");
        let plain = dir.path().join("README");
        fs::write(&exec, "#!/bin/sh\n").unwrap();
        fs::write(&plain, "not a plugin").unwrap();
        fs::set_permissions(&exec, fs::Permissions::from_mode(0o755)).unwrap();
        fs::set_permissions(&plain, fs::Permissions::from_mode(0o644)).unwrap();
        fs::create_dir(dir.path().join("japanese")).unwrap();

        let plugins = discover_from_dir(dir.path()).unwrap();
        assert_eq!(plugins, vec!["hindi".to_string()]);
    }

    #[cfg(unix)]
    #[test]
    fn test_results_are_sorted() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        for name in ["japanese", "hindi", "french"] {
            let path = dir.path().join(name);
            fs::write(&path, "#!/bin/sh\n").unwrap();
            fs::set_permissions(&path, fs::Permissions::from_mode(0o700)).unwrap();
        }

        let plugins = discover_from_dir(dir.path()).unwrap();
        assert_eq!(plugins, vec!["french", "hindi", "japanese"]);
    }

    #[test]
    fn test_unreadable_path_is_an_error() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("lang");
        fs::write(&file, "").unwrap();

        // A file where the category directory should be
        assert!(discover_from_dir(&file).is_err());
    }
}
