//! Spool lookup — find the plugin's on-disk queue directory for a container.
//!
//! The plugin keeps its state under the daemon's plugin root
//! (`/var/lib/docker/plugins/<id>/rootfs/...`); the queue directory is named
//! after the `logzio-dir-path` log option.

use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpoolLookup {
    Found(PathBuf),
    NotFound,
}

impl SpoolLookup {
    pub fn is_found(&self) -> bool {
        matches!(self, SpoolLookup::Found(_))
    }
}

/// `./test_one` and `test_one/` both name the directory `test_one`.
pub fn spool_dir_name(dir_path: &str) -> &str {
    let trimmed = dir_path.trim().trim_end_matches('/');
    let trimmed = trimmed.strip_prefix("./").unwrap_or(trimmed);
    trimmed.rsplit('/').next().unwrap_or(trimmed)
}

/// Depth-first search for a directory called `name` under `root`.
///
/// Unreadable subdirectories are skipped; a missing root is `NotFound`.
/// Symlinks are not followed.
pub fn find_dir(root: &Path, name: &str) -> std::io::Result<SpoolLookup> {
    let mut pending = vec![root.to_path_buf()];

    while let Some(dir) = pending.pop() {
        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if dir == root && e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(SpoolLookup::NotFound)
            }
            Err(e) if dir == root => return Err(e),
            Err(e) => {
                tracing::debug!(dir = %dir.display(), error = %e, "Skipping unreadable directory");
                continue;
            }
        };

        for entry in entries.flatten() {
            let Ok(file_type) = entry.file_type() else {
                continue;
            };
            if !file_type.is_dir() {
                continue;
            }
            let path = entry.path();
            if entry.file_name() == name {
                return Ok(SpoolLookup::Found(path));
            }
            pending.push(path);
        }
    }

    Ok(SpoolLookup::NotFound)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spool_dir_name() {
        assert_eq!(spool_dir_name("./test_one"), "test_one");
        assert_eq!(spool_dir_name("test_one/"), "test_one");
        assert_eq!(spool_dir_name("/var/spool/test_one"), "test_one");
        assert_eq!(spool_dir_name("test_one"), "test_one");
    }

    #[test]
    fn test_find_nested_dir() {
        let root = tempfile::tempdir().unwrap();
        let target = root.path().join("abc123/rootfs/var/log/test_one");
        std::fs::create_dir_all(&target).unwrap();
        std::fs::create_dir_all(root.path().join("abc123/rootfs/var/log/other")).unwrap();

        assert_eq!(
            find_dir(root.path(), "test_one").unwrap(),
            SpoolLookup::Found(target)
        );
    }

    #[test]
    fn test_file_with_same_name_is_not_a_match() {
        let root = tempfile::tempdir().unwrap();
        std::fs::write(root.path().join("test_one"), b"").unwrap();
        assert_eq!(find_dir(root.path(), "test_one").unwrap(), SpoolLookup::NotFound);
    }

    #[test]
    fn test_missing_root_is_not_found() {
        let root = tempfile::tempdir().unwrap();
        let missing = root.path().join("nope");
        assert_eq!(find_dir(&missing, "x").unwrap(), SpoolLookup::NotFound);
    }
}
