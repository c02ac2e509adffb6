//! Versioned on-disk artifacts with an atomically swapped `CURRENT` pointer.
//!
//! ```text
//! root/
//!   CURRENT                  <- name of the live version
//!   v-20240501T120000123-ab12cd34/
//!   v-20240502T090000456-ef56ab78/
//!   .staging-20240503T.../   <- build in progress, invisible to readers
//! ```
//!
//! Readers only ever open `v-*` directories named by `CURRENT`, so a build in progress
//! or an aborted build is never observed.

use chrono::Utc;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::error::Result;

const POINTER_FILE: &str = "CURRENT";
const VERSION_PREFIX: &str = "v-";
const STAGING_PREFIX: &str = ".staging-";

#[derive(Debug, Clone)]
pub struct VersionedDir {
    root: PathBuf,
}

/// A published or staged version directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Version {
    pub name: String,
    pub path: PathBuf,
}

impl VersionedDir {
    pub fn open(root: &Path) -> Result<Self> {
        std::fs::create_dir_all(root)?;
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    /// The live version, if anything has been published.
    pub fn current(&self) -> Result<Option<Version>> {
        let pointer = self.root.join(POINTER_FILE);
        let name = match std::fs::read_to_string(&pointer) {
            Ok(name) => name.trim().to_string(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        if name.is_empty() {
            return Ok(None);
        }

        let path = self.root.join(format!("{VERSION_PREFIX}{name}"));
        if !path.is_dir() {
            tracing::warn!(
                "{} points at missing version {name}",
                pointer.display()
            );
            return Ok(None);
        }
        Ok(Some(Version { name, path }))
    }

    /// Create an empty staging directory for a new build.
    pub fn stage(&self) -> Result<Version> {
        let name = new_version_name();
        let path = self.root.join(format!("{STAGING_PREFIX}{name}"));
        std::fs::create_dir_all(&path)?;
        Ok(Version { name, path })
    }

    /// Move a staged build into place and point readers at it. The previously live
    /// version is kept; anything older is pruned.
    pub fn publish(&self, staged: &Version) -> Result<Version> {
        let previous = self.current()?;

        let path = self.root.join(format!("{VERSION_PREFIX}{}", staged.name));
        std::fs::rename(&staged.path, &path)?;

        // Atomic pointer swap (write temp file + rename).
        let pointer = self.root.join(POINTER_FILE);
        let tmp_pointer = self.root.join(format!("{POINTER_FILE}.tmp"));
        std::fs::write(&tmp_pointer, &staged.name)?;
        std::fs::rename(&tmp_pointer, &pointer)?;

        let keep: Vec<&str> = std::iter::once(staged.name.as_str())
            .chain(previous.as_ref().map(|v| v.name.as_str()))
            .collect();
        self.prune(&keep);

        Ok(Version {
            name: staged.name.clone(),
            path,
        })
    }

    /// Throw away an unpublished build.
    pub fn discard(&self, staged: &Version) {
        if let Err(e) = std::fs::remove_dir_all(&staged.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!("Failed to remove staging dir {}: {e}", staged.path.display());
            }
        }
    }

    /// Remove published versions not in `keep` and leftover staging dirs.
    fn prune(&self, keep: &[&str]) {
        let entries = match std::fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!("Failed to list {}: {e}", self.root.display());
                return;
            }
        };

        for entry in entries.flatten() {
            let file_name = entry.file_name();
            let Some(name) = file_name.to_str() else {
                continue;
            };
            let stale = match name.strip_prefix(VERSION_PREFIX) {
                Some(version) => !keep.contains(&version),
                None => name.starts_with(STAGING_PREFIX),
            };
            if stale {
                if let Err(e) = std::fs::remove_dir_all(entry.path()) {
                    tracing::warn!("Failed to prune {}: {e}", entry.path().display());
                }
            }
        }
    }
}

/// Sortable, collision-free version name.
pub fn new_version_name() -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{}-{}", Utc::now().format("%Y%m%dT%H%M%S%3f"), &suffix[..8])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn publish_marker(dir: &VersionedDir, marker: &str) -> Version {
        let staged = dir.stage().unwrap();
        std::fs::write(staged.path.join("data"), marker).unwrap();
        dir.publish(&staged).unwrap()
    }

    fn version_dirs(dir: &VersionedDir) -> usize {
        std::fs::read_dir(&dir.root)
            .unwrap()
            .flatten()
            .filter(|e| e.file_name().to_string_lossy().starts_with(VERSION_PREFIX))
            .count()
    }

    #[test]
    fn test_nothing_published() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = VersionedDir::open(tmp.path()).unwrap();
        assert!(dir.current().unwrap().is_none());
    }

    #[test]
    fn test_staged_build_invisible_until_published() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = VersionedDir::open(tmp.path()).unwrap();
        let first = publish_marker(&dir, "one");

        let staged = dir.stage().unwrap();
        assert_eq!(dir.current().unwrap().unwrap().name, first.name);

        dir.discard(&staged);
        assert!(!staged.path.exists());
        assert_eq!(dir.current().unwrap().unwrap().name, first.name);
    }

    #[test]
    fn test_publish_swaps_and_prunes() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = VersionedDir::open(tmp.path()).unwrap();
        publish_marker(&dir, "one");
        let second = publish_marker(&dir, "two");
        let third = publish_marker(&dir, "three");

        let current = dir.current().unwrap().unwrap();
        assert_eq!(current.name, third.name);
        assert_eq!(
            std::fs::read_to_string(current.path.join("data")).unwrap(),
            "three"
        );
        // Live version plus the one before it
        assert_eq!(version_dirs(&dir), 2);
        assert!(second.path.exists());
    }
}
