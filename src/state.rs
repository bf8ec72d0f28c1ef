//! Resumable processed-set.
//!
//! The set of absolute paths already handled, stored on disk as a sorted
//! JSON list. It only grows during a run and is rewritten wholesale after
//! each batch.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq, Eq)]
#[serde(transparent)]
pub struct ProcessedSet {
    paths: BTreeSet<String>,
}

impl ProcessedSet {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path).context("Failed to read state file")?;
        let set = serde_json::from_str(&content).context("Failed to parse state file JSON")?;
        Ok(set)
    }

    /// Like [`ProcessedSet::load`], but an unreadable file is moved aside to
    /// `<file>.corrupt` and an empty set is returned instead.
    pub fn load_or_recover(path: &Path) -> Result<Self> {
        match Self::load(path) {
            Ok(set) => Ok(set),
            Err(e) => {
                let aside = sibling_with_suffix(path, "corrupt");
                tracing::warn!(
                    "Could not load state file {:?}: {:#}. Moving it to {:?} and starting fresh.",
                    path,
                    e,
                    aside
                );
                fs::rename(path, &aside)
                    .with_context(|| format!("Failed to move corrupt state file to {:?}", aside))?;
                Ok(Self::default())
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content =
            serde_json::to_string_pretty(self).context("Failed to serialize state file")?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).context("Failed to create state directory")?;
        }
        let tmp = sibling_with_suffix(path, "tmp");
        fs::write(&tmp, content).context("Failed to write temporary state file")?;
        fs::rename(&tmp, path).context("Failed to replace state file")?;
        Ok(())
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.paths.contains(path.to_string_lossy().as_ref())
    }

    /// Returns true if the path was not already present.
    pub fn insert(&mut self, path: &Path) -> bool {
        self.paths.insert(path.to_string_lossy().into_owned())
    }

    pub fn extend<'a>(&mut self, paths: impl IntoIterator<Item = &'a Path>) {
        for path in paths {
            self.insert(path);
        }
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.paths.iter().map(String::as_str)
    }

    pub fn is_superset(&self, other: &ProcessedSet) -> bool {
        self.paths.is_superset(&other.paths)
    }
}

fn sibling_with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".");
    name.push(suffix);
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_is_empty_set() {
        let dir = tempfile::tempdir().unwrap();
        let set = ProcessedSet::load(&dir.path().join("state.json")).unwrap();
        assert!(set.is_empty());
    }

    #[test]
    fn test_persisted_as_sorted_json_list() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/state.json");

        let mut set = ProcessedSet::default();
        set.insert(Path::new("/music/b.mp3"));
        set.insert(Path::new("/music/a.mp3"));
        assert!(!set.insert(Path::new("/music/a.mp3")));
        set.save(&path).unwrap();

        let raw: Vec<String> =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw, vec!["/music/a.mp3", "/music/b.mp3"]);
        assert!(!path.with_file_name("state.json.tmp").exists());

        let loaded = ProcessedSet::load(&path).unwrap();
        assert_eq!(loaded, set);
        assert!(loaded.contains(Path::new("/music/b.mp3")));
    }

    #[test]
    fn test_corrupt_file_is_moved_aside() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        fs::write(&path, "{not json").unwrap();

        assert!(ProcessedSet::load(&path).is_err());
        let set = ProcessedSet::load_or_recover(&path).unwrap();
        assert!(set.is_empty());
        assert!(!path.exists());
        assert!(dir.path().join("state.json.corrupt").exists());
    }

    #[test]
    fn test_extend_keeps_superset() {
        let mut before = ProcessedSet::default();
        before.insert(Path::new("/m/1.flac"));
        let mut after = before.clone();
        after.extend([Path::new("/m/2.flac"), Path::new("/m/1.flac")]);
        assert!(after.is_superset(&before));
        assert_eq!(after.len(), 2);
    }
}
