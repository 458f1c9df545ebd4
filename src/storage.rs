use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

/// The ads we've already seen, per watched URL.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SeenSet {
    targets: HashMap<String, HashSet<String>>,
}

impl SeenSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_new(&self, target: &str, id: &str) -> bool {
        self.targets
            .get(target)
            .is_none_or(|ids| !ids.contains(id))
    }

    pub fn record(&mut self, target: &str, id: &str) {
        use std::collections::hash_map::Entry;

        match self.targets.entry(target.to_string()) {
            Entry::Occupied(mut entry) => {
                entry.get_mut().insert(id.to_string());
            }
            Entry::Vacant(entry) => {
                entry.insert(HashSet::from([id.to_string()]));
            }
        }
    }

    /// Forgets everything, for every target.
    pub fn reset(&mut self) {
        self.targets.clear();
    }

    /// Number of ads remembered for a target.
    pub fn len(&self, target: &str) -> usize {
        self.targets.get(target).map_or(0, HashSet::len)
    }
}

impl SeenSet {
    /// Writes the set to `path`, replacing any previous file in one step.
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let json = serde_json::to_string(self)?;

        // Write beside the target and rename, so a kill mid-write never
        // leaves a truncated file behind.
        let mut partial = path.as_os_str().to_owned();
        partial.push(".partial");
        let partial = PathBuf::from(partial);

        std::fs::write(&partial, json)
            .with_context(|| format!("Failed to write {}", partial.display()))?;
        std::fs::rename(&partial, path)
            .with_context(|| format!("Failed to replace {}", path.display()))?;
        Ok(())
    }

    /// Loads a previously saved set. A missing or empty file is an empty set.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        use std::io::ErrorKind;

        let json = match std::fs::read_to_string(path) {
            Ok(content) => {
                if content.trim().is_empty() {
                    return Ok(Self::new());
                }
                content
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Ok(Self::new());
            }
            Err(e) => return Err(e.into()),
        };

        Ok(serde_json::from_str(&json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_is_scoped_per_target() {
        let mut seen = SeenSet::new();
        assert!(seen.is_new("a", "1"));

        seen.record("a", "1");
        seen.record("a", "1");

        assert!(!seen.is_new("a", "1"));
        assert!(seen.is_new("b", "1"));
        assert_eq!(seen.len("a"), 1);
        assert_eq!(seen.len("b"), 0);
    }

    #[test]
    fn test_reset_forgets_all_targets() {
        let mut seen = SeenSet::new();
        seen.record("a", "1");
        seen.record("b", "2");

        seen.reset();

        assert!(seen.is_new("a", "1"));
        assert!(seen.is_new("b", "2"));
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("seen.json");

        let mut seen = SeenSet::new();
        seen.record("https://m.finn.no/bap/forsale/search.html", "101");
        seen.save(&path).unwrap();

        let loaded = SeenSet::load(&path).unwrap();
        assert!(!loaded.is_new("https://m.finn.no/bap/forsale/search.html", "101"));
        assert_eq!(loaded.len("https://m.finn.no/bap/forsale/search.html"), 1);
    }

    #[test]
    fn test_save_replaces_previous_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("seen.json");
        std::fs::write(&path, "{\"truncat").unwrap();

        let mut seen = SeenSet::new();
        seen.record("a", "1");
        seen.save(&path).unwrap();

        assert_eq!(SeenSet::load(&path).unwrap().len("a"), 1);
        let files: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(files.len(), 1);
    }

    #[test]
    fn test_load_missing_or_empty_file() {
        let dir = tempfile::tempdir().unwrap();
        let missing = SeenSet::load(&dir.path().join("nope.json")).unwrap();
        assert_eq!(missing.len("a"), 0);

        let empty = dir.path().join("empty.json");
        std::fs::write(&empty, "").unwrap();
        assert_eq!(SeenSet::load(&empty).unwrap().len("a"), 0);

        let garbage = dir.path().join("garbage.json");
        std::fs::write(&garbage, "not json").unwrap();
        assert!(SeenSet::load(&garbage).is_err());
    }
}
