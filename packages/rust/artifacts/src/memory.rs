//! In-memory artifact store.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};

use stagegate_shared::{Result, StageGateError};

use crate::store::{ArtifactInfo, ArtifactStore, check_path, compile_pattern, pattern_matches};

#[derive(Debug, Clone)]
struct Entry {
    content: String,
    modified: DateTime<Utc>,
}

/// Process-local artifact store backed by an ordered map.
#[derive(Debug, Default)]
pub struct MemoryArtifactStore {
    entries: Mutex<BTreeMap<String, Entry>>,
}

impl MemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove an artifact, returning whether it existed.
    pub fn remove(&self, path: &str) -> bool {
        self.lock()
            .remove(crate::store::normalize_path(path))
            .is_some()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, Entry>> {
        // A panic mid-insert cannot leave a half-written entry behind.
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl ArtifactStore for MemoryArtifactStore {
    fn list(&self, pattern: &str) -> Result<Vec<ArtifactInfo>> {
        let pattern = compile_pattern(pattern)?;
        Ok(self
            .lock()
            .iter()
            .filter(|(path, _)| pattern_matches(&pattern, path))
            .map(|(path, entry)| ArtifactInfo {
                path: path.clone(),
                size: entry.content.len() as u64,
                modified: entry.modified,
            })
            .collect())
    }

    fn read(&self, path: &str) -> Result<String> {
        let clean = check_path(path)?;
        self.lock()
            .get(clean)
            .map(|entry| entry.content.clone())
            .ok_or_else(|| StageGateError::not_found(clean))
    }

    fn write(&self, path: &str, content: &str) -> Result<()> {
        let clean = check_path(path)?;
        self.lock().insert(
            clean.to_string(),
            Entry {
                content: content.to_string(),
                modified: Utc::now(),
            },
        );
        Ok(())
    }

    fn exists(&self, path: &str) -> Result<bool> {
        let clean = check_path(path)?;
        Ok(self.lock().contains_key(clean))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::ArtifactIndex;

    #[test]
    fn write_read_overwrite() {
        let store = MemoryArtifactStore::new();
        store.write("/matched_companies.json", "{}").unwrap();
        assert_eq!(store.read("matched_companies.json").unwrap(), "{}");

        store.write("matched_companies.json", "{\"v\":2}").unwrap();
        assert_eq!(store.read("/matched_companies.json").unwrap(), "{\"v\":2}");
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn missing_artifact_is_not_found() {
        let store = MemoryArtifactStore::new();
        let err = store.read("validations/company_X.json").unwrap_err();
        assert!(err.is_not_found());
        assert!(!store.exists("validations/company_X.json").unwrap());
    }

    #[test]
    fn list_filters_by_pattern_in_path_order() {
        let store = MemoryArtifactStore::new();
        store.write("company_matches/batch_0100.json", "b").unwrap();
        store.write("company_matches/batch_0000.json", "a").unwrap();
        store.write("validations/company_A.json", "c").unwrap();

        let keys = store.list_keys("company_matches/batch_*.json").unwrap();
        assert_eq!(
            keys,
            vec![
                "company_matches/batch_0000.json",
                "company_matches/batch_0100.json"
            ]
        );
        assert!(store.contains("validations/company_A.json").unwrap());
    }

    #[test]
    fn read_range_numbers_lines() {
        let store = MemoryArtifactStore::new();
        store.write("notes.txt", "alpha\nbeta\ngamma").unwrap();

        let out = store.read_range("notes.txt", 1, 5).unwrap();
        assert_eq!(out, "     2|beta\n     3|gamma");

        let out = store.read_range("notes.txt", 10, 5).unwrap();
        assert_eq!(out, "File is empty.");
    }

    #[test]
    fn ls_shows_one_level() {
        let store = MemoryArtifactStore::new();
        store.write("themes_analysis.json", "{}").unwrap();
        store.write("company_matches/batch_0000.json", "{}").unwrap();
        store.write("validations/company_A.json", "{}").unwrap();
        store.write("validations/deep/company_B.json", "{}").unwrap();

        let top: Vec<(String, bool)> = store
            .ls("/")
            .unwrap()
            .into_iter()
            .map(|e| (e.path, e.is_dir))
            .collect();
        assert_eq!(
            top,
            vec![
                ("company_matches/".to_string(), true),
                ("validations/".to_string(), true),
                ("themes_analysis.json".to_string(), false),
            ]
        );

        let nested = store.ls("validations").unwrap();
        assert_eq!(nested[0].path, "validations/deep/");
        assert_eq!(nested[1].path, "validations/company_A.json");
        assert_eq!(nested[1].size, 2);
        assert!(store.ls("missing/").unwrap().is_empty());
    }

    #[test]
    fn edit_replaces_first_or_all() {
        let store = MemoryArtifactStore::new();
        store.write("notes.txt", "a-a-a").unwrap();

        assert_eq!(store.edit("notes.txt", "a", "b", false).unwrap(), 1);
        assert_eq!(store.read("notes.txt").unwrap(), "b-a-a");

        assert_eq!(store.edit("/notes.txt", "a", "c", true).unwrap(), 2);
        assert_eq!(store.read("notes.txt").unwrap(), "b-c-c");

        let err = store.edit("notes.txt", "zzz", "y", true).unwrap_err();
        assert!(err.to_string().contains("string not found in notes.txt"));
        assert!(store.edit("notes.txt", "", "y", true).is_err());
        assert!(store.edit("absent.txt", "a", "b", false).unwrap_err().is_not_found());
    }

    #[test]
    fn remove_reports_presence() {
        let store = MemoryArtifactStore::new();
        store.write("a.json", "1").unwrap();
        assert!(store.remove("/a.json"));
        assert!(!store.remove("a.json"));
        assert!(store.is_empty());
    }
}
