//! Persistent dispatch-binding cache.
//!
//! Late-bound COM resolves member names to DISPIDs through `GetIDsOfNames`,
//! one round-trip per object class and member. The store persists those
//! mappings between runs in `bindings.json`, stamped with the Excel version
//! they were resolved against. A store recorded against a different Excel
//! than the live one is stale: every cached DISPID in it is suspect, so the
//! bridge refuses it and reports `stale_bindings`; the client's recovery is
//! to wipe the cache directory and retry.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

const STORE_FILE: &str = "bindings.json";

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreFile {
    /// `Application.Version` of the Excel the members were resolved against.
    version: Option<String>,
    /// `"<ObjectKind>.<Member>"` → DISPID.
    members: HashMap<String, i32>,
}

/// Member-name → DISPID cache, optionally backed by a file.
#[derive(Debug, Default)]
pub struct BindingStore {
    dir: Option<PathBuf>,
    file: StoreFile,
    dirty: bool,
}

impl BindingStore {
    /// In-memory store; nothing is persisted.
    pub fn ephemeral() -> Self {
        Self::default()
    }

    /// Load the store from `dir`. A missing or unreadable file is an empty
    /// store, not an error.
    pub fn load(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        let file = fs::read_to_string(dir.join(STORE_FILE))
            .ok()
            .and_then(|text| serde_json::from_str(&text).ok())
            .unwrap_or_default();
        Self {
            dir: Some(dir),
            file,
            dirty: false,
        }
    }

    /// Check the recorded Excel version against the live one.
    ///
    /// A fresh store adopts the live version. A mismatch is the stale case
    /// and invalidates the whole store.
    pub fn verify_version(&mut self, live: &str) -> Result<(), String> {
        match self.file.version.as_deref() {
            None => {
                self.file.version = Some(live.to_string());
                self.dirty = true;
                Ok(())
            }
            Some(recorded) if recorded == live => Ok(()),
            Some(recorded) => Err(format!(
                "dispatch bindings were recorded against Excel {recorded}, host reports {live}"
            )),
        }
    }

    pub fn lookup(&self, kind: &str, member: &str) -> Option<i32> {
        self.file.members.get(&key(kind, member)).copied()
    }

    pub fn record(&mut self, kind: &str, member: &str, dispid: i32) {
        self.file.members.insert(key(kind, member), dispid);
        self.dirty = true;
    }

    /// Write the store back if anything changed since load.
    pub fn save(&mut self) -> std::io::Result<()> {
        let Some(dir) = &self.dir else {
            return Ok(());
        };
        if !self.dirty {
            return Ok(());
        }
        fs::create_dir_all(dir)?;
        let text = serde_json::to_string_pretty(&self.file)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        fs::write(dir.join(STORE_FILE), text)?;
        self.dirty = false;
        Ok(())
    }
}

fn key(kind: &str, member: &str) -> String {
    format!("{kind}.{member}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = BindingStore::load(dir.path());
        assert_eq!(store.lookup("Application", "Workbooks"), None);
        // A fresh store adopts whatever version it first sees.
        assert!(store.verify_version("16.0").is_ok());
    }

    #[test]
    fn corrupt_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(STORE_FILE), "not json{").unwrap();
        let store = BindingStore::load(dir.path());
        assert_eq!(store.lookup("Range", "MergeCells"), None);
    }

    #[test]
    fn records_persist_across_loads() {
        let dir = tempfile::tempdir().unwrap();

        let mut store = BindingStore::load(dir.path());
        store.verify_version("16.0").unwrap();
        store.record("Application", "Workbooks", 572);
        store.record("Range", "MergeCells", 208);
        store.save().unwrap();

        let mut reloaded = BindingStore::load(dir.path());
        assert_eq!(reloaded.lookup("Application", "Workbooks"), Some(572));
        assert_eq!(reloaded.lookup("Range", "MergeCells"), Some(208));
        assert!(reloaded.verify_version("16.0").is_ok());
    }

    #[test]
    fn version_mismatch_reports_stale() {
        let dir = tempfile::tempdir().unwrap();

        let mut store = BindingStore::load(dir.path());
        store.verify_version("15.0").unwrap();
        store.save().unwrap();

        let mut reloaded = BindingStore::load(dir.path());
        let err = reloaded.verify_version("16.0").unwrap_err();
        assert!(err.contains("15.0"), "message names the recorded version");
        assert!(err.contains("16.0"), "message names the live version");
    }

    #[test]
    fn kinds_do_not_collide() {
        let mut store = BindingStore::ephemeral();
        store.record("Workbook", "Name", 110);
        store.record("Worksheet", "Name", 1);
        assert_eq!(store.lookup("Workbook", "Name"), Some(110));
        assert_eq!(store.lookup("Worksheet", "Name"), Some(1));
    }

    #[test]
    fn ephemeral_store_never_writes() {
        let mut store = BindingStore::ephemeral();
        store.record("Range", "Font", 146);
        store.save().unwrap();
    }
}
