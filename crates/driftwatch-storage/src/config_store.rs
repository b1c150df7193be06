//! JSON-document detector configuration store.
//!
//! A single JSON file holds the global defaults plus per-key deltas.
//! Writes go through a temp-file rename so a crash mid-save never
//! leaves a truncated document.

use driftwatch_core::config::{DetectorConfig, DetectorConfigUpdate};
use driftwatch_core::store::ConfigStore;
use driftwatch_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::info;

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
struct Document {
    global: Option<DetectorConfig>,
    items: HashMap<String, DetectorConfigUpdate>,
}

/// File-backed configuration store
#[derive(Debug)]
pub struct JsonConfigStore {
    path: PathBuf,
    inner: Mutex<Document>,
}

impl JsonConfigStore {
    /// Open (or create) the store at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let document = if path.exists() {
            let raw = fs::read_to_string(&path)?;
            serde_json::from_str(&raw)
                .map_err(|e| Error::storage(format!("Corrupt config document: {}", e)))?
        } else {
            Document::default()
        };
        info!(path = %path.display(), items = document.items.len(), "Opened config store");
        Ok(Self {
            path,
            inner: Mutex::new(document),
        })
    }

    fn save(&self, document: &Document) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let raw = serde_json::to_string_pretty(document)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, raw)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl ConfigStore for JsonConfigStore {
    fn get(&self, key: &str) -> Result<Option<DetectorConfigUpdate>> {
        let document = self.inner.lock().expect("config document lock poisoned");
        Ok(document.items.get(key).cloned())
    }

    fn set(&self, key: &str, delta: &DetectorConfigUpdate) -> Result<()> {
        let mut document = self.inner.lock().expect("config document lock poisoned");
        document
            .items
            .entry(key.to_string())
            .or_default()
            .merge(delta);
        self.save(&document)
    }

    fn delete(&self, key: &str) -> Result<bool> {
        let mut document = self.inner.lock().expect("config document lock poisoned");
        let existed = document.items.remove(key).is_some();
        if existed {
            self.save(&document)?;
        }
        Ok(existed)
    }

    fn list(&self) -> Result<HashMap<String, DetectorConfigUpdate>> {
        let document = self.inner.lock().expect("config document lock poisoned");
        Ok(document.items.clone())
    }

    fn get_global(&self) -> Result<Option<DetectorConfig>> {
        let document = self.inner.lock().expect("config document lock poisoned");
        Ok(document.global.clone())
    }

    fn set_global(&self, config: &DetectorConfig) -> Result<()> {
        let mut document = self.inner.lock().expect("config document lock poisoned");
        document.global = Some(config.clone());
        self.save(&document)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("driftwatch-config-{}-{}.json", name, std::process::id()))
    }

    #[test]
    fn test_set_get_roundtrip() {
        let path = temp_path("roundtrip");
        let _ = fs::remove_file(&path);
        let store = JsonConfigStore::open(&path).unwrap();

        let delta = DetectorConfigUpdate {
            mu0: Some(0.01),
            cooldown_periods: Some(4),
            ..Default::default()
        };
        store.set("p1::l1::s1::voids", &delta).unwrap();

        let got = store.get("p1::l1::s1::voids").unwrap().unwrap();
        assert_eq!(got.mu0, Some(0.01));
        assert_eq!(got.cooldown_periods, Some(4));
        assert!(store.get("missing").unwrap().is_none());
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_set_merges_over_existing() {
        let path = temp_path("merge");
        let _ = fs::remove_file(&path);
        let store = JsonConfigStore::open(&path).unwrap();

        store
            .set(
                "a",
                &DetectorConfigUpdate {
                    mu0: Some(0.01),
                    ..Default::default()
                },
            )
            .unwrap();
        store
            .set(
                "a",
                &DetectorConfigUpdate {
                    base_n: Some(800),
                    ..Default::default()
                },
            )
            .unwrap();

        let got = store.get("a").unwrap().unwrap();
        assert_eq!(got.mu0, Some(0.01));
        assert_eq!(got.base_n, Some(800));
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_persists_across_reopen() {
        let path = temp_path("reopen");
        let _ = fs::remove_file(&path);
        {
            let store = JsonConfigStore::open(&path).unwrap();
            store
                .set(
                    "a",
                    &DetectorConfigUpdate {
                        target_arl0: Some(500.0),
                        ..Default::default()
                    },
                )
                .unwrap();
            let mut global = DetectorConfig::default();
            global.cooldown_periods = 12;
            store.set_global(&global).unwrap();
        }

        let reopened = JsonConfigStore::open(&path).unwrap();
        assert_eq!(
            reopened.get("a").unwrap().unwrap().target_arl0,
            Some(500.0)
        );
        assert_eq!(reopened.get_global().unwrap().unwrap().cooldown_periods, 12);
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_delete() {
        let path = temp_path("delete");
        let _ = fs::remove_file(&path);
        let store = JsonConfigStore::open(&path).unwrap();
        store.set("a", &DetectorConfigUpdate::default()).unwrap();
        assert!(store.delete("a").unwrap());
        assert!(!store.delete("a").unwrap());
        assert!(store.list().unwrap().is_empty());
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_global_unset_until_written() {
        let path = temp_path("global-default");
        let _ = fs::remove_file(&path);
        let store = JsonConfigStore::open(&path).unwrap();
        assert!(store.get_global().unwrap().is_none());
        let _ = fs::remove_file(&path);
    }
}
