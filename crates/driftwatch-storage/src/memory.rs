//! In-memory store implementations.
//!
//! Used by tests and by ephemeral (no data directory) deployments.
//! Nothing survives the process.

use chrono::{DateTime, Utc};
use driftwatch_core::config::{DetectorConfig, DetectorConfigUpdate};
use driftwatch_core::sample::{DetectionRecord, DetectorState};
use driftwatch_core::store::{ConfigStore, RecordFilter, RecordLog, StateStore};
use driftwatch_core::Result;
use std::collections::HashMap;
use std::sync::Mutex;

/// In-memory configuration store
#[derive(Debug, Default)]
pub struct MemoryConfigStore {
    entries: Mutex<HashMap<String, DetectorConfigUpdate>>,
    global: Mutex<Option<DetectorConfig>>,
}

impl MemoryConfigStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }
}

impl ConfigStore for MemoryConfigStore {
    fn get(&self, key: &str) -> Result<Option<DetectorConfigUpdate>> {
        Ok(self
            .entries
            .lock()
            .expect("config entries lock poisoned")
            .get(key)
            .cloned())
    }

    fn set(&self, key: &str, delta: &DetectorConfigUpdate) -> Result<()> {
        self.entries
            .lock()
            .expect("config entries lock poisoned")
            .entry(key.to_string())
            .or_default()
            .merge(delta);
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<bool> {
        Ok(self
            .entries
            .lock()
            .expect("config entries lock poisoned")
            .remove(key)
            .is_some())
    }

    fn list(&self) -> Result<HashMap<String, DetectorConfigUpdate>> {
        Ok(self
            .entries
            .lock()
            .expect("config entries lock poisoned")
            .clone())
    }

    fn get_global(&self) -> Result<Option<DetectorConfig>> {
        Ok(self.global.lock().expect("global config lock poisoned").clone())
    }

    fn set_global(&self, config: &DetectorConfig) -> Result<()> {
        *self.global.lock().expect("global config lock poisoned") = Some(config.clone());
        Ok(())
    }
}

/// In-memory state store
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    states: Mutex<HashMap<String, DetectorState>>,
}

impl MemoryStateStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }
}

impl StateStore for MemoryStateStore {
    fn upsert_many(&self, states: &[(String, DetectorState)]) -> Result<()> {
        let mut map = self.states.lock().expect("states lock poisoned");
        for (key, state) in states {
            map.insert(key.clone(), state.clone());
        }
        Ok(())
    }

    fn delete_many(&self, keys: &[String]) -> Result<()> {
        let mut map = self.states.lock().expect("states lock poisoned");
        for key in keys {
            map.remove(key);
        }
        Ok(())
    }

    fn load_all(&self) -> Result<HashMap<String, DetectorState>> {
        Ok(self.states.lock().expect("states lock poisoned").clone())
    }
}

/// In-memory record log
#[derive(Debug, Default)]
pub struct MemoryRecordLog {
    records: Mutex<Vec<DetectionRecord>>,
}

impl MemoryRecordLog {
    /// Create an empty log
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records
    pub fn len(&self) -> usize {
        self.records.lock().expect("records lock poisoned").len()
    }

    /// Whether the log is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl RecordLog for MemoryRecordLog {
    fn append(&self, record: &DetectionRecord) -> Result<()> {
        self.records
            .lock()
            .expect("records lock poisoned")
            .push(record.clone());
        Ok(())
    }

    fn query(&self, filter: &RecordFilter) -> Result<Vec<DetectionRecord>> {
        let records = self.records.lock().expect("records lock poisoned");
        let mut out: Vec<DetectionRecord> = records
            .iter()
            .filter(|r| {
                if let Some(start) = filter.start {
                    if r.snapshot.timestamp < start {
                        return false;
                    }
                }
                if let Some(end) = filter.end {
                    if r.snapshot.timestamp > end {
                        return false;
                    }
                }
                filter.matches(r)
            })
            .cloned()
            .collect();
        out.sort_by_key(|r| r.snapshot.timestamp);
        out.truncate(filter.limit);
        Ok(out)
    }

    fn prune_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let mut records = self.records.lock().expect("records lock poisoned");
        let before = records.len();
        records.retain(|r| r.snapshot.timestamp >= cutoff);
        Ok((before - records.len()) as u64)
    }
}
