//! Embedded sled-backed persistence.
//!
//! One database with two trees: `detector_states` (checkpoints keyed by
//! canonical detector key) and `detection_records` (the append-only
//! record log, keyed by timestamp so range scans come back in time
//! order).

use chrono::{DateTime, Utc};
use driftwatch_core::sample::{DetectionRecord, DetectorState};
use driftwatch_core::store::{RecordFilter, RecordLog, StateStore};
use driftwatch_core::{Error, Result};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{info, warn};

const STATES_TREE: &str = "detector_states";
const RECORDS_TREE: &str = "detection_records";

/// Sled-backed state store and record log
#[derive(Debug)]
pub struct SledStore {
    db: sled::Db,
    states: sled::Tree,
    records: sled::Tree,
    seq: AtomicU64,
}

impl SledStore {
    /// Open (or create) the database at the given directory
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let db = sled::open(path.as_ref()).map_err(storage_err)?;
        Self::from_db(db)
    }

    /// Open an ephemeral database (tests, dry runs)
    pub fn temporary() -> Result<Self> {
        let db = sled::Config::new()
            .temporary(true)
            .open()
            .map_err(storage_err)?;
        Self::from_db(db)
    }

    fn from_db(db: sled::Db) -> Result<Self> {
        let states = db.open_tree(STATES_TREE).map_err(storage_err)?;
        let records = db.open_tree(RECORDS_TREE).map_err(storage_err)?;
        info!(
            states = states.len(),
            records = records.len(),
            "Opened sled store"
        );
        Ok(Self {
            db,
            states,
            records,
            seq: AtomicU64::new(0),
        })
    }

    /// Flush all trees to disk
    pub fn flush(&self) -> Result<()> {
        self.db.flush().map_err(storage_err)?;
        Ok(())
    }

    /// Number of persisted detection records
    pub fn record_count(&self) -> usize {
        self.records.len()
    }

    fn record_key(&self, timestamp: DateTime<Utc>) -> [u8; 16] {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        encode_record_key(timestamp, seq)
    }
}

/// 16-byte record key: order-preserving timestamp millis + sequence.
/// The sign bit is flipped so pre-epoch timestamps still sort first.
fn encode_record_key(timestamp: DateTime<Utc>, seq: u64) -> [u8; 16] {
    let millis = (timestamp.timestamp_millis() as u64) ^ (1u64 << 63);
    let mut key = [0u8; 16];
    key[..8].copy_from_slice(&millis.to_be_bytes());
    key[8..].copy_from_slice(&seq.to_be_bytes());
    key
}

fn time_prefix(timestamp: DateTime<Utc>) -> [u8; 8] {
    let millis = (timestamp.timestamp_millis() as u64) ^ (1u64 << 63);
    millis.to_be_bytes()
}

fn storage_err(e: sled::Error) -> Error {
    Error::storage(e.to_string())
}

impl StateStore for SledStore {
    fn upsert_many(&self, states: &[(String, DetectorState)]) -> Result<()> {
        let mut batch = sled::Batch::default();
        for (key, state) in states {
            let value = serde_json::to_vec(state)?;
            batch.insert(key.as_bytes(), value);
        }
        self.states.apply_batch(batch).map_err(storage_err)?;
        self.states.flush().map_err(storage_err)?;
        Ok(())
    }

    fn delete_many(&self, keys: &[String]) -> Result<()> {
        let mut batch = sled::Batch::default();
        for key in keys {
            batch.remove(key.as_bytes());
        }
        self.states.apply_batch(batch).map_err(storage_err)?;
        Ok(())
    }

    fn load_all(&self) -> Result<HashMap<String, DetectorState>> {
        let mut out = HashMap::new();
        for entry in self.states.iter() {
            let (key, value) = entry.map_err(storage_err)?;
            let key = String::from_utf8_lossy(&key).to_string();
            match serde_json::from_slice::<DetectorState>(&value) {
                Ok(state) => {
                    out.insert(key, state);
                }
                Err(e) => {
                    // A corrupt checkpoint must not block startup.
                    warn!(key = %key, error = %e, "Skipping undecodable detector state");
                }
            }
        }
        Ok(out)
    }
}

impl RecordLog for SledStore {
    fn append(&self, record: &DetectionRecord) -> Result<()> {
        let key = self.record_key(record.snapshot.timestamp);
        let value = serde_json::to_vec(record)?;
        self.records
            .insert(key.to_vec(), value)
            .map_err(storage_err)?;
        Ok(())
    }

    fn query(&self, filter: &RecordFilter) -> Result<Vec<DetectionRecord>> {
        let iter: Box<dyn Iterator<Item = sled::Result<(sled::IVec, sled::IVec)>>> =
            match filter.start {
                Some(start) => Box::new(self.records.range(time_prefix(start).to_vec()..)),
                None => Box::new(self.records.iter()),
            };

        let mut out = Vec::new();
        for entry in iter {
            if out.len() >= filter.limit {
                break;
            }
            let (_, value) = entry.map_err(storage_err)?;
            let record: DetectionRecord = match serde_json::from_slice(&value) {
                Ok(record) => record,
                Err(e) => {
                    warn!(error = %e, "Skipping undecodable detection record");
                    continue;
                }
            };
            if let Some(end) = filter.end {
                if record.snapshot.timestamp > end {
                    break;
                }
            }
            if filter.matches(&record) {
                out.push(record);
            }
        }
        Ok(out)
    }

    fn prune_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let mut removed = 0u64;
        let mut batch = sled::Batch::default();
        for entry in self.records.range(..time_prefix(cutoff).to_vec()) {
            let (key, _) = entry.map_err(storage_err)?;
            batch.remove(key);
            removed += 1;
        }
        if removed > 0 {
            self.records.apply_batch(batch).map_err(storage_err)?;
            info!(removed, "Pruned old detection records");
        }
        Ok(removed)
    }
}
