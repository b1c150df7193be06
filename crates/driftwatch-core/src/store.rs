//! Collaborator interfaces for persistence.
//!
//! Three concerns, three traits: per-detector configuration, detector
//! state checkpoints, and the append-only record log. All methods are
//! synchronous: every shipped implementation is a local write, and the
//! record-log append runs inside the per-key detector critical section,
//! which must not suspend.

use crate::config::{DetectorConfig, DetectorConfigUpdate};
use crate::error::Result;
use crate::sample::{DetectionRecord, DetectorState};
use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// Persisted per-detector configuration document.
///
/// Keys are canonical detector keys or bare item names; a reserved
/// sentinel entry holds the global defaults.
pub trait ConfigStore: Send + Sync {
    /// Fetch the stored delta for a key, if any
    fn get(&self, key: &str) -> Result<Option<DetectorConfigUpdate>>;

    /// Upsert a delta for a key, merging over any existing entry
    fn set(&self, key: &str, delta: &DetectorConfigUpdate) -> Result<()>;

    /// Remove a key's entry; returns whether it existed
    fn delete(&self, key: &str) -> Result<bool>;

    /// All stored per-key deltas (excluding the global sentinel)
    fn list(&self) -> Result<HashMap<String, DetectorConfigUpdate>>;

    /// Fetch the global defaults, if any have been persisted
    fn get_global(&self) -> Result<Option<DetectorConfig>>;

    /// Replace the global defaults
    fn set_global(&self, config: &DetectorConfig) -> Result<()>;
}

/// Durable per-detector state checkpoints
pub trait StateStore: Send + Sync {
    /// Upsert a batch of snapshots keyed by canonical detector key
    fn upsert_many(&self, states: &[(String, DetectorState)]) -> Result<()>;

    /// Delete a batch of snapshots
    fn delete_many(&self, keys: &[String]) -> Result<()>;

    /// Load every persisted snapshot (startup restore)
    fn load_all(&self) -> Result<HashMap<String, DetectorState>>;
}

/// Filters for record-log queries
#[derive(Debug, Clone, Default)]
pub struct RecordFilter {
    /// Match the original item name
    pub item: Option<String>,
    /// Match the product context field
    pub product: Option<String>,
    /// Match the line context field
    pub line: Option<String>,
    /// Match the station context field
    pub station: Option<String>,
    /// Inclusive lower bound on observation time
    pub start: Option<DateTime<Utc>>,
    /// Inclusive upper bound on observation time
    pub end: Option<DateTime<Utc>>,
    /// Result cap
    pub limit: usize,
}

impl RecordFilter {
    /// Default result cap applied when none is given
    pub const DEFAULT_LIMIT: usize = 200;

    /// Empty filter with the default cap
    pub fn new() -> Self {
        Self {
            limit: Self::DEFAULT_LIMIT,
            ..Default::default()
        }
    }

    /// Whether a record passes the non-time filters
    pub fn matches(&self, record: &DetectionRecord) -> bool {
        if let Some(item) = &self.item {
            if record.item.as_str() != item {
                return false;
            }
        }
        if let Some(product) = &self.product {
            if record.context.product.as_deref() != Some(product.as_str()) {
                return false;
            }
        }
        if let Some(line) = &self.line {
            if record.context.line.as_deref() != Some(line.as_str()) {
                return false;
            }
        }
        if let Some(station) = &self.station {
            if record.context.station.as_deref() != Some(station.as_str()) {
                return false;
            }
        }
        true
    }
}

/// Append-only log of processed samples and their decisions.
///
/// The engine never depends on it for correctness: append failures are
/// logged and the in-memory decision stays authoritative.
pub trait RecordLog: Send + Sync {
    /// Append one record
    fn append(&self, record: &DetectionRecord) -> Result<()>;

    /// Query records matching the filter, sorted by timestamp ascending,
    /// capped at `filter.limit`
    fn query(&self, filter: &RecordFilter) -> Result<Vec<DetectionRecord>>;

    /// Delete records with timestamps strictly before the cutoff;
    /// returns the number removed
    fn prune_before(&self, cutoff: DateTime<Utc>) -> Result<u64>;
}
