//! Sample and decision records flowing through the engine.
//!
//! A [`Sample`] enters the manager, each detector step produces a
//! [`DecisionSnapshot`], the snapshot is journaled as a
//! [`DetectionRecord`], and periodic checkpoints persist a
//! [`DetectorState`] per detector.

use crate::types::{AlertSide, DetectorKey, ItemId, ItemType, ProcessContext, SkipReason};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One ingested measurement
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sample {
    /// Monitored item
    pub item: ItemId,
    /// Production context
    #[serde(default)]
    pub context: ProcessContext,
    /// Monitored value (defect rate or raw parameter)
    pub value: f64,
    /// Throughput: number of units aggregated into this observation
    pub n: u64,
    /// Observation time
    pub timestamp: DateTime<Utc>,
    /// Free-form tags carried through to the record log
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub tags: HashMap<String, serde_json::Value>,
}

impl Sample {
    /// Detector key this sample routes to
    pub fn detector_key(&self) -> DetectorKey {
        DetectorKey::new(self.item.clone(), self.context.clone())
    }
}

/// Snapshot of one detector step, kept for observability and cooldown
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionSnapshot {
    /// Observation time of the sample
    pub timestamp: DateTime<Utc>,
    /// Raw monitored value
    pub value: f64,
    /// Throughput of the sample
    pub n: u64,
    /// Baseline in effect for this step
    pub baseline: f64,
    /// Reference value in effect for this step
    pub k: f64,
    /// Decision threshold the accumulators were compared against
    pub threshold: f64,
    /// Positive CUSUM accumulator after the step (pre-reset on alert)
    pub s_plus: f64,
    /// Negative CUSUM accumulator after the step (pre-reset on alert)
    pub s_minus: f64,
    /// Standard deviation used for standardization
    pub std: f64,
    /// Dynamic threshold multiplier applied to the base threshold
    pub threshold_multiplier: f64,
    /// `n / base_n` for this sample
    pub n_ratio: f64,
    /// Which side fired, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alert_side: Option<AlertSide>,
    /// Set when the CUSUM step was skipped
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip_reason: Option<SkipReason>,
    /// Whether the alert was pushed to consumers (cooldown outcome)
    pub push_executed: bool,
}

impl DecisionSnapshot {
    /// Whether this step raised an alert (pushed or suppressed)
    pub fn is_alert(&self) -> bool {
        self.alert_side.is_some()
    }
}

/// Checkpointed per-detector state.
///
/// Deliberately excludes the estimator windows: a restored detector
/// keeps its accumulators and last learned parameters but rewarms its
/// window history from new data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectorState {
    /// Last adaptive baseline
    pub baseline: f64,
    /// Last estimated standard deviation
    pub std: f64,
    /// Last reference value
    pub k: f64,
    /// Positive accumulator
    pub s_plus: f64,
    /// Negative accumulator
    pub s_minus: f64,
    /// Observation time of the last processed sample
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_data_ts: Option<DateTime<Utc>>,
}

/// Append-only record of one processed sample plus its decision
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionRecord {
    /// Canonical detector key
    pub key: String,
    /// Original item name (kept unlowercased for display)
    pub item: ItemId,
    /// Production context of the sample
    #[serde(default)]
    pub context: ProcessContext,
    /// Item type the detector ran as
    pub item_type: ItemType,
    /// Full decision snapshot
    pub snapshot: DecisionSnapshot,
    /// Tags carried from the sample
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub tags: HashMap<String, serde_json::Value>,
}

impl DetectionRecord {
    /// Whether the recorded step raised an alert
    pub fn is_alert(&self) -> bool {
        self.snapshot.is_alert()
    }
}
