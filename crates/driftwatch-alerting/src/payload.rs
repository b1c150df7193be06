//! Alert payload assembly.
//!
//! The payload handed to alert consumers carries the firing decision,
//! the detector's algorithm configuration, and the last-30-periods
//! trajectory split into parallel series for easy charting.

use chrono::{DateTime, Utc};
use driftwatch_core::config::DetectorConfig;
use driftwatch_core::sample::DecisionSnapshot;
use driftwatch_core::types::AlertSide;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Trajectory window transposed into per-series arrays
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrajectorySeries {
    /// Observation times
    pub timestamps: Vec<DateTime<Utc>>,
    /// Raw values
    pub values: Vec<f64>,
    /// Baselines in effect
    pub baselines: Vec<f64>,
    /// Reference values in effect
    pub k_values: Vec<f64>,
    /// Positive accumulators
    pub cusum_plus: Vec<f64>,
    /// Negative accumulators
    pub cusum_minus: Vec<f64>,
    /// Decision thresholds
    pub threshold_h: Vec<f64>,
}

impl From<&[DecisionSnapshot]> for TrajectorySeries {
    fn from(snapshots: &[DecisionSnapshot]) -> Self {
        let mut series = Self::default();
        for s in snapshots {
            series.timestamps.push(s.timestamp);
            series.values.push(s.value);
            series.baselines.push(s.baseline);
            series.k_values.push(s.k);
            series.cusum_plus.push(s.s_plus);
            series.cusum_minus.push(s.s_minus);
            series.threshold_h.push(s.threshold);
        }
        series
    }
}

/// Alert event pushed to consumers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertPayload {
    /// Unique alert identifier
    pub alert_id: Uuid,
    /// Canonical detector key
    pub key: String,
    /// Original item name
    pub item: String,
    /// Observation time of the firing sample
    pub alert_time: DateTime<Utc>,
    /// Direction of the drift
    pub alert_side: Option<AlertSide>,
    /// Configuration the detector ran with
    pub algorithm_config: DetectorConfig,
    /// Snapshot of the firing step
    pub current: DecisionSnapshot,
    /// Last 30 periods of context
    pub history: TrajectorySeries,
}

impl AlertPayload {
    /// Assemble a payload from a firing decision and its trajectory
    pub fn new(
        key: impl Into<String>,
        item: impl Into<String>,
        config: DetectorConfig,
        snapshot: DecisionSnapshot,
        trajectory: &[DecisionSnapshot],
    ) -> Self {
        Self {
            alert_id: Uuid::new_v4(),
            key: key.into(),
            item: item.into(),
            alert_time: snapshot.timestamp,
            alert_side: snapshot.alert_side,
            algorithm_config: config,
            history: TrajectorySeries::from(trajectory),
            current: snapshot,
        }
    }
}
