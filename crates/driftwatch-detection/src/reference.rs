//! Adaptive reference-value (k) estimation.
//!
//! Same windowing and invalid-index rules as the baseline estimator,
//! but the statistic is dispersion: the estimator derives the CUSUM
//! allowance from the standard deviation of the valid window.

use crate::stats;
use crate::window::SampleWindow;
use chrono::{DateTime, Utc};
use driftwatch_core::config::DetectorConfig;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// How the reference value derives from the window dispersion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceMode {
    /// ARL-driven: `k = (delta / 2) * sigma`
    ArlDriven,
    /// Traditional: `k = 4 * sigma`
    Traditional,
}

/// Record of one reference-value recompute
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceUpdate {
    /// Sample time the recompute ran at
    pub timestamp: DateTime<Utc>,
    /// Reference value before the recompute
    pub old_value: f64,
    /// Reference value after the recompute (post step-limit and floor)
    pub new_value: f64,
    /// Whether the step limiter clipped the move
    pub limited: bool,
    /// Valid points that entered the statistic
    pub valid_points: usize,
    /// Standard deviation of the valid points
    pub std: f64,
}

/// Windowed dispersion estimator producing the reference value
#[derive(Debug, Clone)]
pub struct ReferenceEstimator {
    window: SampleWindow,
    mode: ReferenceMode,
    target_shift_sigma: f64,
    min_k: f64,
    max_change_ratio: f64,
    current_k: Option<f64>,
    current_std: Option<f64>,
    last_update: Option<ReferenceUpdate>,
}

impl ReferenceEstimator {
    /// Create an ARL-driven estimator from the detector configuration
    pub fn new(config: &DetectorConfig) -> Self {
        Self::with_mode(config, ReferenceMode::ArlDriven)
    }

    /// Create an estimator with an explicit derivation mode
    pub fn with_mode(config: &DetectorConfig, mode: ReferenceMode) -> Self {
        Self {
            window: SampleWindow::new(
                config.window_size,
                config.update_interval_hours,
                config.invalid_radius,
                config.base_n,
                config.min_detection_ratio,
            ),
            mode,
            target_shift_sigma: config.target_shift_sigma,
            min_k: config.min_k,
            max_change_ratio: config.max_change_ratio,
            current_k: None,
            current_std: None,
            last_update: None,
        }
    }

    /// Feed one observation; recomputes the reference value when due
    pub fn add(&mut self, timestamp: DateTime<Utc>, value: f64, n: u64) {
        self.window.push(timestamp, value, n);
        if self.window.is_full() && self.window.due_for_update(timestamp) {
            self.recompute(timestamp);
        }
    }

    /// Mark the most recent observation as alerted
    pub fn mark_last_alert(&mut self) {
        self.window.mark_last_alert();
    }

    /// Current reference value, if one has been computed
    pub fn k(&self) -> Option<f64> {
        self.current_k
    }

    /// Most recently computed standard deviation
    pub fn std(&self) -> Option<f64> {
        self.current_std
    }

    /// Most recent recompute record
    pub fn last_update(&self) -> Option<&ReferenceUpdate> {
        self.last_update.as_ref()
    }

    /// Seed the estimator from a restored checkpoint. The window stays
    /// empty and rewarms from new data.
    pub fn seed(&mut self, k: f64, std: f64) {
        if k > 0.0 {
            self.current_k = Some(k);
        }
        if std > 0.0 {
            self.current_std = Some(std);
        }
    }

    /// Apply a new target shift (hot reload); takes effect on the next
    /// recompute
    pub fn set_target_shift(&mut self, target_shift_sigma: f64) {
        self.target_shift_sigma = target_shift_sigma;
    }

    fn derive_k(&self, std: f64) -> f64 {
        let raw = match self.mode {
            ReferenceMode::ArlDriven => (self.target_shift_sigma / 2.0) * std,
            ReferenceMode::Traditional => 4.0 * std,
        };
        raw.max(self.min_k)
    }

    fn recompute(&mut self, timestamp: DateTime<Utc>) {
        let valid = self.window.valid_values();
        if valid.is_empty() {
            return;
        }

        let std = stats::population_std_dev(&valid);
        let target = self.derive_k(std);

        let (mut new_value, limited) = match self.current_k {
            None => (target, false),
            Some(current) => {
                let max_change = current * self.max_change_ratio;
                let change = target - current;
                if change.abs() > max_change {
                    (current + max_change.copysign(change), true)
                } else {
                    (target, false)
                }
            }
        };
        new_value = new_value.max(self.min_k);

        let update = ReferenceUpdate {
            timestamp,
            old_value: self.current_k.unwrap_or(new_value),
            new_value,
            limited,
            valid_points: valid.len(),
            std,
        };
        debug!(
            old = update.old_value,
            new = update.new_value,
            std,
            limited,
            "Reference value recomputed"
        );

        self.current_k = Some(new_value);
        self.current_std = Some(std);
        self.last_update = Some(update);
        self.window.mark_updated(timestamp);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::TimeZone;

    fn ts(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, minute / 60, minute % 60, 0)
            .single()
            .unwrap()
    }

    fn config(window_size: usize) -> DetectorConfig {
        DetectorConfig {
            window_size,
            update_interval_hours: 24.0,
            max_change_ratio: 0.1,
            invalid_radius: 1,
            base_n: 500,
            min_detection_ratio: 0.15,
            target_shift_sigma: 1.0,
            min_k: 0.001,
            ..Default::default()
        }
    }

    // Window of [2,4,4,4,5,5,7,9] has population std dev exactly 2.
    fn fill_known_std(est: &mut ReferenceEstimator) {
        for (i, v) in [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0].iter().enumerate() {
            est.add(ts(i as u32), *v, 500);
        }
    }

    #[test]
    fn test_arl_driven_k() {
        let mut est = ReferenceEstimator::new(&config(8));
        fill_known_std(&mut est);
        // k = (1.0 / 2) * 2.0
        assert_relative_eq!(est.k().unwrap(), 1.0, epsilon = 1e-9);
        assert_relative_eq!(est.std().unwrap(), 2.0, epsilon = 1e-9);
    }

    #[test]
    fn test_traditional_k() {
        let mut est = ReferenceEstimator::with_mode(&config(8), ReferenceMode::Traditional);
        fill_known_std(&mut est);
        // k = 4 * 2.0
        assert_relative_eq!(est.k().unwrap(), 8.0, epsilon = 1e-9);
    }

    #[test]
    fn test_min_k_floor() {
        let mut est = ReferenceEstimator::new(&config(3));
        for i in 0..3 {
            est.add(ts(i), 5.0, 500); // zero dispersion
        }
        assert_eq!(est.k(), Some(0.001));
    }

    #[test]
    fn test_step_limiter_on_k() {
        let mut est = ReferenceEstimator::new(&config(8));
        fill_known_std(&mut est);
        assert_relative_eq!(est.k().unwrap(), 1.0, epsilon = 1e-9);

        // A day later the window dispersion has exploded.
        let later = ts(0) + chrono::Duration::hours(25);
        for (i, v) in [0.0, 100.0, 0.0, 100.0, 0.0, 100.0, 0.0, 100.0]
            .iter()
            .enumerate()
        {
            est.add(later + chrono::Duration::minutes(i as i64), *v, 500);
        }
        // Move capped at 0.1 * 1.0 on the first due recompute.
        assert_relative_eq!(est.k().unwrap(), 1.1, epsilon = 1e-9);
        assert!(est.last_update().unwrap().limited);
    }

    #[test]
    fn test_seed_from_checkpoint() {
        let mut est = ReferenceEstimator::new(&config(700));
        est.seed(0.42, 2.5);
        assert_eq!(est.k(), Some(0.42));
        assert_eq!(est.std(), Some(2.5));
        // Non-positive seeds are ignored.
        let mut empty = ReferenceEstimator::new(&config(700));
        empty.seed(0.0, -1.0);
        assert_eq!(empty.k(), None);
        assert_eq!(empty.std(), None);
    }

    #[test]
    fn test_set_target_shift_changes_next_recompute() {
        let mut est = ReferenceEstimator::new(&config(8));
        fill_known_std(&mut est);
        assert_relative_eq!(est.k().unwrap(), 1.0, epsilon = 1e-9);

        est.set_target_shift(0.5);
        let later = ts(0) + chrono::Duration::hours(25);
        for (i, v) in [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0].iter().enumerate() {
            est.add(later + chrono::Duration::minutes(i as i64), *v, 500);
        }
        // Target becomes (0.5/2)*2 = 0.5; limited to 1.0 - 0.1.
        assert_relative_eq!(est.k().unwrap(), 0.9, epsilon = 1e-9);
    }
}
