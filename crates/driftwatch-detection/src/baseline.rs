//! Adaptive baseline estimation.
//!
//! Maintains a windowed robust mean of the monitored value, recomputed
//! at most once per update interval. A step limiter caps each move so a
//! spike that slipped past alert filtering cannot drag the baseline.

use crate::stats;
use crate::window::SampleWindow;
use chrono::{DateTime, Utc};
use driftwatch_core::config::DetectorConfig;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Record of one baseline recompute
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaselineUpdate {
    /// Sample time the recompute ran at
    pub timestamp: DateTime<Utc>,
    /// Baseline before the recompute
    pub old_value: f64,
    /// Baseline after the recompute (post step-limit)
    pub new_value: f64,
    /// Whether the step limiter clipped the move
    pub limited: bool,
    /// Valid points that entered the mean
    pub valid_points: usize,
    /// Total points in the window
    pub window_points: usize,
}

/// Windowed adaptive mean of the monitored value
#[derive(Debug, Clone)]
pub struct BaselineEstimator {
    window: SampleWindow,
    max_change_ratio: f64,
    current: Option<f64>,
    last_update: Option<BaselineUpdate>,
    update_count: u64,
}

impl BaselineEstimator {
    /// Create an estimator from the detector configuration
    pub fn new(config: &DetectorConfig) -> Self {
        Self {
            window: SampleWindow::new(
                config.window_size,
                config.update_interval_hours,
                config.invalid_radius,
                config.base_n,
                config.min_detection_ratio,
            ),
            max_change_ratio: config.max_change_ratio,
            current: None,
            last_update: None,
            update_count: 0,
        }
    }

    /// Feed one observation; recomputes the baseline when due
    pub fn add(&mut self, timestamp: DateTime<Utc>, value: f64, n: u64) {
        self.window.push(timestamp, value, n);
        if self.window.is_full() && self.window.due_for_update(timestamp) {
            self.recompute(timestamp);
        }
    }

    /// Mark the most recent observation as alerted so the anomaly and
    /// its neighborhood are excluded from future recomputes
    pub fn mark_last_alert(&mut self) {
        self.window.mark_last_alert();
    }

    /// Current baseline, if one has been computed
    pub fn get(&self) -> Option<f64> {
        self.current
    }

    /// Most recent recompute record
    pub fn last_update(&self) -> Option<&BaselineUpdate> {
        self.last_update.as_ref()
    }

    /// Number of recomputes performed
    pub fn update_count(&self) -> u64 {
        self.update_count
    }

    fn recompute(&mut self, timestamp: DateTime<Utc>) {
        let valid = self.window.valid_values();
        if valid.is_empty() {
            // Nothing trustworthy in the window; keep the baseline and
            // retry on the next sample.
            return;
        }

        let target = stats::mean(&valid);
        let (new_value, limited) = match self.current {
            // First recompute, and recovery from a wedged zero baseline,
            // take the mean directly.
            None => (target, false),
            Some(current) if current == 0.0 => (target, false),
            Some(current) => {
                let max_change = current.abs() * self.max_change_ratio;
                let change = target - current;
                if change.abs() > max_change {
                    (current + max_change.copysign(change), true)
                } else {
                    (target, false)
                }
            }
        };

        let update = BaselineUpdate {
            timestamp,
            old_value: self.current.unwrap_or(new_value),
            new_value,
            limited,
            valid_points: valid.len(),
            window_points: self.window.len(),
        };
        debug!(
            old = update.old_value,
            new = update.new_value,
            limited,
            valid_points = update.valid_points,
            "Baseline recomputed"
        );

        self.current = Some(new_value);
        self.last_update = Some(update);
        self.update_count += 1;
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
            ..Default::default()
        }
    }

    #[test]
    fn test_no_baseline_until_window_full() {
        let mut est = BaselineEstimator::new(&config(5));
        for i in 0..4 {
            est.add(ts(i), 1.0, 500);
        }
        assert_eq!(est.get(), None);
        est.add(ts(4), 1.0, 500);
        assert_eq!(est.get(), Some(1.0));
        assert_eq!(est.update_count(), 1);
    }

    #[test]
    fn test_first_recompute_unlimited() {
        let mut est = BaselineEstimator::new(&config(3));
        est.add(ts(0), 10.0, 500);
        est.add(ts(1), 20.0, 500);
        est.add(ts(2), 30.0, 500);
        assert_eq!(est.get(), Some(20.0));
        assert!(!est.last_update().unwrap().limited);
    }

    #[test]
    fn test_step_limiter_caps_move() {
        let mut est = BaselineEstimator::new(&config(3));
        for i in 0..3 {
            est.add(ts(i), 10.0, 500);
        }
        assert_eq!(est.get(), Some(10.0));

        // 24h later the window is full of much larger values.
        let later = ts(0) + chrono::Duration::hours(25);
        for i in 0..3 {
            est.add(later + chrono::Duration::minutes(i), 100.0, 500);
        }
        // |change| capped at 0.1 * 10 = 1.
        assert_relative_eq!(est.get().unwrap(), 11.0, epsilon = 1e-9);
        assert!(est.last_update().unwrap().limited);
    }

    #[test]
    fn test_step_limiter_caps_downward_move() {
        let mut est = BaselineEstimator::new(&config(3));
        for i in 0..3 {
            est.add(ts(i), 10.0, 500);
        }
        let later = ts(0) + chrono::Duration::hours(25);
        for i in 0..3 {
            est.add(later + chrono::Duration::minutes(i), 1.0, 500);
        }
        assert_relative_eq!(est.get().unwrap(), 9.0, epsilon = 1e-9);
    }

    #[test]
    fn test_low_throughput_points_excluded() {
        let mut est = BaselineEstimator::new(&config(4));
        est.add(ts(0), 1.0, 500);
        est.add(ts(1), 1000.0, 10); // low throughput, excluded
        est.add(ts(2), 3.0, 500);
        est.add(ts(3), 2.0, 500);
        assert_relative_eq!(est.get().unwrap(), 2.0, epsilon = 1e-9);
    }

    #[test]
    fn test_all_invalid_leaves_baseline_unchanged() {
        let mut est = BaselineEstimator::new(&config(2));
        est.add(ts(0), 1.0, 10);
        est.add(ts(1), 2.0, 10);
        // Window full but every point is low-throughput.
        assert_eq!(est.get(), None);
        assert_eq!(est.update_count(), 0);
    }

    #[test]
    fn test_no_recompute_before_interval() {
        let mut est = BaselineEstimator::new(&config(3));
        for i in 0..3 {
            est.add(ts(i), 10.0, 500);
        }
        assert_eq!(est.update_count(), 1);
        // More samples an hour later: not due yet.
        est.add(ts(0) + chrono::Duration::hours(1), 50.0, 500);
        assert_eq!(est.update_count(), 1);
        assert_eq!(est.get(), Some(10.0));
    }
}
