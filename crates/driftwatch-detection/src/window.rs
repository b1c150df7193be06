//! Rolling sample window with known-bad point tracking.
//!
//! Both the baseline and the reference estimator keep recent samples in
//! a fixed-capacity window and exclude *invalid* points from their
//! statistics: samples taken at very low throughput, and samples in the
//! neighborhood of an alert (so the anomaly itself is never learned).

use chrono::{DateTime, Utc};
use std::collections::{BTreeSet, VecDeque};

/// One buffered observation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowPoint {
    /// Observation time
    pub timestamp: DateTime<Utc>,
    /// Monitored value
    pub value: f64,
    /// Throughput of the observation
    pub n: u64,
}

/// Fixed-capacity rolling window of samples with invalid-index tracking
#[derive(Debug, Clone)]
pub struct SampleWindow {
    capacity: usize,
    update_interval_hours: f64,
    invalid_radius: usize,
    base_n: u64,
    min_detection_ratio: f64,
    points: VecDeque<WindowPoint>,
    alert_indices: BTreeSet<usize>,
    low_n_indices: BTreeSet<usize>,
    last_update: Option<DateTime<Utc>>,
}

impl SampleWindow {
    /// Create a window
    pub fn new(
        capacity: usize,
        update_interval_hours: f64,
        invalid_radius: usize,
        base_n: u64,
        min_detection_ratio: f64,
    ) -> Self {
        Self {
            capacity,
            update_interval_hours,
            invalid_radius,
            base_n,
            min_detection_ratio,
            points: VecDeque::with_capacity(capacity),
            alert_indices: BTreeSet::new(),
            low_n_indices: BTreeSet::new(),
            last_update: None,
        }
    }

    /// Append an observation, evicting the oldest when at capacity.
    /// Low-throughput points are marked on entry.
    pub fn push(&mut self, timestamp: DateTime<Utc>, value: f64, n: u64) {
        if self.points.len() >= self.capacity {
            self.points.pop_front();
            self.alert_indices = shift_down(&self.alert_indices);
            self.low_n_indices = shift_down(&self.low_n_indices);
        }
        self.points.push_back(WindowPoint {
            timestamp,
            value,
            n,
        });
        if (n as f64) < self.base_n as f64 * self.min_detection_ratio {
            self.low_n_indices.insert(self.points.len() - 1);
        }
    }

    /// Mark the most recently pushed point as alerted
    pub fn mark_last_alert(&mut self) {
        if !self.points.is_empty() {
            self.alert_indices.insert(self.points.len() - 1);
        }
    }

    /// Number of buffered points
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Whether the window holds no points
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Whether the window has reached capacity
    pub fn is_full(&self) -> bool {
        self.points.len() >= self.capacity
    }

    /// Whether a recompute is due: the first time the window fills, then
    /// whenever `update_interval_hours` of sample time has passed since
    /// the last successful recompute
    pub fn due_for_update(&self, now: DateTime<Utc>) -> bool {
        match self.last_update {
            None => self.is_full(),
            Some(last) => {
                let hours = (now - last).num_seconds() as f64 / 3600.0;
                hours >= self.update_interval_hours
            }
        }
    }

    /// Record a successful recompute at the given sample time
    pub fn mark_updated(&mut self, timestamp: DateTime<Utc>) {
        self.last_update = Some(timestamp);
    }

    /// Values that survive the invalid-index exclusion
    pub fn valid_values(&self) -> Vec<f64> {
        let invalid = self.invalid_indices();
        self.points
            .iter()
            .enumerate()
            .filter(|(idx, _)| !invalid.contains(idx))
            .map(|(_, point)| point.value)
            .collect()
    }

    /// Invalid indices: low-throughput points plus the
    /// `+-invalid_radius` neighborhood of every alerted point
    pub fn invalid_indices(&self) -> BTreeSet<usize> {
        let mut invalid = self.low_n_indices.clone();
        for &alert_idx in &self.alert_indices {
            let start = alert_idx.saturating_sub(self.invalid_radius);
            let end = (alert_idx + self.invalid_radius + 1).min(self.points.len());
            invalid.extend(start..end);
        }
        invalid
    }

    /// Alerted indices currently inside the window
    #[cfg(test)]
    pub fn alert_indices(&self) -> &BTreeSet<usize> {
        &self.alert_indices
    }
}

fn shift_down(indices: &BTreeSet<usize>) -> BTreeSet<usize> {
    indices
        .iter()
        .filter(|&&i| i > 0)
        .map(|&i| i - 1)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, hour % 24, 0, 0)
            .single()
            .unwrap()
    }

    fn window(capacity: usize) -> SampleWindow {
        SampleWindow::new(capacity, 24.0, 1, 500, 0.15)
    }

    #[test]
    fn test_push_and_evict() {
        let mut w = window(3);
        w.push(ts(0), 1.0, 500);
        w.push(ts(1), 2.0, 500);
        w.push(ts(2), 3.0, 500);
        assert!(w.is_full());
        w.push(ts(3), 4.0, 500);
        assert_eq!(w.len(), 3);
        assert_eq!(w.valid_values(), vec![2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_low_throughput_marked_on_entry() {
        let mut w = window(5);
        w.push(ts(0), 1.0, 500);
        w.push(ts(1), 2.0, 50); // below 0.15 * 500
        w.push(ts(2), 3.0, 500);
        assert_eq!(w.valid_values(), vec![1.0, 3.0]);
    }

    #[test]
    fn test_alert_neighborhood_excluded() {
        let mut w = window(10);
        for i in 0..5 {
            w.push(ts(i), i as f64, 500);
        }
        w.push(ts(5), 99.0, 500);
        for i in 6..8 {
            w.push(ts(i), i as f64, 500);
        }
        // points: [0,1,2,3,4,99,6,7]; alert the spike at index 5
        w.alert_indices_mut_for_test(5);
        let valid = w.valid_values();
        assert!(!valid.contains(&99.0));
        assert!(!valid.contains(&4.0));
        assert!(!valid.contains(&6.0));
        assert!(valid.contains(&3.0));
        assert!(valid.contains(&7.0));
    }

    #[test]
    fn test_mark_last_alert() {
        let mut w = window(5);
        w.push(ts(0), 1.0, 500);
        w.push(ts(1), 50.0, 500);
        w.mark_last_alert();
        assert!(w.alert_indices().contains(&1));
        assert_eq!(w.valid_values(), Vec::<f64>::new());
    }

    #[test]
    fn test_indices_shift_on_eviction() {
        let mut w = window(3);
        w.push(ts(0), 1.0, 500);
        w.push(ts(1), 50.0, 500);
        w.mark_last_alert(); // alert at index 1
        w.push(ts(2), 3.0, 500);
        w.push(ts(3), 4.0, 500); // evicts index 0; alert shifts to 0
        assert!(w.alert_indices().contains(&0));
        // radius 1 around index 0 excludes index 1 as well
        assert_eq!(w.valid_values(), vec![4.0]);
        w.push(ts(4), 5.0, 500); // alert falls out of the window
        assert!(w.alert_indices().is_empty());
        assert_eq!(w.valid_values(), vec![3.0, 4.0, 5.0]);
    }

    #[test]
    fn test_due_for_update_first_fill_then_interval() {
        let mut w = window(2);
        w.push(ts(0), 1.0, 500);
        assert!(!w.due_for_update(ts(0)));
        w.push(ts(1), 2.0, 500);
        assert!(w.due_for_update(ts(1)));
        w.mark_updated(ts(1));
        assert!(!w.due_for_update(ts(2)));
        let next_day = ts(1) + chrono::Duration::hours(24);
        assert!(w.due_for_update(next_day));
    }

    impl SampleWindow {
        fn alert_indices_mut_for_test(&mut self, idx: usize) {
            self.alert_indices.insert(idx);
        }
    }
}
