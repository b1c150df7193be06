//! Bounded trajectory of recent decision snapshots.
//!
//! Serves two purposes: the cooldown policy inspects it for recent
//! pushes, and alert consumers receive it as the "last 30 periods"
//! context payload.

use driftwatch_core::sample::DecisionSnapshot;
use std::collections::VecDeque;

/// Snapshots retained per detector
pub const TRAJECTORY_CAPACITY: usize = 30;

/// Fixed-capacity ring of the most recent decision snapshots
#[derive(Debug, Clone, Default)]
pub struct TrajectoryCache {
    snapshots: VecDeque<DecisionSnapshot>,
}

impl TrajectoryCache {
    /// Create an empty trajectory
    pub fn new() -> Self {
        Self {
            snapshots: VecDeque::with_capacity(TRAJECTORY_CAPACITY),
        }
    }

    /// Append a snapshot, evicting the oldest at capacity
    pub fn push(&mut self, snapshot: DecisionSnapshot) {
        if self.snapshots.len() >= TRAJECTORY_CAPACITY {
            self.snapshots.pop_front();
        }
        self.snapshots.push_back(snapshot);
    }

    /// Snapshots oldest to newest
    pub fn iter(&self) -> impl Iterator<Item = &DecisionSnapshot> {
        self.snapshots.iter()
    }

    /// Owned copy, oldest to newest
    pub fn to_vec(&self) -> Vec<DecisionSnapshot> {
        self.snapshots.iter().cloned().collect()
    }

    /// Most recent snapshot
    pub fn latest(&self) -> Option<&DecisionSnapshot> {
        self.snapshots.back()
    }

    /// Number of retained snapshots
    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    /// Whether the trajectory is empty
    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    /// Whether any of the most recent `periods` snapshots executed a
    /// push. Callers evaluate this *before* appending the current step.
    pub fn pushed_within(&self, periods: usize) -> bool {
        self.snapshots
            .iter()
            .rev()
            .take(periods)
            .any(|s| s.push_executed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn snapshot(push_executed: bool) -> DecisionSnapshot {
        DecisionSnapshot {
            timestamp: Utc::now(),
            value: 0.0,
            n: 500,
            baseline: 0.0,
            k: 0.0,
            threshold: 0.0,
            s_plus: 0.0,
            s_minus: 0.0,
            std: 1.0,
            threshold_multiplier: 1.0,
            n_ratio: 1.0,
            alert_side: None,
            skip_reason: None,
            push_executed,
        }
    }

    #[test]
    fn test_bounded_at_capacity() {
        let mut cache = TrajectoryCache::new();
        for _ in 0..40 {
            cache.push(snapshot(false));
        }
        assert_eq!(cache.len(), TRAJECTORY_CAPACITY);
    }

    #[test]
    fn test_pushed_within_range() {
        let mut cache = TrajectoryCache::new();
        cache.push(snapshot(true));
        cache.push(snapshot(false));
        cache.push(snapshot(false));

        assert!(cache.pushed_within(3));
        // The push is 3 entries back; a 2-period window misses it.
        assert!(!cache.pushed_within(2));
    }

    #[test]
    fn test_pushed_within_empty() {
        let cache = TrajectoryCache::new();
        assert!(!cache.pushed_within(6));
    }

    #[test]
    fn test_latest() {
        let mut cache = TrajectoryCache::new();
        assert!(cache.latest().is_none());
        cache.push(snapshot(true));
        assert!(cache.latest().map(|s| s.push_executed).unwrap_or(false));
    }
}
