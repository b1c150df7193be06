//! Metric names and labels used throughout the system.

/// Metrics namespace
pub const METRICS_NAMESPACE: &str = "driftwatch";

/// Counter metrics
pub mod counters {
    /// Total samples ingested
    pub const SAMPLES_INGESTED_TOTAL: &str = "driftwatch_samples_ingested_total";

    /// Total samples rejected at the boundary
    pub const SAMPLES_REJECTED_TOTAL: &str = "driftwatch_samples_rejected_total";

    /// Total CUSUM steps skipped for low throughput
    pub const STEPS_SKIPPED_TOTAL: &str = "driftwatch_steps_skipped_total";

    /// Total alerts raised by detectors
    pub const ALERTS_RAISED_TOTAL: &str = "driftwatch_alerts_raised_total";

    /// Total alerts pushed after cooldown
    pub const ALERTS_PUSHED_TOTAL: &str = "driftwatch_alerts_pushed_total";

    /// Total alerts suppressed by cooldown
    pub const ALERTS_SUPPRESSED_TOTAL: &str = "driftwatch_alerts_suppressed_total";

    /// Total record-log append failures
    pub const RECORD_APPEND_FAILURES_TOTAL: &str = "driftwatch_record_append_failures_total";

    /// Total webhook deliveries
    pub const WEBHOOK_SUCCESS_TOTAL: &str = "driftwatch_webhook_success_total";

    /// Total webhook failures
    pub const WEBHOOK_FAILURES_TOTAL: &str = "driftwatch_webhook_failures_total";
}

/// Histogram metrics
pub mod histograms {
    /// Detector step latency
    pub const DETECTION_DURATION_SECONDS: &str = "driftwatch_detection_duration_seconds";

    /// State checkpoint latency
    pub const CHECKPOINT_DURATION_SECONDS: &str = "driftwatch_checkpoint_duration_seconds";
}

/// Gauge metrics
pub mod gauges {
    /// Detectors currently resident
    pub const ACTIVE_DETECTORS: &str = "driftwatch_active_detectors";

    /// Records removed by the last pruning pass
    pub const RECORDS_PRUNED: &str = "driftwatch_records_pruned";
}

/// Metric labels
pub mod labels {
    /// Detector key label
    pub const KEY: &str = "key";

    /// Alert side label
    pub const SIDE: &str = "side";

    /// Item type label
    pub const ITEM_TYPE: &str = "item_type";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_constants() {
        assert_eq!(METRICS_NAMESPACE, "driftwatch");
        assert!(counters::SAMPLES_INGESTED_TOTAL.starts_with(METRICS_NAMESPACE));
        assert!(histograms::DETECTION_DURATION_SECONDS.starts_with(METRICS_NAMESPACE));
        assert!(gauges::ACTIVE_DETECTORS.starts_with(METRICS_NAMESPACE));
    }
}
