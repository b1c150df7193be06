//! Adaptive CUSUM detector.
//!
//! Per-detector state machine: adapts its baseline and reference value
//! to recent data, derives a throughput-sensitive decision threshold,
//! runs the CUSUM recursion on the monitored side(s), and resets (with
//! optional fast-initial-response head-start) after an alert.

use crate::arl;
use crate::baseline::BaselineEstimator;
use crate::reference::ReferenceEstimator;
use chrono::{DateTime, Utc};
use driftwatch_core::config::{DetectorConfig, DetectorConfigUpdate, FALLBACK_PARAMETER_STD};
use driftwatch_core::sample::{DecisionSnapshot, DetectorState};
use driftwatch_core::types::{AlertSide, ItemType, SkipReason};
use tracing::debug;

/// Result of one detector step
#[derive(Debug, Clone)]
pub struct StepOutcome {
    /// Whether an alert fired (pushed or not)
    pub alert: bool,
    /// Direction of the alert, if any
    pub alert_side: Option<AlertSide>,
    /// Full snapshot of the step (pre-reset accumulator values)
    pub snapshot: DecisionSnapshot,
}

/// Adaptive CUSUM state machine for one detector key
#[derive(Debug, Clone)]
pub struct CusumDetector {
    config: DetectorConfig,
    h_base: f64,
    mu0: f64,
    s_plus: f64,
    s_minus: f64,
    samples_since_reset: u64,
    total_samples: u64,
    fir_active: bool,
    ewma_baseline: f64,
    baseline: BaselineEstimator,
    reference: ReferenceEstimator,
    last_decision: Option<DecisionSnapshot>,
    last_data_ts: Option<DateTime<Utc>>,
}

impl CusumDetector {
    /// Build a detector from its resolved configuration
    pub fn new(config: DetectorConfig) -> Self {
        let h_base = arl::decision_interval(config.target_shift_sigma, config.target_arl0);
        Self {
            mu0: config.mu0,
            ewma_baseline: config.mu0,
            h_base,
            s_plus: 0.0,
            s_minus: 0.0,
            samples_since_reset: 0,
            total_samples: 0,
            fir_active: false,
            baseline: BaselineEstimator::new(&config),
            reference: ReferenceEstimator::new(&config),
            last_decision: None,
            last_data_ts: None,
            config,
        }
    }

    /// Consume one sample and decide whether the process has drifted
    pub fn update(&mut self, timestamp: DateTime<Utc>, value: f64, n: u64) -> StepOutcome {
        let side = self.config.resolved_side();
        self.samples_since_reset += 1;
        self.last_data_ts = Some(timestamp);

        // Estimators always see the point, even when the CUSUM step is
        // skipped below.
        self.baseline.add(timestamp, value, n);
        self.reference.add(timestamp, value, n);

        let mut mu = self.baseline.get().unwrap_or(self.mu0);
        if self.config.use_ewma {
            self.ewma_baseline =
                self.config.ewma_lambda * value + (1.0 - self.config.ewma_lambda) * self.ewma_baseline;
            mu = self.ewma_baseline;
        }
        let k = self.reference.k().unwrap_or(self.config.min_k);

        let n_ratio = n as f64 / self.config.base_n as f64;
        if n_ratio < self.config.min_detection_ratio {
            let snapshot = DecisionSnapshot {
                timestamp,
                value,
                n,
                baseline: mu,
                k,
                threshold: 0.0,
                s_plus: self.s_plus,
                s_minus: self.s_minus,
                std: 0.0,
                threshold_multiplier: 0.0,
                n_ratio,
                alert_side: None,
                skip_reason: Some(SkipReason::LowThroughput),
                push_executed: false,
            };
            self.last_decision = Some(snapshot.clone());
            return StepOutcome {
                alert: false,
                alert_side: None,
                snapshot,
            };
        }

        self.total_samples += 1;

        let (sigma_base, sigma_cur) = self.dispersion(mu, n);

        let threshold;
        let multiplier;
        if sigma_base == 0.0 || sigma_cur == 0.0 {
            // Degenerate dispersion: no standardization, flat threshold.
            multiplier = 1.0;
            threshold = self.h_base;
            let deviation = value - mu;
            if side.watches_upper() {
                self.s_plus = (self.s_plus + deviation - k).max(0.0);
            }
            if side.watches_lower() {
                self.s_minus = (self.s_minus + (-deviation) - k).max(0.0);
            }
        } else {
            let mut m = sigma_cur / sigma_base;
            if n_ratio < self.config.min_n_ratio {
                let penalty = (self.config.min_n_ratio / n_ratio - 1.0).sqrt();
                m *= 1.0 + self.config.penalty_strength * penalty;
            }
            multiplier = m;
            threshold = self.h_base * m;

            let x_std = (value - mu) / sigma_cur;
            let k_std = k / sigma_cur;
            if side.watches_upper() {
                self.s_plus = (self.s_plus + x_std - k_std).max(0.0);
            }
            if side.watches_lower() {
                self.s_minus = (self.s_minus + (-x_std) - k_std).max(0.0);
            }
        }

        // Structural invariant; a violation here is a bug, not bad input.
        assert!(
            self.s_plus >= 0.0 && self.s_minus >= 0.0,
            "CUSUM accumulator went negative"
        );

        if self.fir_active && self.samples_since_reset > self.config.fir_duration {
            // Head-start window over; accumulators decay naturally.
            self.fir_active = false;
        }

        let alert_plus = side.watches_upper() && self.s_plus >= threshold;
        let alert_minus = side.watches_lower() && self.s_minus >= threshold;
        let alert_side = if alert_plus {
            Some(AlertSide::Upper)
        } else if alert_minus {
            Some(AlertSide::Lower)
        } else {
            None
        };
        let alert = alert_plus || alert_minus;

        let snapshot = DecisionSnapshot {
            timestamp,
            value,
            n,
            baseline: mu,
            k,
            threshold,
            s_plus: self.s_plus,
            s_minus: self.s_minus,
            std: sigma_cur,
            threshold_multiplier: multiplier,
            n_ratio,
            alert_side,
            skip_reason: None,
            push_executed: false,
        };
        self.last_decision = Some(snapshot.clone());

        if alert {
            debug!(
                side = %snapshot.alert_side.map(|s| s.to_string()).unwrap_or_default(),
                s_plus = snapshot.s_plus,
                s_minus = snapshot.s_minus,
                threshold,
                "CUSUM alert"
            );
            // The anomaly and its neighborhood must not be learned.
            self.baseline.mark_last_alert();
            self.reference.mark_last_alert();
            self.reset();
        }

        StepOutcome {
            alert,
            alert_side,
            snapshot,
        }
    }

    /// Apply a configuration delta to the live detector.
    ///
    /// Tuning changes (`target_shift_sigma`, `target_arl0`) recompute the
    /// base threshold immediately; accumulators are never reset. Window
    /// geometry fields only affect detectors constructed afterwards.
    pub fn reconfigure(&mut self, delta: &DetectorConfigUpdate) {
        self.config.apply(delta);
        if let Some(mu0) = delta.mu0 {
            self.mu0 = mu0;
        }
        if delta.touches_tuning() {
            self.h_base =
                arl::decision_interval(self.config.target_shift_sigma, self.config.target_arl0);
            self.reference
                .set_target_shift(self.config.target_shift_sigma);
            debug!(h_base = self.h_base, "Recomputed base threshold");
        }
    }

    /// Checkpoint payload for the state store
    pub fn snapshot_state(&self) -> DetectorState {
        DetectorState {
            baseline: self.baseline.get().unwrap_or(self.mu0),
            std: self.reference.std().unwrap_or(0.0),
            k: self.reference.k().unwrap_or(self.config.min_k),
            s_plus: self.s_plus,
            s_minus: self.s_minus,
            last_data_ts: self.last_data_ts,
        }
    }

    /// Restore from a checkpoint. Accumulators and last learned
    /// parameters survive; estimator windows rewarm from new data.
    pub fn restore_state(&mut self, state: &DetectorState) {
        self.s_plus = state.s_plus;
        self.s_minus = state.s_minus;
        self.mu0 = state.baseline;
        self.ewma_baseline = state.baseline;
        self.reference.seed(state.k, state.std);
        self.last_data_ts = state.last_data_ts;
    }

    /// Base decision threshold currently in effect
    pub fn h_base(&self) -> f64 {
        self.h_base
    }

    /// Resolved configuration the detector runs with
    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Snapshot of the most recent step
    pub fn last_decision(&self) -> Option<&DecisionSnapshot> {
        self.last_decision.as_ref()
    }

    /// Positive accumulator
    pub fn s_plus(&self) -> f64 {
        self.s_plus
    }

    /// Negative accumulator
    pub fn s_minus(&self) -> f64 {
        self.s_minus
    }

    /// Whether the FIR head-start is still in effect
    pub fn fir_active(&self) -> bool {
        self.fir_active
    }

    /// Samples consumed over the detector's lifetime (excluding skips)
    pub fn total_samples(&self) -> u64 {
        self.total_samples
    }

    fn dispersion(&self, mu: f64, n: u64) -> (f64, f64) {
        match self.config.item_type {
            ItemType::Yield => (
                yield_sigma(mu, self.config.base_n),
                yield_sigma(mu, n),
            ),
            ItemType::Parameter => {
                let raw = match self.reference.std() {
                    Some(std) if std > 0.0 => std,
                    _ => FALLBACK_PARAMETER_STD,
                };
                (
                    raw / (self.config.base_n.max(1) as f64).sqrt(),
                    raw / (n.max(1) as f64).sqrt(),
                )
            }
        }
    }

    fn reset(&mut self) {
        let side = self.config.resolved_side();
        if self.config.use_fir {
            let seed = self.h_base * self.config.fir_ratio;
            self.s_plus = if side.watches_upper() { seed } else { 0.0 };
            self.s_minus = if side.watches_lower() { seed } else { 0.0 };
            self.fir_active = true;
        } else {
            self.s_plus = 0.0;
            self.s_minus = 0.0;
            self.fir_active = false;
        }
        self.samples_since_reset = 0;
    }
}

/// Binomial-rate standard deviation `sqrt(p(1-p)/size)`; zero outside
/// the open unit interval
fn yield_sigma(p: f64, size: u64) -> f64 {
    if p <= 0.0 || p >= 1.0 || size == 0 {
        return 0.0;
    }
    (p * (1.0 - p) / size as f64).sqrt()
}
