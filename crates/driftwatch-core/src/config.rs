//! Configuration for detectors and for the service itself.
//!
//! [`DetectorConfig`] is the full per-detector knob set; a detector
//! captures its resolved config at construction time. Persisted per-key
//! overrides are sparse [`DetectorConfigUpdate`] deltas merged over the
//! global defaults, so precedence is: caller override > per-key config >
//! per-item config > global defaults.

use crate::error::Result;
use crate::types::{ItemType, MonitoringSide};
use figment::{
    providers::{Env, Format, Toml, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use validator::Validate;

/// Fallback standard deviation for parameter-type detectors before the
/// estimator window has formed.
pub const FALLBACK_PARAMETER_STD: f64 = 3.0;

/// Full per-detector configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct DetectorConfig {
    /// Initial baseline before the estimator produces one
    pub mu0: f64,

    /// Reference throughput: the design point at which the threshold
    /// multiplier is 1
    #[validate(range(min = 1))]
    pub base_n: u64,

    /// Minimum shift to detect, in sigma units
    #[validate(range(min = 0.000001))]
    pub target_shift_sigma: f64,

    /// Desired in-control average run length
    #[validate(range(min = 1.0))]
    pub target_arl0: f64,

    /// Monitored direction; `None` applies the item-type rule
    /// (yield -> upper, parameter -> both)
    pub monitoring_side: Option<MonitoringSide>,

    /// Strength of the low-throughput threshold penalty
    #[validate(range(min = 0.0, max = 2.0))]
    pub penalty_strength: f64,

    /// Periods a pushed alert suppresses re-pushes for
    pub cooldown_periods: usize,

    /// Whether cooldown suppression is applied at all
    pub enable_cooldown: bool,

    /// Kind of monitored quantity
    pub item_type: ItemType,

    /// Fast-initial-response head-start after reset
    pub use_fir: bool,

    /// FIR seed as a fraction of the base threshold
    #[validate(range(min = 0.0, max = 1.0))]
    pub fir_ratio: f64,

    /// Samples after reset during which FIR is considered active
    pub fir_duration: u64,

    /// EWMA baseline overlay in place of the windowed estimator
    pub use_ewma: bool,

    /// EWMA decay factor (weight of the newest value)
    #[validate(range(min = 0.000001, max = 1.0))]
    pub ewma_lambda: f64,

    /// Estimator window capacity in samples
    #[validate(range(min = 2))]
    pub window_size: usize,

    /// Minimum wall-clock hours between estimator recomputes
    #[validate(range(min = 0.0))]
    pub update_interval_hours: f64,

    /// Step limiter: max relative change per baseline/k recompute
    #[validate(range(min = 0.0))]
    pub max_change_ratio: f64,

    /// Samples on each side of an alert excluded from estimation
    pub invalid_radius: usize,

    /// Below `min_detection_ratio * base_n` the CUSUM step is skipped
    #[validate(range(min = 0.000001, max = 1.0))]
    pub min_detection_ratio: f64,

    /// Below `min_n_ratio * base_n` the threshold penalty kicks in
    #[validate(range(min = 0.000001, max = 1.0))]
    pub min_n_ratio: f64,

    /// Floor for the reference value
    #[validate(range(min = 0.0))]
    pub min_k: f64,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            mu0: 0.0005,
            base_n: 500,
            target_shift_sigma: 1.0,
            target_arl0: 250.0,
            monitoring_side: None,
            penalty_strength: 1.0,
            cooldown_periods: 6,
            enable_cooldown: true,
            item_type: ItemType::Parameter,
            use_fir: false,
            fir_ratio: 0.004,
            fir_duration: 700,
            use_ewma: false,
            ewma_lambda: 0.2,
            window_size: 700,
            update_interval_hours: 24.0,
            max_change_ratio: 0.1,
            invalid_radius: 10,
            min_detection_ratio: 0.15,
            min_n_ratio: 0.5,
            min_k: 0.001,
        }
    }
}

impl DetectorConfig {
    /// Monitored side after applying the item-type rule
    pub fn resolved_side(&self) -> MonitoringSide {
        self.monitoring_side
            .unwrap_or_else(|| self.item_type.default_side())
    }

    /// Apply a sparse delta in place
    pub fn apply(&mut self, delta: &DetectorConfigUpdate) {
        if let Some(v) = delta.mu0 {
            self.mu0 = v;
        }
        if let Some(v) = delta.base_n {
            self.base_n = v;
        }
        if let Some(v) = delta.target_shift_sigma {
            self.target_shift_sigma = v;
        }
        if let Some(v) = delta.target_arl0 {
            self.target_arl0 = v;
        }
        if let Some(v) = delta.monitoring_side {
            self.monitoring_side = Some(v);
        }
        if let Some(v) = delta.penalty_strength {
            self.penalty_strength = v;
        }
        if let Some(v) = delta.cooldown_periods {
            self.cooldown_periods = v;
        }
        if let Some(v) = delta.enable_cooldown {
            self.enable_cooldown = v;
        }
        if let Some(v) = delta.item_type {
            self.item_type = v;
        }
        if let Some(v) = delta.use_fir {
            self.use_fir = v;
        }
        if let Some(v) = delta.fir_ratio {
            self.fir_ratio = v;
        }
        if let Some(v) = delta.fir_duration {
            self.fir_duration = v;
        }
        if let Some(v) = delta.use_ewma {
            self.use_ewma = v;
        }
        if let Some(v) = delta.ewma_lambda {
            self.ewma_lambda = v;
        }
        if let Some(v) = delta.window_size {
            self.window_size = v;
        }
        if let Some(v) = delta.update_interval_hours {
            self.update_interval_hours = v;
        }
        if let Some(v) = delta.max_change_ratio {
            self.max_change_ratio = v;
        }
        if let Some(v) = delta.invalid_radius {
            self.invalid_radius = v;
        }
        if let Some(v) = delta.min_detection_ratio {
            self.min_detection_ratio = v;
        }
        if let Some(v) = delta.min_n_ratio {
            self.min_n_ratio = v;
        }
        if let Some(v) = delta.min_k {
            self.min_k = v;
        }
    }

    /// Return a copy with the delta applied
    pub fn merged(&self, delta: &DetectorConfigUpdate) -> Self {
        let mut out = self.clone();
        out.apply(delta);
        out
    }

    /// Validate invariants, mapping failures to [`crate::Error::Validation`]
    pub fn validate_config(&self) -> Result<()> {
        self.validate()
            .map_err(|e| crate::Error::validation(format!("Detector config invalid: {}", e)))?;
        Ok(())
    }
}

/// Sparse per-detector configuration delta
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfigUpdate {
    /// See [`DetectorConfig::mu0`]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mu0: Option<f64>,
    /// See [`DetectorConfig::base_n`]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_n: Option<u64>,
    /// See [`DetectorConfig::target_shift_sigma`]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_shift_sigma: Option<f64>,
    /// See [`DetectorConfig::target_arl0`]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_arl0: Option<f64>,
    /// See [`DetectorConfig::monitoring_side`]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub monitoring_side: Option<MonitoringSide>,
    /// See [`DetectorConfig::penalty_strength`]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub penalty_strength: Option<f64>,
    /// See [`DetectorConfig::cooldown_periods`]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cooldown_periods: Option<usize>,
    /// See [`DetectorConfig::enable_cooldown`]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enable_cooldown: Option<bool>,
    /// See [`DetectorConfig::item_type`]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub item_type: Option<ItemType>,
    /// See [`DetectorConfig::use_fir`]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub use_fir: Option<bool>,
    /// See [`DetectorConfig::fir_ratio`]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fir_ratio: Option<f64>,
    /// See [`DetectorConfig::fir_duration`]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fir_duration: Option<u64>,
    /// See [`DetectorConfig::use_ewma`]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub use_ewma: Option<bool>,
    /// See [`DetectorConfig::ewma_lambda`]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ewma_lambda: Option<f64>,
    /// See [`DetectorConfig::window_size`]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub window_size: Option<usize>,
    /// See [`DetectorConfig::update_interval_hours`]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub update_interval_hours: Option<f64>,
    /// See [`DetectorConfig::max_change_ratio`]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_change_ratio: Option<f64>,
    /// See [`DetectorConfig::invalid_radius`]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invalid_radius: Option<usize>,
    /// See [`DetectorConfig::min_detection_ratio`]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_detection_ratio: Option<f64>,
    /// See [`DetectorConfig::min_n_ratio`]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_n_ratio: Option<f64>,
    /// See [`DetectorConfig::min_k`]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_k: Option<f64>,
}

impl DetectorConfigUpdate {
    /// Whether no field is set
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    /// Whether the delta changes the CUSUM tuning (requires a base
    /// threshold recompute on a live detector)
    pub fn touches_tuning(&self) -> bool {
        self.target_shift_sigma.is_some() || self.target_arl0.is_some()
    }

    /// Merge another delta on top of this one; fields set in `other` win
    pub fn merge(&mut self, other: &DetectorConfigUpdate) {
        macro_rules! take {
            ($field:ident) => {
                if other.$field.is_some() {
                    self.$field = other.$field;
                }
            };
        }
        take!(mu0);
        take!(base_n);
        take!(target_shift_sigma);
        take!(target_arl0);
        take!(monitoring_side);
        take!(penalty_strength);
        take!(cooldown_periods);
        take!(enable_cooldown);
        take!(item_type);
        take!(use_fir);
        take!(fir_ratio);
        take!(fir_duration);
        take!(use_ewma);
        take!(ewma_lambda);
        take!(window_size);
        take!(update_interval_hours);
        take!(max_change_ratio);
        take!(invalid_radius);
        take!(min_detection_ratio);
        take!(min_n_ratio);
        take!(min_k);
    }
}

impl From<&DetectorConfig> for DetectorConfigUpdate {
    /// Bake a full configuration into an explicit delta, freezing every
    /// knob at its current value
    fn from(config: &DetectorConfig) -> Self {
        Self {
            mu0: Some(config.mu0),
            base_n: Some(config.base_n),
            target_shift_sigma: Some(config.target_shift_sigma),
            target_arl0: Some(config.target_arl0),
            monitoring_side: config.monitoring_side,
            penalty_strength: Some(config.penalty_strength),
            cooldown_periods: Some(config.cooldown_periods),
            enable_cooldown: Some(config.enable_cooldown),
            item_type: Some(config.item_type),
            use_fir: Some(config.use_fir),
            fir_ratio: Some(config.fir_ratio),
            fir_duration: Some(config.fir_duration),
            use_ewma: Some(config.use_ewma),
            ewma_lambda: Some(config.ewma_lambda),
            window_size: Some(config.window_size),
            update_interval_hours: Some(config.update_interval_hours),
            max_change_ratio: Some(config.max_change_ratio),
            invalid_radius: Some(config.invalid_radius),
            min_detection_ratio: Some(config.min_detection_ratio),
            min_n_ratio: Some(config.min_n_ratio),
            min_k: Some(config.min_k),
        }
    }
}

/// Service-level configuration loaded from file + environment
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct ServiceConfig {
    /// HTTP server settings
    pub server: ServerConfig,
    /// Persistence settings
    pub storage: StorageConfig,
    /// Alert push settings
    pub alerting: AlertingConfig,
    /// Logging and metrics settings
    pub observability: ObservabilityConfig,
    /// Global detector defaults applied to newly created detectors
    pub detector_defaults: DetectorConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            storage: StorageConfig::default(),
            alerting: AlertingConfig::default(),
            observability: ObservabilityConfig::default(),
            detector_defaults: DetectorConfig::default(),
        }
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind host
    #[validate(length(min = 1))]
    pub host: String,
    /// Bind port
    #[validate(range(min = 1, max = 65535))]
    pub port: u16,
    /// Request timeout in seconds
    #[validate(range(min = 1))]
    pub request_timeout_secs: u64,
    /// Graceful shutdown timeout in seconds
    #[validate(range(min = 1))]
    pub shutdown_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            request_timeout_secs: 30,
            shutdown_timeout_secs: 10,
        }
    }
}

/// Persistence configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory for the embedded database
    pub data_dir: PathBuf,
    /// Path of the JSON detector-config document
    pub config_path: PathBuf,
    /// Days of detection records kept by the pruning task
    #[validate(range(min = 1))]
    pub record_retention_days: i64,
    /// Hours between periodic state checkpoints
    #[validate(range(min = 1))]
    pub checkpoint_interval_hours: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data/driftwatch-db"),
            config_path: PathBuf::from("data/item_configs.json"),
            record_retention_days: 30,
            checkpoint_interval_hours: 24,
        }
    }
}

/// Alert delivery configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct AlertingConfig {
    /// Webhook target; alert pushes are logged only when unset
    pub webhook_url: Option<String>,
    /// Delivery timeout in seconds
    pub webhook_timeout_secs: Option<u64>,
    /// Delivery attempts before giving up
    pub webhook_max_retries: Option<u32>,
}

/// Logging and metrics configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Log format (json, text)
    pub log_format: String,
    /// Enable the Prometheus endpoint
    pub enable_metrics: bool,
    /// Metrics endpoint path
    pub metrics_path: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "text".to_string(),
            enable_metrics: true,
            metrics_path: "/metrics".to_string(),
        }
    }
}

impl ServiceConfig {
    /// Load configuration from a YAML file with `DRIFTWATCH_` env overrides
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config: Self = Figment::new()
            .merge(Yaml::file(path))
            .merge(Env::prefixed("DRIFTWATCH_").split("__"))
            .extract()
            .map_err(|e| crate::Error::config(format!("Failed to load config: {}", e)))?;
        config.validate_config()?;
        Ok(config)
    }

    /// Load configuration from a TOML file with `DRIFTWATCH_` env overrides
    pub fn from_toml<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config: Self = Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("DRIFTWATCH_").split("__"))
            .extract()
            .map_err(|e| crate::Error::config(format!("Failed to load config: {}", e)))?;
        config.validate_config()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate_config(&self) -> Result<()> {
        self.validate()
            .map_err(|e| crate::Error::validation(format!("Config validation failed: {}", e)))?;
        self.detector_defaults.validate_config()?;
        Ok(())
    }

    /// Socket address the server binds to
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detector_defaults_valid() {
        let config = DetectorConfig::default();
        assert!(config.validate_config().is_ok());
        assert_eq!(config.base_n, 500);
        assert_eq!(config.cooldown_periods, 6);
    }

    #[test]
    fn test_detector_config_rejects_zero_base_n() {
        let config = DetectorConfig {
            base_n: 0,
            ..Default::default()
        };
        assert!(config.validate_config().is_err());
    }

    #[test]
    fn test_detector_config_rejects_bad_arl0() {
        let config = DetectorConfig {
            target_arl0: 0.5,
            ..Default::default()
        };
        assert!(config.validate_config().is_err());
    }

    #[test]
    fn test_resolved_side_rule() {
        let yield_cfg = DetectorConfig {
            item_type: ItemType::Yield,
            monitoring_side: None,
            ..Default::default()
        };
        assert_eq!(yield_cfg.resolved_side(), MonitoringSide::Upper);

        let explicit = DetectorConfig {
            item_type: ItemType::Yield,
            monitoring_side: Some(MonitoringSide::Lower),
            ..Default::default()
        };
        assert_eq!(explicit.resolved_side(), MonitoringSide::Lower);
    }

    #[test]
    fn test_delta_apply() {
        let mut config = DetectorConfig::default();
        let delta = DetectorConfigUpdate {
            target_arl0: Some(1000.0),
            cooldown_periods: Some(3),
            ..Default::default()
        };
        assert!(delta.touches_tuning());
        config.apply(&delta);
        assert_eq!(config.target_arl0, 1000.0);
        assert_eq!(config.cooldown_periods, 3);
        assert_eq!(config.base_n, 500);
    }

    #[test]
    fn test_delta_merge_keeps_earlier_fields() {
        let mut first = DetectorConfigUpdate {
            mu0: Some(0.01),
            base_n: Some(1000),
            ..Default::default()
        };
        let second = DetectorConfigUpdate {
            base_n: Some(2000),
            cooldown_periods: Some(4),
            ..Default::default()
        };
        first.merge(&second);
        assert_eq!(first.mu0, Some(0.01));
        assert_eq!(first.base_n, Some(2000));
        assert_eq!(first.cooldown_periods, Some(4));
    }

    #[test]
    fn test_delta_empty() {
        assert!(DetectorConfigUpdate::default().is_empty());
        let delta = DetectorConfigUpdate {
            mu0: Some(1.0),
            ..Default::default()
        };
        assert!(!delta.is_empty());
    }

    #[test]
    fn test_service_config_defaults() {
        let config = ServiceConfig::default();
        assert!(config.validate_config().is_ok());
        assert_eq!(config.bind_addr(), "0.0.0.0:8080");
    }

    #[test]
    fn test_service_config_yaml_roundtrip() {
        let config = ServiceConfig::default();
        let yaml = serde_yaml::to_string(&config).unwrap();
        let back: ServiceConfig = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(back.server.port, config.server.port);
        assert_eq!(back.detector_defaults, config.detector_defaults);
    }
}
