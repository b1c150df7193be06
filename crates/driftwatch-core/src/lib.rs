//! # Driftwatch Core
//!
//! Core types, errors, and configuration for the Driftwatch SPC service.
//!
//! This crate provides the foundational building blocks used across all
//! Driftwatch components:
//! - Common error types and result handling
//! - Sample, decision-snapshot, and checkpoint models
//! - Detector and service configuration
//! - Collaborator traits for persistence (config store, state store,
//!   record log)
//! - Metric name constants

#![warn(
    missing_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub
)]
#![forbid(unsafe_code)]

pub mod config;
pub mod error;
pub mod metric_names;
pub mod sample;
pub mod store;
pub mod types;

pub use error::{Error, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::{DetectorConfig, DetectorConfigUpdate, ServiceConfig};
    pub use crate::error::{Error, Result};
    pub use crate::sample::{DecisionSnapshot, DetectionRecord, DetectorState, Sample};
    pub use crate::store::{ConfigStore, RecordFilter, RecordLog, StateStore};
    pub use crate::types::{
        AlertSide, DetectorKey, ItemId, ItemType, MonitoringSide, ProcessContext, SkipReason,
    };
}
