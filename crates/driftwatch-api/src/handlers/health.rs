//! Health check endpoints.
//!
//! Readiness is gated on the checkpoint store: without it the service
//! cannot make detector state durable. The record log is advisory (the
//! in-memory decision is authoritative), so a failing log only degrades
//! the report. The detector manager itself is CPU-only state and is
//! reported through its live detector count.

use axum::{extract::State, http::StatusCode, Json};
use driftwatch_core::store::{RecordFilter, RecordLog};
use driftwatch_detection::manager::DetectorManager;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, warn};

use crate::{ErrorResponse, SuccessResponse};

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Service status
    pub status: ServiceStatus,
    /// Service version
    pub version: String,
    /// Detectors currently resident in the manager
    pub active_detectors: usize,
    /// Component health
    pub components: Vec<ComponentHealth>,
}

/// Service status
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceStatus {
    /// Everything up
    Healthy,
    /// Serving, but an advisory component is down
    Degraded,
    /// Cannot serve safely
    Unhealthy,
}

/// Component health status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    /// Component name
    pub name: String,
    /// Status
    pub status: ServiceStatus,
    /// Optional error message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Application state for health checks
#[derive(Clone)]
pub struct HealthState {
    /// Service version string
    pub version: String,
    /// Detector manager, for the live detector count
    pub manager: Arc<DetectorManager>,
    /// Checkpoint-store probe (e.g. a sled flush)
    pub checkpoint_probe: Arc<dyn Fn() -> Result<(), String> + Send + Sync>,
    /// Record log, probed with a one-row query
    pub record_log: Arc<dyn RecordLog>,
}

impl HealthState {
    /// Create health state
    pub fn new(
        version: String,
        manager: Arc<DetectorManager>,
        checkpoint_probe: Arc<dyn Fn() -> Result<(), String> + Send + Sync>,
        record_log: Arc<dyn RecordLog>,
    ) -> Self {
        Self {
            version,
            manager,
            checkpoint_probe,
            record_log,
        }
    }

    /// Probe every component and fold the results into an overall
    /// status: a dead checkpoint store is unhealthy, a dead record log
    /// only degrades.
    fn check(&self) -> (ServiceStatus, Vec<ComponentHealth>) {
        let mut components = Vec::with_capacity(2);
        let mut overall = ServiceStatus::Healthy;

        match (self.checkpoint_probe)() {
            Ok(()) => components.push(ComponentHealth {
                name: "checkpoint_store".to_string(),
                status: ServiceStatus::Healthy,
                error: None,
            }),
            Err(e) => {
                error!("Checkpoint store probe failed: {}", e);
                components.push(ComponentHealth {
                    name: "checkpoint_store".to_string(),
                    status: ServiceStatus::Unhealthy,
                    error: Some(e),
                });
                overall = ServiceStatus::Unhealthy;
            }
        }

        let mut probe = RecordFilter::new();
        probe.limit = 1;
        match self.record_log.query(&probe) {
            Ok(_) => components.push(ComponentHealth {
                name: "record_log".to_string(),
                status: ServiceStatus::Healthy,
                error: None,
            }),
            Err(e) => {
                warn!("Record log probe failed: {}", e);
                components.push(ComponentHealth {
                    name: "record_log".to_string(),
                    status: ServiceStatus::Degraded,
                    error: Some(e.to_string()),
                });
                overall = overall.max(ServiceStatus::Degraded);
            }
        }

        (overall, components)
    }

    fn report(&self) -> (ServiceStatus, HealthResponse) {
        let (status, components) = self.check();
        let response = HealthResponse {
            status,
            version: self.version.clone(),
            active_detectors: self.manager.detector_count(),
            components,
        };
        (status, response)
    }
}

impl std::fmt::Debug for HealthState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HealthState")
            .field("version", &self.version)
            .finish()
    }
}

/// Liveness probe
pub async fn liveness() -> StatusCode {
    debug!("Liveness probe called");
    StatusCode::OK
}

/// Readiness probe: 503 while the checkpoint store is unreachable
pub async fn readiness(
    State(state): State<Arc<HealthState>>,
) -> Result<Json<SuccessResponse<HealthResponse>>, (StatusCode, Json<ErrorResponse>)> {
    debug!("Readiness probe called");

    let (status, response) = state.report();
    if status == ServiceStatus::Unhealthy {
        return Err((
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ErrorResponse::new("unhealthy", "Checkpoint store unavailable")),
        ));
    }

    Ok(Json(SuccessResponse::new(response)))
}

/// Full health report with per-component statuses
pub async fn health(
    State(state): State<Arc<HealthState>>,
) -> Json<SuccessResponse<HealthResponse>> {
    debug!("Health check called");
    let (_, response) = state.report();
    Json(SuccessResponse::new(response))
}
