//! Ingest, configuration, and monitor endpoints backed by the detector
//! manager.

use crate::{error_response, ErrorResponse, SuccessResponse};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use driftwatch_alerting::payload::AlertPayload;
use driftwatch_alerting::Notifier;
use driftwatch_core::config::{DetectorConfig, DetectorConfigUpdate};
use driftwatch_core::metric_names::counters;
use driftwatch_core::sample::Sample;
use driftwatch_core::types::{AlertSide, DetectorKey, ItemId, ItemType, ProcessContext};
use driftwatch_detection::manager::DetectorManager;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Application state for engine-backed endpoints
#[derive(Clone)]
pub struct EngineState {
    /// Detector manager
    pub manager: Arc<DetectorManager>,
    /// Alert delivery transport
    pub notifier: Arc<dyn Notifier>,
}

impl EngineState {
    /// Create engine state
    pub fn new(manager: Arc<DetectorManager>, notifier: Arc<dyn Notifier>) -> Self {
        Self { manager, notifier }
    }
}

impl std::fmt::Debug for EngineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineState").finish()
    }
}

/// Ingest request body
#[derive(Debug, Deserialize)]
pub struct IngestRequest {
    /// Monitored item name
    pub item_name: String,
    /// Item type override (yield or parameter)
    pub item_type: Option<ItemType>,
    /// Monitored value
    pub value: f64,
    /// Throughput aggregated into this observation
    #[serde(alias = "uph")]
    pub n: u64,
    /// Observation time (ISO 8601; wall clock when absent or unparseable)
    pub timestamp: Option<String>,
    /// Production context
    #[serde(default, alias = "meta_data")]
    pub context: ProcessContext,
    /// Free-form tags journaled with the record
    #[serde(default)]
    pub tags: HashMap<String, serde_json::Value>,
    /// Caller-provided config override (highest precedence)
    pub config: Option<DetectorConfigUpdate>,
}

/// Ingest response body
#[derive(Debug, Serialize)]
pub struct IngestResponse {
    /// Canonical detector key the sample routed to
    pub key: String,
    /// Whether the detector raised an alert
    pub alert: bool,
    /// Whether the alert was pushed after cooldown
    pub should_push: bool,
    /// Direction of the alert, if any
    pub alert_side: Option<AlertSide>,
    /// Snapshot of the step
    pub snapshot: driftwatch_core::sample::DecisionSnapshot,
}

/// `POST /api/v1/data/ingest`
pub async fn ingest(
    State(state): State<Arc<EngineState>>,
    Json(request): Json<IngestRequest>,
) -> Result<Json<SuccessResponse<IngestResponse>>, (StatusCode, Json<ErrorResponse>)> {
    if !request.value.is_finite() {
        metrics::counter!(counters::SAMPLES_REJECTED_TOTAL).increment(1);
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::new("validation", "value must be finite")),
        ));
    }
    if request.n == 0 {
        metrics::counter!(counters::SAMPLES_REJECTED_TOTAL).increment(1);
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::new("validation", "n must be positive")),
        ));
    }
    if request.item_name.trim().is_empty() {
        metrics::counter!(counters::SAMPLES_REJECTED_TOTAL).increment(1);
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::new("validation", "item_name must not be empty")),
        ));
    }

    let timestamp = match &request.timestamp {
        Some(raw) => DetectorManager::parse_timestamp(raw),
        None => chrono::Utc::now(),
    };

    // The explicit item_type field folds into the override delta.
    let override_cfg = match (request.config, request.item_type) {
        (Some(mut delta), item_type) => {
            if item_type.is_some() {
                delta.item_type = item_type;
            }
            Some(delta)
        }
        (None, Some(item_type)) => Some(DetectorConfigUpdate {
            item_type: Some(item_type),
            ..Default::default()
        }),
        (None, None) => None,
    };

    let sample = Sample {
        item: ItemId::new(request.item_name.trim()),
        context: request.context,
        value: request.value,
        n: request.n,
        timestamp,
        tags: request.tags,
    };

    let outcome = state
        .manager
        .ingest(&sample, override_cfg.as_ref())
        .map_err(|e| error_response(&e))?;

    if outcome.should_push {
        let payload = AlertPayload::new(
            outcome.key.clone(),
            sample.item.as_str(),
            outcome.config.clone(),
            outcome.snapshot.clone(),
            &outcome.trajectory,
        );
        let notifier = Arc::clone(&state.notifier);
        tokio::spawn(async move {
            if let Err(e) = notifier.notify(&payload).await {
                error!(alert_id = %payload.alert_id, error = %e, "Alert push failed");
            }
        });
    }

    debug!(key = %outcome.key, alert = outcome.alert, "Sample ingested");

    Ok(Json(SuccessResponse::new(IngestResponse {
        key: outcome.key,
        alert: outcome.alert,
        should_push: outcome.should_push,
        alert_side: outcome.alert_side,
        snapshot: outcome.snapshot,
    })))
}

/// Register request body
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    /// Item name
    pub item_name: String,
    /// Optional production context; when present the config is stored
    /// under the composite key as well
    #[serde(default, alias = "meta_data")]
    pub context: ProcessContext,
    /// Configuration delta to persist
    #[serde(default)]
    pub config: DetectorConfigUpdate,
}

/// `POST /api/v1/items/register`
pub async fn register_item(
    State(state): State<Arc<EngineState>>,
    Json(request): Json<RegisterRequest>,
) -> Result<Json<SuccessResponse<String>>, (StatusCode, Json<ErrorResponse>)> {
    let item = request.item_name.trim();
    if item.is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::new("validation", "item_name must not be empty")),
        ));
    }

    state
        .manager
        .register(item, &request.config)
        .map_err(|e| error_response(&e))?;

    if !request.context.is_empty() {
        let key = DetectorKey::new(ItemId::new(item), request.context.clone()).canonical();
        state
            .manager
            .register(&key, &request.config)
            .map_err(|e| error_response(&e))?;
    }

    Ok(Json(SuccessResponse::new(format!(
        "Item {} registered",
        item
    ))))
}

/// Batch import request body
#[derive(Debug, Deserialize)]
pub struct BatchImportRequest {
    /// Item names to seed configs for
    pub items: Vec<String>,
    /// Shared overrides applied over the baked-in defaults
    #[serde(default)]
    pub config: DetectorConfigUpdate,
    /// Shared production context for every item in the batch
    #[serde(default, alias = "meta_data")]
    pub context: ProcessContext,
}

/// Batch import response body
#[derive(Debug, Serialize)]
pub struct BatchImportResponse {
    /// Configs created
    pub imported: usize,
    /// Items requested
    pub total_requested: usize,
}

/// `POST /api/v1/items/batch-import`
pub async fn batch_import(
    State(state): State<Arc<EngineState>>,
    Json(request): Json<BatchImportRequest>,
) -> Result<Json<SuccessResponse<BatchImportResponse>>, (StatusCode, Json<ErrorResponse>)> {
    let context = if request.context.is_empty() {
        None
    } else {
        Some(&request.context)
    };
    let imported = state
        .manager
        .batch_import(&request.items, &request.config, context)
        .map_err(|e| error_response(&e))?;

    Ok(Json(SuccessResponse::new(BatchImportResponse {
        imported,
        total_requested: request.items.len(),
    })))
}

/// Config listing response body
#[derive(Debug, Serialize)]
pub struct ConfigListing {
    /// Global defaults for future detectors
    pub global_defaults: DetectorConfig,
    /// Persisted per-key deltas
    pub item_configs: HashMap<String, DetectorConfigUpdate>,
}

/// `GET /api/v1/configs`
pub async fn list_configs(
    State(state): State<Arc<EngineState>>,
) -> Result<Json<SuccessResponse<ConfigListing>>, (StatusCode, Json<ErrorResponse>)> {
    let (global_defaults, item_configs) =
        state.manager.list_configs().map_err(|e| error_response(&e))?;
    Ok(Json(SuccessResponse::new(ConfigListing {
        global_defaults,
        item_configs,
    })))
}

/// `PUT /api/v1/configs/global`
///
/// Updates the defaults applied to *future* detectors; live detectors
/// keep the configuration they captured.
pub async fn update_global_config(
    State(state): State<Arc<EngineState>>,
    Json(delta): Json<DetectorConfigUpdate>,
) -> Result<Json<SuccessResponse<DetectorConfig>>, (StatusCode, Json<ErrorResponse>)> {
    if delta.is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::new("validation", "no changes provided")),
        ));
    }
    let updated = state
        .manager
        .update_global(&delta)
        .map_err(|e| error_response(&e))?;
    Ok(Json(SuccessResponse::new(updated)))
}

/// Per-key config update response
#[derive(Debug, Serialize)]
pub struct ConfigUpdateResponse {
    /// The key that was updated
    pub key: String,
    /// Whether a live detector picked the change up immediately
    pub live_reload: bool,
}

/// `PUT /api/v1/configs/{key}`
pub async fn update_item_config(
    State(state): State<Arc<EngineState>>,
    Path(key): Path<String>,
    Json(delta): Json<DetectorConfigUpdate>,
) -> Result<Json<SuccessResponse<ConfigUpdateResponse>>, (StatusCode, Json<ErrorResponse>)> {
    if delta.is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::new("validation", "no changes provided")),
        ));
    }
    let live_reload = state
        .manager
        .update_config(&key, &delta)
        .map_err(|e| error_response(&e))?;
    Ok(Json(SuccessResponse::new(ConfigUpdateResponse {
        key,
        live_reload,
    })))
}

/// Delete response
#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    /// The key requested
    pub key: String,
    /// Whether anything existed under the key
    pub removed: bool,
}

/// `DELETE /api/v1/configs/{key}`
pub async fn delete_item(
    State(state): State<Arc<EngineState>>,
    Path(key): Path<String>,
) -> Result<Json<SuccessResponse<DeleteResponse>>, (StatusCode, Json<ErrorResponse>)> {
    let removed = state.manager.remove(&key).map_err(|e| error_response(&e))?;
    if !removed {
        warn!(key = %key, "Delete requested for unknown detector");
    }
    Ok(Json(SuccessResponse::new(DeleteResponse { key, removed })))
}

/// Batch delete request body
#[derive(Debug, Deserialize)]
pub struct BatchDeleteRequest {
    /// Keys to remove
    pub items: Vec<String>,
}

/// Batch delete response body
#[derive(Debug, Serialize)]
pub struct BatchDeleteResponse {
    /// Keys that existed and were removed
    pub deleted_count: usize,
    /// Per-key failures
    pub errors: Vec<String>,
}

/// `POST /api/v1/configs/batch-delete`
pub async fn batch_delete(
    State(state): State<Arc<EngineState>>,
    Json(request): Json<BatchDeleteRequest>,
) -> Json<SuccessResponse<BatchDeleteResponse>> {
    let mut deleted_count = 0;
    let mut errors = Vec::new();
    for key in &request.items {
        match state.manager.remove(key) {
            Ok(true) => deleted_count += 1,
            Ok(false) => {}
            Err(e) => errors.push(format!("{}: {}", key, e)),
        }
    }
    Json(SuccessResponse::new(BatchDeleteResponse {
        deleted_count,
        errors,
    }))
}

/// Per-detector monitor entry
#[derive(Debug, Serialize)]
pub struct MonitorEntry {
    /// Last observed value
    pub last_val: f64,
    /// Last observation time
    pub last_time: chrono::DateTime<chrono::Utc>,
    /// Whether the last step alerted
    pub alert: bool,
    /// Last baseline in effect
    pub last_baseline: f64,
}

/// Monitor status response body
#[derive(Debug, Serialize)]
pub struct MonitorStatus {
    /// Detectors with at least one decision
    pub active_items_count: usize,
    /// Latest decision per detector key
    pub items: HashMap<String, MonitorEntry>,
}

/// `GET /api/v1/monitor/status`
pub async fn monitor_status(
    State(state): State<Arc<EngineState>>,
) -> Json<SuccessResponse<MonitorStatus>> {
    let mut items = HashMap::new();
    for (key, snapshot) in state.manager.monitor_snapshot() {
        items.insert(
            key,
            MonitorEntry {
                last_val: snapshot.value,
                last_time: snapshot.timestamp,
                alert: snapshot.is_alert(),
                last_baseline: snapshot.baseline,
            },
        );
    }
    Json(SuccessResponse::new(MonitorStatus {
        active_items_count: items.len(),
        items,
    }))
}
