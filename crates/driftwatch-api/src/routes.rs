//! API route definitions.
//!
//! Transport concerns (request tracing, CORS, timeouts) come from
//! `tower-http` layers applied over the routed handlers.

use axum::{
    http::{header, HeaderValue, Method},
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::{
    handlers::{
        engine::{
            batch_delete, batch_import, delete_item, ingest, list_configs, monitor_status,
            register_item, update_global_config, update_item_config, EngineState,
        },
        health::{health, liveness, readiness, HealthState},
        metrics::{metrics_handler, MetricsState},
        query::{query_history, QueryState},
    },
    ApiConfig,
};

/// Create the main API router
pub fn create_router(
    config: ApiConfig,
    health_state: Arc<HealthState>,
    engine_state: Arc<EngineState>,
    query_state: Arc<QueryState>,
    metrics_state: Arc<MetricsState>,
) -> Router {
    let engine_routes = Router::new()
        .route("/data/ingest", post(ingest))
        .route("/items/register", post(register_item))
        .route("/items/batch-import", post(batch_import))
        .route("/configs", get(list_configs))
        .route("/configs/global", put(update_global_config))
        .route("/configs/batch-delete", post(batch_delete))
        .route(
            "/configs/:key",
            put(update_item_config).delete(delete_item),
        )
        .route("/monitor/status", get(monitor_status))
        .with_state(engine_state);

    let history_routes = Router::new()
        .route("/history", get(query_history))
        .with_state(query_state);

    let api_v1 = engine_routes.merge(history_routes);

    let health_routes = Router::new()
        .route("/health", get(health))
        .route("/health/live", get(liveness))
        .route("/health/ready", get(readiness))
        .with_state(health_state);

    let metrics_route = Router::new()
        .route(&config.metrics_path, get(metrics_handler))
        .with_state(metrics_state);

    let app = Router::new()
        .nest("/api/v1", api_v1)
        .merge(health_routes)
        .merge(metrics_route);

    let app = if config.enable_logging {
        app.layer(TraceLayer::new_for_http())
    } else {
        app
    };

    let app = if config.enable_cors {
        app.layer(cors_layer(&config.cors_origins))
    } else {
        app
    };

    app.layer(TimeoutLayer::new(Duration::from_secs(config.timeout_secs)))
}

/// CORS layer for the configured origins; `*` opens the surface up
fn cors_layer(origins: &[String]) -> CorsLayer {
    let methods = [Method::GET, Method::POST, Method::PUT, Method::DELETE];
    let headers = [header::CONTENT_TYPE, header::AUTHORIZATION];

    if origins.iter().any(|o| o == "*") {
        return CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(methods)
            .allow_headers(headers);
    }

    let allowed: Vec<HeaderValue> = origins.iter().filter_map(|o| o.parse().ok()).collect();
    CorsLayer::new()
        .allow_origin(allowed)
        .allow_methods(methods)
        .allow_headers(headers)
}
