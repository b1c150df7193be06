//! # Driftwatch API
//!
//! REST surface for the Driftwatch SPC service.
//!
//! This crate provides:
//! - Sample ingest endpoint returning the detection decision
//! - Detector configuration CRUD (global defaults, per-key, batch)
//! - Record-log history queries
//! - Monitor status, health checks, and Prometheus metrics
//!
//! The surface is a thin translation layer: all engine semantics live in
//! `driftwatch-detection`.

#![warn(missing_debug_implementations, rust_2018_idioms, unreachable_pub)]

pub mod handlers;
pub mod routes;
pub mod server;

use axum::http::StatusCode;
use driftwatch_core::Error;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

/// API server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Server bind address
    pub bind_addr: SocketAddr,
    /// Enable CORS
    pub enable_cors: bool,
    /// CORS allowed origins
    pub cors_origins: Vec<String>,
    /// Request timeout (seconds)
    pub timeout_secs: u64,
    /// Enable request logging
    pub enable_logging: bool,
    /// Metrics endpoint path
    pub metrics_path: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".parse().expect("static addr"),
            enable_cors: true,
            cors_origins: vec!["*".to_string()],
            timeout_secs: 30,
            enable_logging: true,
            metrics_path: "/metrics".to_string(),
        }
    }
}

/// API error response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error code
    pub code: String,
    /// Error message
    pub message: String,
}

impl ErrorResponse {
    /// Create an error response
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

/// Map an engine error onto a status code and wire error
pub fn error_response(e: &Error) -> (StatusCode, axum::Json<ErrorResponse>) {
    let (status, code) = match e {
        Error::Validation(_) => (StatusCode::BAD_REQUEST, "validation"),
        Error::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
        Error::Config(_) => (StatusCode::BAD_REQUEST, "config"),
        _ => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
    };
    (status, axum::Json(ErrorResponse::new(code, e.to_string())))
}

/// Success response wrapper
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuccessResponse<T> {
    /// Response data
    pub data: T,
    /// Optional metadata
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<ResponseMetadata>,
}

impl<T> SuccessResponse<T> {
    /// Wrap response data
    pub fn new(data: T) -> Self {
        Self {
            data,
            metadata: None,
        }
    }

    /// Attach metadata
    pub fn with_metadata(mut self, metadata: ResponseMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// Response metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseMetadata {
    /// Total count (for list responses)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_count: Option<usize>,
}

/// Re-export commonly used types
pub mod prelude {
    pub use crate::handlers::engine::EngineState;
    pub use crate::handlers::health::HealthState;
    pub use crate::handlers::metrics::MetricsState;
    pub use crate::handlers::query::QueryState;
    pub use crate::routes::create_router;
    pub use crate::server::ApiServer;
    pub use crate::{ApiConfig, ErrorResponse, SuccessResponse};
}
