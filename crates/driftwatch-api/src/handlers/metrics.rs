//! Prometheus metrics endpoint.

use axum::extract::State;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::Arc;
use tracing::warn;

/// Application state for the metrics endpoint
#[derive(Clone)]
pub struct MetricsState {
    handle: Option<PrometheusHandle>,
}

impl MetricsState {
    /// Install the Prometheus recorder and keep its render handle.
    /// Installation fails harmlessly if a recorder already exists (e.g.
    /// in tests); the endpoint then renders empty output.
    pub fn new() -> Self {
        match PrometheusBuilder::new().install_recorder() {
            Ok(handle) => Self {
                handle: Some(handle),
            },
            Err(e) => {
                warn!("Prometheus recorder not installed: {}", e);
                Self { handle: None }
            }
        }
    }
}

impl Default for MetricsState {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MetricsState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsState")
            .field("installed", &self.handle.is_some())
            .finish()
    }
}

/// `GET /metrics`
pub async fn metrics_handler(State(state): State<Arc<MetricsState>>) -> String {
    state
        .handle
        .as_ref()
        .map(|handle| handle.render())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_metrics_render() {
        let state = Arc::new(MetricsState::new());
        // Render succeeds whether or not this process won the recorder.
        let _ = metrics_handler(State(state)).await;
    }
}
