//! API server implementation.

use crate::{
    handlers::{engine::EngineState, health::HealthState, metrics::MetricsState, query::QueryState},
    routes::create_router,
    ApiConfig,
};
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};

/// API server wiring the router to a listener
#[derive(Debug)]
pub struct ApiServer {
    config: ApiConfig,
    health_state: Arc<HealthState>,
    engine_state: Arc<EngineState>,
    query_state: Arc<QueryState>,
    metrics_state: Arc<MetricsState>,
}

impl ApiServer {
    /// Create a new API server
    pub fn new(
        config: ApiConfig,
        health_state: Arc<HealthState>,
        engine_state: Arc<EngineState>,
        query_state: Arc<QueryState>,
        metrics_state: Arc<MetricsState>,
    ) -> Self {
        Self {
            config,
            health_state,
            engine_state,
            query_state,
            metrics_state,
        }
    }

    /// Server bind address
    pub fn bind_addr(&self) -> std::net::SocketAddr {
        self.config.bind_addr
    }

    /// Start serving until the shutdown future resolves
    pub async fn serve<F>(self, shutdown: F) -> Result<(), Box<dyn std::error::Error>>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        info!("Starting API server on {}", self.config.bind_addr);

        let bind_addr = self.config.bind_addr;
        let metrics_path = self.config.metrics_path.clone();
        let router = create_router(
            self.config,
            self.health_state,
            self.engine_state,
            self.query_state,
            self.metrics_state,
        );

        let listener = TcpListener::bind(bind_addr).await?;

        info!("API server listening on {}", bind_addr);
        info!("Health check: http://{}/health", bind_addr);
        info!("Metrics: http://{}{}", bind_addr, metrics_path);

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| {
                error!("Server error: {}", e);
                Box::new(e) as Box<dyn std::error::Error>
            })
    }
}
