//! Webhook alert delivery.

use crate::payload::AlertPayload;
use crate::Notifier;
use async_trait::async_trait;
use driftwatch_core::metric_names::counters;
use driftwatch_core::{Error, Result};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Webhook configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    /// Webhook URL
    pub url: String,
    /// Request timeout (seconds)
    pub timeout_secs: u64,
    /// Delivery attempts before giving up
    pub max_retries: u32,
    /// Initial retry delay (milliseconds)
    pub retry_delay_ms: u64,
    /// Backoff multiplier between attempts
    pub backoff_multiplier: f64,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            timeout_secs: 10,
            max_retries: 3,
            retry_delay_ms: 1000,
            backoff_multiplier: 2.0,
        }
    }
}

/// Webhook notifier delivering alert payloads over HTTP POST
pub struct WebhookNotifier {
    client: Client,
    config: WebhookConfig,
}

impl WebhookNotifier {
    /// Create a notifier; fails on an empty URL or unusable client
    pub fn new(config: WebhookConfig) -> Result<Self> {
        if config.url.is_empty() {
            return Err(Error::config("Webhook URL cannot be empty"));
        }

        info!("Creating webhook notifier for {}", config.url);

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    fn is_retryable_status(status: StatusCode) -> bool {
        status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS
    }

    async fn send_with_retry(&self, payload: &AlertPayload) -> Result<()> {
        let body = serde_json::to_string(payload)?;

        let mut attempt = 0;
        let mut delay = self.config.retry_delay_ms;

        loop {
            attempt += 1;

            let request = self
                .client
                .post(&self.config.url)
                .header("Content-Type", "application/json")
                .body(body.clone());

            match request.send().await {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        debug!(
                            alert_id = %payload.alert_id,
                            status = %status,
                            attempt,
                            "Webhook delivered"
                        );
                        metrics::counter!(counters::WEBHOOK_SUCCESS_TOTAL).increment(1);
                        return Ok(());
                    }

                    if Self::is_retryable_status(status) && attempt < self.config.max_retries {
                        warn!(
                            alert_id = %payload.alert_id,
                            status = %status,
                            attempt,
                            delay_ms = delay,
                            "Webhook failed with retryable status, retrying"
                        );
                        tokio::time::sleep(Duration::from_millis(delay)).await;
                        delay = (delay as f64 * self.config.backoff_multiplier) as u64;
                        continue;
                    }

                    let text = response.text().await.unwrap_or_default();
                    error!(
                        alert_id = %payload.alert_id,
                        status = %status,
                        body = %text,
                        attempts = attempt,
                        "Webhook delivery failed"
                    );
                    metrics::counter!(counters::WEBHOOK_FAILURES_TOTAL).increment(1);
                    return Err(Error::alerting(format!(
                        "Webhook failed with status {}",
                        status
                    )));
                }
                Err(e) if attempt < self.config.max_retries => {
                    warn!(
                        alert_id = %payload.alert_id,
                        error = %e,
                        attempt,
                        delay_ms = delay,
                        "Webhook request error, retrying"
                    );
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                    delay = (delay as f64 * self.config.backoff_multiplier) as u64;
                }
                Err(e) => {
                    error!(
                        alert_id = %payload.alert_id,
                        error = %e,
                        attempts = attempt,
                        "Webhook delivery gave up"
                    );
                    metrics::counter!(counters::WEBHOOK_FAILURES_TOTAL).increment(1);
                    return Err(Error::alerting(format!("Webhook request failed: {}", e)));
                }
            }
        }
    }
}

impl std::fmt::Debug for WebhookNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookNotifier")
            .field("url", &self.config.url)
            .finish()
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, payload: &AlertPayload) -> Result<()> {
        self.send_with_retry(payload).await
    }
}

/// Notifier that only logs; used when no webhook is configured
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, payload: &AlertPayload) -> Result<()> {
        info!(
            alert_id = %payload.alert_id,
            key = %payload.key,
            side = ?payload.alert_side,
            value = payload.current.value,
            "Alert push (no webhook configured)"
        );
        Ok(())
    }
}
