//! # Driftwatch Alerting
//!
//! Alert payload assembly and delivery.
//!
//! Cooldown debouncing happens upstream in the detector manager; this
//! crate only ships payloads that survived it.

#![warn(missing_debug_implementations, rust_2018_idioms, unreachable_pub)]

pub mod payload;
pub mod webhook;

use async_trait::async_trait;
use driftwatch_core::Result;
use payload::AlertPayload;

/// Alert delivery transport
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver one alert payload
    async fn notify(&self, payload: &AlertPayload) -> Result<()>;
}

/// Re-export commonly used types
pub mod prelude {
    pub use crate::payload::{AlertPayload, TrajectorySeries};
    pub use crate::webhook::{LogNotifier, WebhookConfig, WebhookNotifier};
    pub use crate::Notifier;
}
