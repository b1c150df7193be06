//! Error types for Driftwatch operations.
//!
//! One error hierarchy is shared across all crates, with constructor
//! helpers and context wrapping.

use std::fmt;

/// Result type alias for Driftwatch operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for Driftwatch operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Validation errors (rejected samples, bad config values)
    #[error("Validation error: {0}")]
    Validation(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Persistence errors (config store, state store, record log)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Detection engine errors
    #[error("Detection error: {0}")]
    Detection(String),

    /// Alert delivery errors
    #[error("Alerting error: {0}")]
    Alerting(String),

    /// Internal errors
    #[error("Internal error: {0}")]
    Internal(String),

    /// Not found errors
    #[error("{0} not found")]
    NotFound(String),

    /// Generic errors with context
    #[error("{context}: {source}")]
    WithContext {
        /// Error context
        context: String,
        /// Source error
        source: Box<Error>,
    },
}

impl Error {
    /// Add context to an error
    pub fn context<C: fmt::Display>(self, context: C) -> Self {
        Error::WithContext {
            context: context.to_string(),
            source: Box::new(self),
        }
    }

    /// Create a configuration error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Error::Config(msg.into())
    }

    /// Create a validation error
    pub fn validation<S: Into<String>>(msg: S) -> Self {
        Error::Validation(msg.into())
    }

    /// Create a storage error
    pub fn storage<S: Into<String>>(msg: S) -> Self {
        Error::Storage(msg.into())
    }

    /// Create a detection error
    pub fn detection<S: Into<String>>(msg: S) -> Self {
        Error::Detection(msg.into())
    }

    /// Create an alerting error
    pub fn alerting<S: Into<String>>(msg: S) -> Self {
        Error::Alerting(msg.into())
    }

    /// Create an internal error
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Error::Internal(msg.into())
    }

    /// Create a not found error
    pub fn not_found<S: Into<String>>(item: S) -> Self {
        Error::NotFound(item.into())
    }

    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Storage(_) | Error::Io(_) | Error::Alerting(_))
    }
}
