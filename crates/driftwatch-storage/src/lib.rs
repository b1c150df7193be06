//! # Driftwatch Storage
//!
//! Embedded persistence for Driftwatch.
//!
//! This crate provides:
//! - A sled-backed state checkpoint store and append-only record log
//! - A JSON-document detector configuration store
//! - In-memory implementations for tests and ephemeral deployments
//!
//! The collaborator traits themselves live in `driftwatch_core::store`.

#![warn(missing_debug_implementations, rust_2018_idioms, unreachable_pub)]

pub mod config_store;
pub mod memory;
pub mod query;
pub mod sled_store;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config_store::JsonConfigStore;
    pub use crate::memory::{MemoryConfigStore, MemoryRecordLog, MemoryStateStore};
    pub use crate::query::{RecordQuery, TimeRange};
    pub use crate::sled_store::SledStore;
    pub use driftwatch_core::store::{ConfigStore, RecordFilter, RecordLog, StateStore};
}
