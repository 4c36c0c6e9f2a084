//! Durable job and results stores.
//!
//! This crate provides:
//! - The [`JobStore`] and [`ResultsStore`] contracts
//! - A Redis implementation with field-level, script-guarded updates
//! - An in-memory implementation for tests (`test-util` feature)

pub mod error;
#[cfg(any(test, feature = "test-util"))]
pub mod memory;
pub mod redis_store;
pub mod traits;

pub use error::{StoreError, StoreResult};
#[cfg(any(test, feature = "test-util"))]
pub use memory::MemoryStore;
pub use redis_store::{RedisStore, StoreConfig};
pub use traits::{JobStore, ResultsStore};
