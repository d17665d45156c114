//! Persistence for score series and derived artifacts
//!
//! The analytics core only needs keyed upserts and range queries; see
//! [`TrendStore`] for the contract. SQLite is the production backend,
//! the in-memory store backs tests and dry runs.

pub mod repository;

pub use repository::{
    create_memory_store, create_sqlite_store, MemoryTrendStore, SharedTrendStore,
    SqliteTrendStore, TrendStore,
};

use crate::config::{StorageBackend, StorageConfig};
use crate::error::Result;

/// Open the store selected by configuration
pub fn open_store(config: &StorageConfig) -> Result<SharedTrendStore> {
    match config.backend {
        StorageBackend::Sqlite => create_sqlite_store(&config.sqlite_path),
        StorageBackend::Memory => {
            tracing::info!("Using in-memory trend store; nothing will be persisted");
            Ok(create_memory_store())
        }
    }
}
