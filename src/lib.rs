//! # Carparts - offline vehicle parts catalog
//!
//! A client-resident catalog of vehicle models and replacement parts.
//!
//! Carparts provides:
//! - An embedded SQLite store with snapshot serialization and reconstruction
//! - A catalog service that enforces link integrity between models and parts
//! - Durable single-slot snapshots written after every mutation
//! - A CSV importer for building seed snapshots

pub mod model;
pub mod storage;
pub mod persist;
pub mod catalog;
pub mod import;
pub mod config;
pub mod ui;

use std::time::Duration;

// Re-exports for convenient access
pub use model::{Entity, EntityKind, Link, Model, ModelId, ModelLink, Part, PartId, PartLink};
pub use storage::{SqliteStore, StoreStats};
pub use persist::{BytesSeed, DirSnapshotSlot, EmptySeed, FileSeed, MemorySnapshotSlot, SeedSource, SnapshotSlot};
pub use catalog::{CatalogOptions, CatalogService, LoadOrigin, ServiceState};

/// Result type alias for Carparts operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for Carparts operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Catalog is not ready")]
    NotReady,

    #[error("A model named '{0}' already exists")]
    DuplicateName(String),

    #[error("A part with number '{0}' already exists")]
    DuplicatePartNumber(String),

    #[error("{kind} {id} not found")]
    NotFound { kind: EntityKind, id: i64 },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Query error: {0}")]
    Query(#[from] rusqlite::Error),

    #[error("Corrupt snapshot: {0}")]
    CorruptSnapshot(String),

    #[error("Seed snapshot unavailable: {0}")]
    SeedUnavailable(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Snapshot load timed out after {0:?}")]
    LoadTimeout(Duration),

    #[error("Import error: {0}")]
    Import(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
