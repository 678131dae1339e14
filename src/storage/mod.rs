//! Storage Layer - embedded SQLite store
//!
//! The catalog lives in one in-memory SQLite database with tables:
//! - car_models(id, name)
//! - car_parts(id, part_number, name)
//! - car_part_models(car_id, part_id, is_primary)
//!
//! Durability comes from whole-database snapshots, see [`SqliteStore::serialize`].

pub mod schema;
pub mod sqlite;

pub use sqlite::{Executor, SqliteStore, StoreStats};
