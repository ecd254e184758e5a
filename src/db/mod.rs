//! Database module for uploaded tables
//!
//! Each uploaded CSV or JSON file is stored as one SQLite table.

pub mod ingest;
pub mod sqlite_store;

pub use sqlite_store::SqliteStore;
