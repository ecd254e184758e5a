//! Observability - structured history of answered questions

pub mod query_log;

pub use query_log::{QueryLog, QueryLogEntry};
