pub mod config;
pub mod context_builder;
pub mod db;
pub mod error;
pub mod execution;
pub mod llm;
pub mod observability;
pub mod pipeline;
pub mod prompt;
pub mod sanitizer;
pub mod service;
pub mod table_context;

pub use error::{ErrorKind, Nl2SqlError, Result};
pub use pipeline::SqlGenerator;
pub use sanitizer::{SqlSanitizer, ValidatedQuery};
pub use table_context::{ColumnInfo, TableContext};
