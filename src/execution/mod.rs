//! Execution Module - storage collaborators behind capability traits
//!
//! The pipeline itself never touches storage. Callers that answer questions
//! end to end use a `TableContextSource` to describe the target table and a
//! `StatementRunner` to execute the validated statement.

pub mod engine;
pub mod result;

pub use engine::{StatementRunner, TableContextSource};
pub use result::QueryResult;
