//! Capability traits for table metadata and statement execution

use crate::error::Result;
use crate::execution::result::QueryResult;
use crate::sanitizer::ValidatedQuery;
use crate::table_context::TableContext;
use async_trait::async_trait;

/// Supplies schema, sample rows and row count for a named table.
#[async_trait]
pub trait TableContextSource: Send + Sync {
    /// Unknown tables fail with `TableNotFound`.
    async fn fetch_table_context(&self, table_name: &str) -> Result<TableContext>;
}

/// Executes statements that already passed validation.
#[async_trait]
pub trait StatementRunner: Send + Sync {
    async fn run_statement(&self, query: ValidatedQuery) -> Result<QueryResult>;
}
