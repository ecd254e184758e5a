//! Query Result - rows returned by a `StatementRunner`

use crate::table_context::SampleRow;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    /// Column names in select-list order
    pub columns: Vec<String>,

    /// One JSON object per row, keyed by column name
    pub rows: Vec<SampleRow>,

    pub row_count: usize,

    pub execution_time_ms: u64,
}

impl QueryResult {
    pub fn new(columns: Vec<String>, rows: Vec<SampleRow>, execution_time_ms: u64) -> Self {
        let row_count = rows.len();
        Self {
            columns,
            rows,
            row_count,
            execution_time_ms,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
