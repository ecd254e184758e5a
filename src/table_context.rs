//! Table metadata handed to the context builder
//!
//! This is the shape returned by the storage collaborator after an upload and
//! whenever a question is asked against a table.

use serde::{Deserialize, Serialize};

/// One sample row: column name to cell value.
pub type SampleRow = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,

    /// Declared type as reported by the store (e.g. `TEXT`, `REAL`)
    #[serde(rename = "type")]
    pub data_type: String,
}

impl ColumnInfo {
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
        }
    }

    /// Text-affinity columns get fuzzy matching hints in the prompt.
    pub fn is_text(&self) -> bool {
        let declared = self.data_type.to_ascii_uppercase();
        ["CHAR", "CLOB", "TEXT", "STRING", "UTF8"]
            .iter()
            .any(|family| declared.contains(family))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableContext {
    pub table_name: String,
    pub columns: Vec<ColumnInfo>,
    #[serde(default, rename = "sample_data")]
    pub sample_rows: Vec<SampleRow>,
    pub row_count: u64,
}

impl TableContext {
    pub fn column(&self, name: &str) -> Option<&ColumnInfo> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }
}
