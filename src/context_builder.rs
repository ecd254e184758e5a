//! RAG Context Builder
//!
//! Renders table metadata into the compact description the model sees. The
//! model has no other view of the data, so this text carries the schema, a few
//! full rows and, for every text column, a handful of real values it can
//! reconcile the user's wording against.
//!
//! Building never fails: malformed or short sample rows render partially.

use crate::config::ContextLimits;
use crate::table_context::{ColumnInfo, SampleRow, TableContext};
use itertools::Itertools;
use serde_json::Value;
use std::collections::HashSet;
use std::fmt::Write;

pub struct ContextBuilder {
    limits: ContextLimits,
}

impl Default for ContextBuilder {
    fn default() -> Self {
        Self::new(ContextLimits::default())
    }
}

impl ContextBuilder {
    pub fn new(limits: ContextLimits) -> Self {
        Self { limits }
    }

    pub fn build(&self, ctx: &TableContext) -> String {
        let mut out = String::new();
        let table_name = if ctx.table_name.trim().is_empty() {
            "(unnamed)"
        } else {
            ctx.table_name.as_str()
        };

        writeln!(out, "Table: {}", table_name).ok();
        writeln!(out, "Total rows: {}", ctx.row_count).ok();

        out.push_str("\nColumns:\n");
        if ctx.columns.is_empty() {
            out.push_str("- (no columns reported)\n");
        }
        for column in &ctx.columns {
            write!(out, "- {} ({})", column.name, column.data_type).ok();
            if column.is_text() {
                out.push_str(" [text: supports fuzzy matching]");
            }
            out.push('\n');
        }

        out.push_str("\nSample rows:\n");
        if ctx.sample_rows.is_empty() {
            out.push_str("(no sample rows available)\n");
        }
        for (i, row) in ctx.sample_rows.iter().take(self.limits.sample_rows).enumerate() {
            writeln!(out, "Row {}: {}", i + 1, self.render_row(&ctx.columns, row)).ok();
        }

        let text_columns: Vec<&ColumnInfo> = ctx.columns.iter().filter(|c| c.is_text()).collect();
        if !text_columns.is_empty() {
            out.push_str("\nSample values for text columns (match user terms against these):\n");
            for column in text_columns {
                let values = self.distinct_values(&ctx.sample_rows, &column.name);
                if values.is_empty() {
                    writeln!(out, "- {}: (no values in sample)", column.name).ok();
                } else {
                    let rendered = values
                        .iter()
                        .map(|v| quote(&self.truncate(v)))
                        .join(", ");
                    writeln!(out, "- {}: {}", column.name, rendered).ok();
                }
            }
        }

        out
    }

    /// Declared columns first, then any keys the schema does not know about.
    fn render_row(&self, columns: &[ColumnInfo], row: &SampleRow) -> String {
        let mut cells = Vec::new();
        for column in columns {
            if let Some(value) = row.get(&column.name) {
                cells.push(format!("{} = {}", column.name, self.render_value(value)));
            }
        }
        for (key, value) in row {
            if !columns.iter().any(|c| &c.name == key) {
                cells.push(format!("{} = {}", key, self.render_value(value)));
            }
        }

        if cells.is_empty() {
            "(empty)".to_string()
        } else {
            cells.join(", ")
        }
    }

    fn render_value(&self, value: &Value) -> String {
        match value {
            Value::Null => "NULL".to_string(),
            Value::String(s) => quote(&self.truncate(s)),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => n.to_string(),
            other => self.truncate(&other.to_string()),
        }
    }

    /// Up to `distinct_values` values seen in the first `distinct_window` rows.
    pub fn distinct_values(&self, rows: &[SampleRow], column: &str) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut values = Vec::new();

        for row in rows.iter().take(self.limits.distinct_window) {
            if values.len() >= self.limits.distinct_values {
                break;
            }
            let Some(text) = row.get(column).and_then(coerce_to_string) else {
                continue;
            };
            if seen.insert(text.clone()) {
                values.push(text);
            }
        }

        values
    }

    fn truncate(&self, s: &str) -> String {
        if s.chars().count() <= self.limits.max_value_chars {
            s.to_string()
        } else {
            let cut: String = s.chars().take(self.limits.max_value_chars).collect();
            format!("{}...", cut)
        }
    }
}

fn coerce_to_string(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        other => Some(other.to_string()),
    }
}

fn quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}
