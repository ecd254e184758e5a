//! Query Log
//!
//! One entry per question asked against a table, successful or not. Entries
//! stay in a bounded in-memory buffer and, when a path is configured, are
//! appended to a JSON-lines file.

use crate::error::{ErrorKind, Nl2SqlError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryLogEntry {
    pub timestamp: DateTime<Utc>,
    pub query_id: String,
    pub table_name: String,
    pub question: String,
    pub sql_generated: Option<String>,
    pub success: bool,
    pub error_kind: Option<String>,
    pub error_message: Option<String>,
    pub rows_returned: Option<u64>,
    pub execution_time_ms: u64,
}

impl QueryLogEntry {
    pub fn new(table_name: &str, question: &str) -> Self {
        Self {
            timestamp: Utc::now(),
            query_id: uuid::Uuid::new_v4().to_string(),
            table_name: table_name.to_string(),
            question: question.to_string(),
            sql_generated: None,
            success: false,
            error_kind: None,
            error_message: None,
            rows_returned: None,
            execution_time_ms: 0,
        }
    }

    pub fn succeeded(mut self, sql: &str, rows_returned: u64, execution_time_ms: u64) -> Self {
        self.sql_generated = Some(sql.to_string());
        self.success = true;
        self.rows_returned = Some(rows_returned);
        self.execution_time_ms = execution_time_ms;
        self
    }

    pub fn failed(
        mut self,
        sql: Option<&str>,
        error: &Nl2SqlError,
        execution_time_ms: u64,
    ) -> Self {
        self.sql_generated = sql.map(str::to_string);
        self.success = false;
        self.error_kind = Some(kind_label(error.kind()).to_string());
        self.error_message = Some(error.to_string());
        self.execution_time_ms = execution_time_ms;
        self
    }
}

fn kind_label(kind: ErrorKind) -> &'static str {
    match kind {
        ErrorKind::NotConfigured => "not_configured",
        ErrorKind::InvalidRequest => "invalid_request",
        ErrorKind::OutOfScope => "out_of_scope",
        ErrorKind::PolicyViolation => "policy_violation",
        ErrorKind::SchemaMismatch => "schema_mismatch",
        ErrorKind::SyntaxError => "syntax_error",
        ErrorKind::UpstreamFailure => "upstream_failure",
        ErrorKind::NotFound => "not_found",
        ErrorKind::Internal => "internal",
    }
}

pub struct QueryLog {
    log_file: Option<PathBuf>,
    entries: Mutex<VecDeque<QueryLogEntry>>,
    max_in_memory: usize,
}

impl QueryLog {
    pub fn new(log_file: Option<PathBuf>, max_in_memory: usize) -> Self {
        Self {
            log_file,
            entries: Mutex::new(VecDeque::new()),
            max_in_memory,
        }
    }

    pub fn log_file(&self) -> Option<&Path> {
        self.log_file.as_deref()
    }

    pub fn record(&self, entry: QueryLogEntry) -> Result<()> {
        {
            let mut entries = self
                .entries
                .lock()
                .map_err(|_| {
                    Nl2SqlError::Io(std::io::Error::new(
                        std::io::ErrorKind::Other,
                        "query log lock poisoned",
                    ))
                })?;
            entries.push_back(entry.clone());
            while entries.len() > self.max_in_memory {
                entries.pop_front();
            }
        }

        if let Some(ref log_file) = self.log_file {
            append_json_line(log_file, &entry)?;
        }

        Ok(())
    }

    /// Most recent first.
    pub fn recent(&self, limit: usize) -> Vec<QueryLogEntry> {
        match self.entries.lock() {
            Ok(entries) => entries.iter().rev().take(limit).cloned().collect(),
            Err(_) => Vec::new(),
        }
    }

    /// (succeeded, failed) among the entries still in memory.
    pub fn stats(&self) -> (u64, u64) {
        match self.entries.lock() {
            Ok(entries) => {
                let ok = entries.iter().filter(|e| e.success).count() as u64;
                (ok, entries.len() as u64 - ok)
            }
            Err(_) => (0, 0),
        }
    }
}

impl Default for QueryLog {
    fn default() -> Self {
        Self::new(None, 1000)
    }
}

fn append_json_line(path: &Path, entry: &QueryLogEntry) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    let json = serde_json::to_string(entry)?;
    writeln!(file, "{}", json)?;
    Ok(())
}
