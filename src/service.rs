//! Query Service
//!
//! The full question-answering flow over an uploaded table: fetch its
//! context, generate a validated statement, run it, and record the outcome
//! in the query log.

use crate::error::Result;
use crate::execution::{StatementRunner, TableContextSource};
use crate::observability::{QueryLog, QueryLogEntry};
use crate::pipeline::SqlGenerator;
use crate::table_context::SampleRow;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryAnswer {
    pub generated_sql: String,
    pub columns: Vec<String>,
    pub rows: Vec<SampleRow>,
    pub row_count: usize,
}

pub struct QueryService {
    tables: Arc<dyn TableContextSource>,
    runner: Arc<dyn StatementRunner>,
    generator: SqlGenerator,
    query_log: Arc<QueryLog>,
}

impl QueryService {
    pub fn new(
        tables: Arc<dyn TableContextSource>,
        runner: Arc<dyn StatementRunner>,
        generator: SqlGenerator,
        query_log: Arc<QueryLog>,
    ) -> Self {
        Self {
            tables,
            runner,
            generator,
            query_log,
        }
    }

    pub fn query_log(&self) -> &QueryLog {
        &self.query_log
    }

    pub async fn answer(&self, table_name: &str, question: &str) -> Result<QueryAnswer> {
        let started = Instant::now();
        let entry = QueryLogEntry::new(table_name, question);
        let mut generated_sql: Option<String> = None;

        let outcome = async {
            let context = self.tables.fetch_table_context(table_name).await?;
            let query = self.generator.generate(question, &context).await?;
            generated_sql = Some(query.as_str().to_string());
            self.runner.run_statement(query).await
        }
        .await;

        let elapsed = started.elapsed().as_millis() as u64;

        match outcome {
            Ok(result) => {
                let sql = generated_sql.unwrap_or_default();
                info!("Answered question on {} with {} rows", table_name, result.row_count);
                self.log(entry.succeeded(&sql, result.row_count as u64, elapsed));
                Ok(QueryAnswer {
                    generated_sql: sql,
                    columns: result.columns,
                    rows: result.rows,
                    row_count: result.row_count,
                })
            }
            Err(e) => {
                warn!("Failed to answer question on {}: {}", table_name, e);
                self.log(entry.failed(generated_sql.as_deref(), &e, elapsed));
                Err(e)
            }
        }
    }

    // A log write failure never changes the answer
    fn log(&self, entry: QueryLogEntry) {
        if let Err(e) = self.query_log.record(entry) {
            warn!("Failed to write query log: {}", e);
        }
    }
}
