//! Pipeline Orchestrator
//!
//! One question in, one validated SELECT out:
//! context builder → prompt composer → model invoker → sanitizer.
//! Nothing is retried and nothing is executed here.

use crate::config::PipelineConfig;
use crate::context_builder::ContextBuilder;
use crate::error::{Nl2SqlError, Result};
use crate::llm::ModelInvoker;
use crate::prompt::{PromptComposer, PromptPair};
use crate::sanitizer::{SqlSanitizer, ValidatedQuery};
use crate::table_context::TableContext;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

pub struct SqlGenerator {
    invoker: Arc<dyn ModelInvoker>,
    context_builder: ContextBuilder,
    composer: PromptComposer,
    sanitizer: SqlSanitizer,
}

impl SqlGenerator {
    pub fn new(invoker: Arc<dyn ModelInvoker>, config: PipelineConfig) -> Self {
        Self {
            invoker,
            context_builder: ContextBuilder::new(config.context),
            composer: PromptComposer::new(config.answer_prefix.clone()),
            sanitizer: SqlSanitizer::new(config.answer_prefix),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.invoker.is_configured()
    }

    /// The prompt pair `generate` would send for this question.
    pub fn prompts(&self, question: &str, table: &TableContext) -> PromptPair {
        let context = self.context_builder.build(table);
        self.composer.compose(question, &context)
    }

    pub async fn generate(&self, question: &str, table: &TableContext) -> Result<ValidatedQuery> {
        if !self.invoker.is_configured() {
            warn!("Query generation requested but the model invoker is not configured");
            return Err(Nl2SqlError::NotConfigured(
                "no API key available for SQL generation".to_string(),
            ));
        }

        info!("Generating SQL for table {}: {}", table.table_name, question);

        let prompts = self.prompts(question, table);
        debug!("User prompt:\n{}", prompts.user_prompt);

        let started = Instant::now();
        let raw = self
            .invoker
            .invoke(&prompts.system_prompt, &prompts.user_prompt)
            .await
            .map_err(|e| match e {
                Nl2SqlError::UpstreamFailure(_) | Nl2SqlError::NotConfigured(_) => e,
                other => Nl2SqlError::UpstreamFailure(other.to_string()),
            })?;
        debug!(
            "Model answered in {} ms: {}",
            started.elapsed().as_millis(),
            raw
        );

        match self.sanitizer.validate(&raw, &table.table_name) {
            Ok(query) => {
                info!("Generated SQL: {}", query);
                Ok(query)
            }
            Err(e) => {
                warn!("Rejected model output for table {}: {}", table.table_name, e);
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table_context::ColumnInfo;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CannedInvoker {
        configured: bool,
        answer: String,
        calls: AtomicUsize,
    }

    impl CannedInvoker {
        fn new(answer: &str) -> Self {
            Self {
                configured: true,
                answer: answer.to_string(),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl ModelInvoker for CannedInvoker {
        fn is_configured(&self) -> bool {
            self.configured
        }

        async fn invoke(&self, _system_prompt: &str, _user_prompt: &str) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.answer.clone())
        }
    }

    fn table() -> TableContext {
        TableContext {
            table_name: "t".to_string(),
            columns: vec![ColumnInfo::new("a", "INTEGER")],
            sample_rows: Vec::new(),
            row_count: 0,
        }
    }

    #[tokio::test]
    async fn test_not_configured_skips_the_call() {
        let invoker = Arc::new(CannedInvoker {
            configured: false,
            ..CannedInvoker::new("SELECT a FROM t")
        });
        let generator = SqlGenerator::new(invoker.clone(), PipelineConfig::default());

        let err = generator.generate("how many?", &table()).await.unwrap_err();
        assert!(matches!(err, Nl2SqlError::NotConfigured(_)));
        assert_eq!(invoker.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_answer_prefix_flows_to_prompt_and_sanitizer() {
        let invoker = Arc::new(CannedInvoker::new("COUNT(*) FROM t"));
        let config = PipelineConfig {
            answer_prefix: Some("SELECT".to_string()),
            ..PipelineConfig::default()
        };
        let generator = SqlGenerator::new(invoker, config);

        let prompts = generator.prompts("how many?", &table());
        assert!(prompts.user_prompt.ends_with("SELECT"));

        let query = generator.generate("how many?", &table()).await.unwrap();
        assert_eq!(query.as_str(), "SELECT COUNT(*) FROM t;");
    }
}
