//! Response Sanitizer & Validator
//!
//! Turns untrusted model output into a [`ValidatedQuery`] or a typed error.
//! Stages run in a fixed order:
//!
//! 1. sentinel check on the trimmed text, before anything is rewritten
//! 2. code fence removal
//! 3. reasoning block removal
//! 4. markup tag removal
//! 5. lead-in removal ("SQL:", "Here is the query:")
//! 6. restoration of the prompt-seeded answer prefix
//! 7. first statement only, everything after the first `;` is discarded
//! 8. whitespace normalization
//! 9. blocked keyword scan
//! 10. SELECT entry point
//! 11. injection patterns and comments
//! 12. target table reference
//! 13. single terminating `;`
//! 14. balanced parentheses
//!
//! Discarding trailing statements (7) happens before the safety scan (9), so
//! a second statement is never part of what gets accepted.

pub mod cleanup;
pub mod policy;
pub mod reasoning;


use crate::error::{Result, Violation};
use serde::Serialize;
use std::fmt;
use tracing::debug;

/// A single read-only SELECT against the target table, terminated by `;`.
///
/// Only [`SqlSanitizer::validate`] can build one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ValidatedQuery(String);

impl ValidatedQuery {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for ValidatedQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ValidatedQuery {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, Default)]
pub struct SqlSanitizer {
    answer_prefix: Option<String>,
}

impl SqlSanitizer {
    /// `answer_prefix` must be the prefix the prompt was seeded with, if any.
    pub fn new(answer_prefix: Option<String>) -> Self {
        Self {
            answer_prefix: answer_prefix.filter(|p| !p.trim().is_empty()),
        }
    }

    pub fn validate(&self, raw: &str, table_name: &str) -> Result<ValidatedQuery> {
        let trimmed = raw.trim();
        if let Some(err) = cleanup::sentinel_error(trimmed) {
            return Err(err);
        }

        let text = cleanup::strip_code_fence(trimmed);
        let text = reasoning::strip_reasoning_blocks(&text);
        let text = cleanup::strip_markup_tags(&text);
        let text = cleanup::strip_lead_ins(&text);
        if let Some(err) = cleanup::wrapped_sentinel_error(&text) {
            return Err(err);
        }

        let text = match &self.answer_prefix {
            Some(prefix) => cleanup::restore_prefix(&text, prefix),
            None => text,
        };

        let statement = cleanup::first_statement(&text);
        let statement = cleanup::normalize_whitespace(&statement);
        debug!("Sanitized candidate statement: {}", statement);

        if statement.is_empty() {
            return Err(Violation::NotSelect.into());
        }

        let tokens = match policy::tokenize(&statement) {
            Ok(tokens) => tokens,
            Err(err) => {
                // Untokenizable text that never opened with SELECT is reported as such
                if !policy::starts_with_select(&statement) {
                    return Err(Violation::NotSelect.into());
                }
                policy::check_suspicious_sequences(&statement)?;
                return Err(err);
            }
        };

        policy::check_keywords(&tokens)?;
        policy::check_entry_point(&tokens)?;
        policy::check_injection_patterns(&statement, &tokens, table_name)?;
        policy::check_table_reference(&tokens, table_name)?;

        let statement = format!("{};", statement);

        policy::check_balanced_parens(&tokens)?;

        Ok(ValidatedQuery(statement))
    }
}
