//! Prompt Composer
//!
//! The system prompt is fixed policy text; the user prompt carries the table
//! context and the literal question. Composition is pure, so the same inputs
//! always give the same pair.

use serde::{Deserialize, Serialize};

pub const INVALID_REQUEST_SENTINEL: &str = "INVALID_REQUEST";
pub const OUT_OF_SCOPE_SENTINEL: &str = "OUT_OF_SCOPE";

const SYSTEM_PROMPT: &str = r#"You are SQLExpert, an assistant that only generates safe, accurate SQLite queries from natural language questions about a single uploaded table.

SCOPE:
- Generate exactly one SELECT statement against the table described in the context
- Never modify data or schema
- Use only the table and column names given in the context, spelled exactly as shown

FORBIDDEN OPERATIONS (never produce these):
- DROP, DELETE, UPDATE, INSERT, ALTER, CREATE, TRUNCATE, EXEC, EXECUTE, ATTACH, DETACH, PRAGMA, VACUUM
- Queries about users, credentials, system tables, files, network resources or administrative functions
- SQL comments, dynamic SQL or string-built statements

RESPONSE FORMAT (mandatory):
- Return only the SQL statement, with no explanation, markdown or extra text
- Exactly one statement, terminated by a single semicolon
- Valid SQLite syntax that runs as-is
- Add a LIMIT when the question does not bound a potentially large result

MATCHING USER TERMS TO DATA:
1. Read the sample rows and the sample values listed for text columns
2. Map each term in the question to the closest observed value, not to the literal wording
3. Compare text case-insensitively with partial matching, e.g. UPPER(column) LIKE '%TERM%'
4. Tolerate punctuation, spacing and hyphenation differences (e.g. "new york", "New-York", "NEW YORK")
5. When a term looks misspelled, correct it toward the observed value it most resembles
6. Use numeric comparisons for numeric columns and proper aggregates (SUM, AVG, COUNT, MIN, MAX) with GROUP BY when aggregating
7. Handle NULL values explicitly when they could change the answer

If the question is unclear, ambiguous or cannot be safely answered with a SELECT query, respond with exactly: INVALID_REQUEST
If the request is not a question about the data, respond with exactly: OUT_OF_SCOPE"#;

/// System and user prompt for one question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptPair {
    pub system_prompt: String,
    pub user_prompt: String,
}

#[derive(Debug, Clone, Default)]
pub struct PromptComposer {
    answer_prefix: Option<String>,
}

impl PromptComposer {
    pub fn new(answer_prefix: Option<String>) -> Self {
        Self {
            answer_prefix: answer_prefix.filter(|p| !p.trim().is_empty()),
        }
    }

    pub fn answer_prefix(&self) -> Option<&str> {
        self.answer_prefix.as_deref()
    }

    pub fn compose(&self, question: &str, context: &str) -> PromptPair {
        let mut user_prompt = format!(
            "TABLE CONTEXT:\n{}\n\nUSER QUESTION: {}\n\nGenerate the SQLite query:",
            context.trim_end(),
            question.trim()
        );

        if let Some(prefix) = &self.answer_prefix {
            user_prompt.push_str("\nComplete the query that begins with: ");
            user_prompt.push_str(prefix.trim());
        }

        PromptPair {
            system_prompt: SYSTEM_PROMPT.to_string(),
            user_prompt,
        }
    }
}
