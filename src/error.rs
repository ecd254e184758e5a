use thiserror::Error;

/// Reasons a generated statement is refused by the read-only policy.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Violation {
    #[error("Dangerous SQL operation detected: {0}. Only SELECT queries are allowed.")]
    ForbiddenKeyword(String),

    #[error("Potentially unsafe SQL pattern detected: {0}")]
    SuspiciousPattern(String),

    #[error("Only SELECT queries are allowed.")]
    NotSelect,
}

#[derive(Error, Debug)]
pub enum Nl2SqlError {
    #[error("LLM API is not configured: {0}")]
    NotConfigured(String),

    #[error("The request could not be translated to a valid SQL query")]
    InvalidRequest,

    #[error("The request is outside the scope of SQL query generation")]
    OutOfScope,

    #[error("Policy violation: {0}")]
    PolicyViolation(#[from] Violation),

    #[error("Query must reference the table '{table}'")]
    SchemaMismatch { table: String },

    #[error("SQL syntax error: {0}")]
    SyntaxError(String),

    #[error("LLM call failed: {0}")]
    UpstreamFailure(String),

    #[error("Table not found: {0}")]
    TableNotFound(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Ingestion error: {0}")]
    Ingestion(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Coarse classification used by callers that map failures onto their own taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotConfigured,
    InvalidRequest,
    OutOfScope,
    PolicyViolation,
    SchemaMismatch,
    SyntaxError,
    UpstreamFailure,
    NotFound,
    Internal,
}

impl Nl2SqlError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Nl2SqlError::NotConfigured(_) | Nl2SqlError::Config(_) => ErrorKind::NotConfigured,
            Nl2SqlError::InvalidRequest => ErrorKind::InvalidRequest,
            Nl2SqlError::OutOfScope => ErrorKind::OutOfScope,
            Nl2SqlError::PolicyViolation(_) => ErrorKind::PolicyViolation,
            Nl2SqlError::SchemaMismatch { .. } => ErrorKind::SchemaMismatch,
            Nl2SqlError::SyntaxError(_) => ErrorKind::SyntaxError,
            Nl2SqlError::UpstreamFailure(_) => ErrorKind::UpstreamFailure,
            Nl2SqlError::TableNotFound(_) => ErrorKind::NotFound,
            Nl2SqlError::Database(_)
            | Nl2SqlError::Ingestion(_)
            | Nl2SqlError::Io(_)
            | Nl2SqlError::Json(_) => ErrorKind::Internal,
        }
    }

    /// Message shown to the person who asked the question.
    pub fn user_message(&self) -> String {
        match self {
            Nl2SqlError::NotConfigured(_) => {
                "LLM API is not configured. Please set OPENROUTER_API_KEY in your .env file. \
                 File upload still works but you won't be able to query the data."
                    .to_string()
            }
            Nl2SqlError::InvalidRequest => {
                "The request could not be translated to a valid SQL query. Please rephrase your question."
                    .to_string()
            }
            Nl2SqlError::OutOfScope => {
                "This request is outside the scope of SQL query generation. Please ask a question about your data."
                    .to_string()
            }
            other => format!("Error processing query: {}", other),
        }
    }
}

pub type Result<T> = std::result::Result<T, Nl2SqlError>;
