use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(String),
    #[error("IO error: {0}")]
    Io(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Parse error: {0}")]
    Parse(String),
}

pub type Result<T> = std::result::Result<T, AppError>;

impl From<tokio_postgres::Error> for AppError {
    fn from(e: tokio_postgres::Error) -> Self {
        AppError::Database(e.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(e: serde_json::Error) -> Self {
        AppError::Parse(e.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(e: std::io::Error) -> Self {
        AppError::Io(e.to_string())
    }
}

/// Failures of the theme-discovery and tagging pipeline.
///
/// Everything here is recoverable at some granularity: a prompt, an answer,
/// a batch or a whole question. The orchestrator decides which one.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum PipelineError {
    /// A prompt template was rendered without one of its variables.
    #[error("template error: missing variable `{0}`")]
    Template(String),
    /// The generation service answered, but not in the declared shape.
    #[error("malformed output: {0}")]
    MalformedOutput(String),
    /// Transport failure, timeout or non-success status. Never retried here.
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),
    #[error("contract violation: {0}")]
    ContractViolation(String),
    #[error("no answers with more than {min_words} words for question {question_id}")]
    NoEligibleAnswers { question_id: i32, min_words: usize },
    #[error("theme discovery produced no candidates ({failed_batches} batches failed)")]
    NoThemeCandidates { failed_batches: usize },
}

impl PipelineError {
    pub fn malformed(msg: impl Into<String>) -> Self {
        PipelineError::MalformedOutput(msg.into())
    }

    pub fn unavailable(msg: impl Into<String>) -> Self {
        PipelineError::ServiceUnavailable(msg.into())
    }
}
