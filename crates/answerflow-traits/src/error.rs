//! Error types shared by the capability contracts.

use thiserror::Error;

/// Failures reported by external capabilities.
#[derive(Error, Debug)]
pub enum CapabilityError {
    #[error("generation error: {0}")]
    Generation(String),

    #[error("generation cancelled")]
    Cancelled,

    #[error("safety evaluator error: {0}")]
    Safety(String),

    #[error("summarizer error: {0}")]
    Summarizer(String),

    #[error("retrieval error: {0}")]
    Retrieval(String),

    #[error("key-value store error: {0}")]
    Store(String),

    #[error("similarity index error: {0}")]
    Index(String),

    #[error("embedding error: {0}")]
    Embedding(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for capability calls.
pub type Result<T> = std::result::Result<T, CapabilityError>;
