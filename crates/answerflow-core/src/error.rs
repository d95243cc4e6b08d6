//! Error types for the orchestration core

use answerflow_traits::CapabilityError;
use thiserror::Error;

/// Core error types
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("generation failed: {0}")]
    Generation(String),

    #[error("capability error: {0}")]
    Capability(#[from] CapabilityError),

    #[error("task join error: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for core operations
pub type Result<T> = std::result::Result<T, PipelineError>;
