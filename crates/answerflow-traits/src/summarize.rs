//! Summarization contract.

use async_trait::async_trait;

use crate::error::Result;

/// Best-effort transcript summarization capability. Callers must survive
/// failure; history compaction degrades to truncation when this errors.
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, transcript: &str) -> Result<String>;
}
