//! Document retrieval contract.
//!
//! The generation backend is retrieval-augmented; the core only sees this
//! narrow interface, plus the fixed rendering of retrieved contents into a
//! single context string.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::Result;

/// Separator between document contents in a rendered retrieval context.
pub const DOCUMENT_SEPARATOR: &str = "\n\n--- Retrieved Documents ---\n\n";

/// One retrieved document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetrievedDocument {
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
}

impl RetrievedDocument {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            score: None,
            metadata: None,
        }
    }
}

/// Render retrieved documents as one context string.
pub fn join_documents(documents: &[String]) -> String {
    documents.join(DOCUMENT_SEPARATOR)
}

/// Document retrieval capability.
#[async_trait]
pub trait DocumentRetriever: Send + Sync {
    async fn retrieve(&self, question: &str, top_k: usize) -> Result<Vec<RetrievedDocument>>;
}
