//! Cached document retrieval.
//!
//! Wraps any [`DocumentRetriever`] with the exact-key cache: identical
//! (question, top_k) calls hit the store instead of the retriever. Results
//! are validated as a document list before they are persisted, so a
//! malformed payload is served once and never cached.

use std::sync::Arc;

use answerflow_traits::{CapabilityResult, DocumentRetriever, RetrievedDocument};
use async_trait::async_trait;
use tracing::warn;

use crate::cache::{CallSite, ExactCache, TypedValidator};

const RETRIEVE_SITE: CallSite = CallSite::new("retrieval", "retrieve");

/// A [`DocumentRetriever`] served through the exact-key cache.
pub struct CachedRetriever {
    inner: Arc<dyn DocumentRetriever>,
    cache: ExactCache,
}

impl CachedRetriever {
    pub fn new(inner: Arc<dyn DocumentRetriever>, cache: ExactCache) -> Self {
        Self { inner, cache }
    }
}

#[async_trait]
impl DocumentRetriever for CachedRetriever {
    async fn retrieve(
        &self,
        question: &str,
        top_k: usize,
    ) -> CapabilityResult<Vec<RetrievedDocument>> {
        let validator = TypedValidator::<Vec<RetrievedDocument>>::new();
        let inner = Arc::clone(&self.inner);
        let result = self
            .cache
            .wrap(
                RETRIEVE_SITE,
                &(question,),
                &serde_json::json!({ "top_k": top_k }),
                Some(&validator),
                || async move { Ok(inner.retrieve(question, top_k).await?) },
            )
            .await;

        match result {
            Ok(documents) => Ok(documents),
            // A genuine retrieval failure propagates untouched.
            Err(crate::error::PipelineError::Capability(error)) => Err(error),
            // Anything the cache layer itself trips over degrades to a
            // direct call.
            Err(error) => {
                warn!(%error, "cached retrieval failed, calling through");
                self.inner.retrieve(question, top_k).await
            }
        }
    }
}
