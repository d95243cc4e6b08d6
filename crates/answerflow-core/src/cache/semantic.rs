//! Semantic response cache.
//!
//! Looks answers up by similarity of a *context string* instead of an
//! exact key. Before generation the context string is the raw question;
//! after generation it is the concatenation of the retrieved document
//! contents, because the answer depends on what was retrieved, not on the
//! question's surface form.
//!
//! One [`SemanticNamespace`] exists per logical operation; entries in
//! different namespaces never collide even for identical context strings.
//! Index failures degrade to a miss: the cache bypasses itself rather
//! than failing the request.

use std::sync::Arc;

use answerflow_traits::{ChunkStream, SimilarityIndex, join_documents};
use futures::StreamExt;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use crate::config::SemanticCacheConfig;
use crate::error::Result;

/// What the similarity lookup keys on.
#[derive(Debug, Clone)]
pub enum CacheContext {
    /// Pre-generation: the raw question text.
    Question(String),
    /// Post-generation: the retrieved document contents.
    Documents(Vec<String>),
}

impl CacheContext {
    /// The text actually embedded and matched.
    pub fn context_string(&self) -> String {
        match self {
            CacheContext::Question(question) => question.clone(),
            CacheContext::Documents(documents) => join_documents(documents),
        }
    }
}

/// Similarity-keyed caching strategy scoped to one namespace.
pub struct SemanticNamespace {
    name: String,
    index: Arc<dyn SimilarityIndex>,
    config: SemanticCacheConfig,
}

impl SemanticNamespace {
    pub fn new(
        name: impl Into<String>,
        index: Arc<dyn SimilarityIndex>,
        config: SemanticCacheConfig,
    ) -> Self {
        Self {
            name: name.into(),
            index,
            config,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Closest stored payload within the distance threshold, if any.
    ///
    /// Expired entries and matches past the threshold are misses; so is an
    /// unreachable index.
    pub async fn lookup<T: DeserializeOwned>(&self, ctx: &CacheContext) -> Option<T> {
        let context = ctx.context_string();
        let matches = match self.index.lookup(&context, &self.name).await {
            Ok(matches) => matches,
            Err(error) => {
                warn!(namespace = %self.name, %error, "similarity lookup failed, bypassing cache");
                return None;
            }
        };

        let best = matches
            .into_iter()
            .filter(|m| m.distance <= self.config.distance_threshold)
            .min_by(|a, b| a.distance.total_cmp(&b.distance))?;

        match serde_json::from_str(&best.payload) {
            Ok(value) => {
                info!(namespace = %self.name, distance = best.distance, "semantic cache hit");
                Some(value)
            }
            Err(error) => {
                warn!(namespace = %self.name, %error, "stored payload undecodable, treating as miss");
                None
            }
        }
    }

    /// Persist a payload under the context string. Failures are logged,
    /// never raised.
    pub async fn store<T: Serialize>(&self, ctx: &CacheContext, value: &T) {
        let payload = match serde_json::to_string(value) {
            Ok(payload) => payload,
            Err(error) => {
                warn!(namespace = %self.name, %error, "payload not serializable, not cached");
                return;
            }
        };

        let context = ctx.context_string();
        match self
            .index
            .update(&context, &self.name, payload, self.config.ttl())
            .await
        {
            Ok(()) => debug!(namespace = %self.name, "semantic cache stored"),
            Err(error) => {
                warn!(namespace = %self.name, %error, "semantic cache store failed");
            }
        }
    }

    /// One-shot wrapper: serve `f`'s result from the cache when a close
    /// enough entry exists, otherwise run it and persist the outcome.
    pub async fn cached_call<T, F, Fut>(&self, ctx: CacheContext, f: F) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if let Some(hit) = self.lookup(&ctx).await {
            return Ok(hit);
        }
        info!(namespace = %self.name, "semantic cache miss");
        let value = f().await?;
        self.store(&ctx, &value).await;
        Ok(value)
    }

    /// Streaming wrapper.
    ///
    /// On a hit the stored chunk sequence is replayed; a consumer cannot
    /// tell it from a live stream. On a miss every live chunk is re-yielded
    /// immediately while being buffered, and the buffered sequence is
    /// persisted only once the source is fully drained; a consumer that
    /// disconnects mid-stream caches nothing.
    pub fn cached_stream(self: &Arc<Self>, ctx: CacheContext, source: ChunkStream) -> ChunkStream {
        let namespace = Arc::clone(self);
        Box::pin(async_stream::stream! {
            if let Some(chunks) = namespace.lookup::<Vec<String>>(&ctx).await {
                debug!(namespace = %namespace.name, chunks = chunks.len(), "replaying cached stream");
                for chunk in chunks {
                    yield Ok(chunk);
                }
                return;
            }
            info!(namespace = %namespace.name, "semantic cache miss");

            let mut source = source;
            let mut buffered: Vec<String> = Vec::new();
            let mut complete = true;
            while let Some(item) = source.next().await {
                match item {
                    Ok(chunk) => {
                        buffered.push(chunk.clone());
                        yield Ok(chunk);
                    }
                    Err(error) => {
                        complete = false;
                        yield Err(error);
                    }
                }
            }

            if complete {
                namespace.store(&ctx, &buffered).await;
            }
        })
    }

    /// Drop every entry in this namespace.
    pub async fn clear(&self) {
        if let Err(error) = self.index.clear(&self.name).await {
            warn!(namespace = %self.name, %error, "failed to clear namespace");
        }
    }
}
