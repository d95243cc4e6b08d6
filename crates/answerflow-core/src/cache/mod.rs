//! Response caching - exact-key and semantic strategies behind one manager

mod exact;
mod memory;
mod semantic;

pub use exact::{CallSite, ExactCache, ResponseValidator, TypedValidator};
pub use memory::{MemoryKvStore, MemorySimilarityIndex};
pub use semantic::{CacheContext, SemanticNamespace};

use std::sync::Arc;

use answerflow_traits::{KvStore, SimilarityIndex};
use dashmap::DashMap;
use tracing::debug;

use crate::config::{ExactCacheConfig, SemanticCacheConfig};

/// Handle to both caching strategies.
///
/// Owns one [`ExactCache`] and a registry of [`SemanticNamespace`]s created
/// on first use. Passed by reference to whichever component needs caching;
/// there is no ambient global instance.
pub struct CacheManager {
    exact: ExactCache,
    index: Arc<dyn SimilarityIndex>,
    semantic_config: SemanticCacheConfig,
    namespaces: DashMap<String, Arc<SemanticNamespace>>,
}

impl CacheManager {
    pub fn new(
        store: Arc<dyn KvStore>,
        index: Arc<dyn SimilarityIndex>,
        exact_config: ExactCacheConfig,
        semantic_config: SemanticCacheConfig,
    ) -> Self {
        Self {
            exact: ExactCache::new(store, exact_config),
            index,
            semantic_config,
            namespaces: DashMap::new(),
        }
    }

    /// The exact-key strategy.
    pub fn exact(&self) -> &ExactCache {
        &self.exact
    }

    /// Get or create the semantic strategy for a namespace.
    pub fn namespace(&self, name: &str) -> Arc<SemanticNamespace> {
        self.namespaces
            .entry(name.to_string())
            .or_insert_with(|| {
                debug!(namespace = name, "created semantic cache namespace");
                Arc::new(SemanticNamespace::new(
                    name,
                    Arc::clone(&self.index),
                    self.semantic_config.clone(),
                ))
            })
            .clone()
    }

    /// Drop every entry in one namespace.
    pub async fn clear_namespace(&self, name: &str) {
        if let Some(namespace) = self.namespaces.get(name) {
            namespace.clear().await;
        }
    }
}
