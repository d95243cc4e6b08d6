//! Storage contracts consumed by the response caches.
//!
//! Both stores are external shared resources: the only atomicity they
//! promise is per-key set/get/expire. Unavailability is surfaced as an
//! error the cache layer tolerates by bypassing itself.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;

// ── KvStore ──────────────────────────────────────────────────────────

/// Key-value store with per-key TTL.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Fetch a value, `None` when absent or expired.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Store a value with a time-to-live.
    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<()>;

    /// Remove a key.
    async fn delete(&self, key: &str) -> Result<()>;

    /// List keys matching a pattern (`*` wildcard).
    async fn keys(&self, pattern: &str) -> Result<Vec<String>>;
}

// ── SimilarityIndex ──────────────────────────────────────────────────

/// One ranked match from a similarity lookup. Lower distance is closer.
#[derive(Debug, Clone)]
pub struct ScoredMatch {
    pub payload: String,
    pub distance: f32,
}

/// Namespace-scoped similarity index over context strings.
///
/// Entries written under one namespace are never visible to lookups
/// against another, even for identical context strings.
#[async_trait]
pub trait SimilarityIndex: Send + Sync {
    /// Ranked matches for a context string within a namespace, closest
    /// first. Expired entries are not returned.
    async fn lookup(&self, context: &str, namespace: &str) -> Result<Vec<ScoredMatch>>;

    /// Store a payload under the embedding of a context string.
    async fn update(
        &self,
        context: &str,
        namespace: &str,
        payload: String,
        ttl: Duration,
    ) -> Result<()>;

    /// Drop every entry in a namespace.
    async fn clear(&self, namespace: &str) -> Result<()>;
}
