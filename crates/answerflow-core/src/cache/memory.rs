//! In-memory reference implementations of the storage contracts.
//!
//! Process-local stand-ins for the external key-value store and similarity
//! index, suitable for single-process deployments and tests. TTL handling
//! matches the contracts: expired entries are invisible to readers.

use std::sync::Arc;
use std::time::{Duration, Instant};

use answerflow_traits::{
    CapabilityError, CapabilityResult, EmbeddingProvider, KvStore, ScoredMatch, SimilarityIndex,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tracing::debug;

// ── MemoryKvStore ────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct KvEntry {
    value: String,
    created_at: DateTime<Utc>,
    expires_at: Option<Instant>,
}

impl KvEntry {
    fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| Instant::now() >= at)
    }
}

/// In-memory [`KvStore`] with per-key TTL.
#[derive(Debug, Default)]
pub struct MemoryKvStore {
    entries: DashMap<String, KvEntry>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }
}

/// `*` wildcard match, the only pattern shape the cache layer uses.
fn pattern_matches(pattern: &str, key: &str) -> bool {
    let parts: Vec<&str> = pattern.split('*').collect();
    if parts.len() == 1 {
        return pattern == key;
    }

    let mut rest = key;
    for (i, part) in parts.iter().enumerate() {
        if part.is_empty() {
            continue;
        }
        if i == 0 {
            match rest.strip_prefix(part) {
                Some(stripped) => rest = stripped,
                None => return false,
            }
        } else if i == parts.len() - 1 && !pattern.ends_with('*') {
            return rest.ends_with(part);
        } else {
            match rest.find(part) {
                Some(at) => rest = &rest[at + part.len()..],
                None => return false,
            }
        }
    }
    true
}

#[async_trait]
impl KvStore for MemoryKvStore {
    async fn get(&self, key: &str) -> CapabilityResult<Option<String>> {
        let expired_at = match self.entries.get(key) {
            Some(entry) if !entry.is_expired() => return Ok(Some(entry.value.clone())),
            Some(entry) => entry.created_at,
            None => return Ok(None),
        };
        debug!(key, created_at = %expired_at, "evicting expired entry");
        self.entries.remove(key);
        Ok(None)
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> CapabilityResult<()> {
        let expires_at = (!ttl.is_zero()).then(|| Instant::now() + ttl);
        self.entries.insert(
            key.to_string(),
            KvEntry {
                value,
                created_at: Utc::now(),
                expires_at,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> CapabilityResult<()> {
        self.entries.remove(key);
        Ok(())
    }

    async fn keys(&self, pattern: &str) -> CapabilityResult<Vec<String>> {
        Ok(self
            .entries
            .iter()
            .filter(|entry| !entry.value().is_expired())
            .filter(|entry| pattern_matches(pattern, entry.key()))
            .map(|entry| entry.key().clone())
            .collect())
    }
}

// ── MemorySimilarityIndex ────────────────────────────────────────────

struct IndexEntry {
    embedding: Vec<f32>,
    payload: String,
    expires_at: Option<Instant>,
}

impl IndexEntry {
    fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| Instant::now() >= at)
    }
}

/// In-memory [`SimilarityIndex`] over an [`EmbeddingProvider`], using
/// cosine distance.
pub struct MemorySimilarityIndex {
    embedder: Arc<dyn EmbeddingProvider>,
    namespaces: DashMap<String, Vec<IndexEntry>>,
}

impl MemorySimilarityIndex {
    pub fn new(embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            embedder,
            namespaces: DashMap::new(),
        }
    }

    async fn embed(&self, context: &str) -> CapabilityResult<Vec<f32>> {
        let normalized = self.embedder.normalize_text(context);
        self.embedder.embed(&normalized).await
    }
}

#[async_trait]
impl SimilarityIndex for MemorySimilarityIndex {
    async fn lookup(&self, context: &str, namespace: &str) -> CapabilityResult<Vec<ScoredMatch>> {
        let query = self.embed(context).await?;
        let Some(entries) = self.namespaces.get(namespace) else {
            return Ok(Vec::new());
        };

        let mut matches: Vec<ScoredMatch> = entries
            .iter()
            .filter(|entry| !entry.is_expired())
            .filter_map(|entry| {
                cosine_similarity(&query, &entry.embedding).map(|similarity| ScoredMatch {
                    payload: entry.payload.clone(),
                    distance: (1.0 - similarity) as f32,
                })
            })
            .collect();
        matches.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        Ok(matches)
    }

    async fn update(
        &self,
        context: &str,
        namespace: &str,
        payload: String,
        ttl: Duration,
    ) -> CapabilityResult<()> {
        let embedding = self.embed(context).await?;
        if embedding.len() != self.embedder.dimension() {
            return Err(CapabilityError::Embedding(format!(
                "expected dimension {}, got {}",
                self.embedder.dimension(),
                embedding.len()
            )));
        }
        let expires_at = (!ttl.is_zero()).then(|| Instant::now() + ttl);
        self.namespaces
            .entry(namespace.to_string())
            .or_default()
            .push(IndexEntry {
                embedding,
                payload,
                expires_at,
            });
        Ok(())
    }

    async fn clear(&self, namespace: &str) -> CapabilityResult<()> {
        self.namespaces.remove(namespace);
        Ok(())
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> Option<f64> {
    if a.len() != b.len() || a.is_empty() {
        return None;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (&x, &y) in a.iter().zip(b.iter()) {
        let x64 = f64::from(x);
        let y64 = f64::from(y);
        dot += x64 * y64;
        norm_a += x64 * x64;
        norm_b += y64 * y64;
    }
    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom <= f64::EPSILON {
        return None;
    }
    Some(dot / denom)
}
