//! Configuration for the orchestration core.
//!
//! Every tunable the pipeline, caches, and compactor consume lives here
//! with a documented default. Deployments override through whatever
//! configuration loading the surrounding process uses; the core only sees
//! these structs.

use std::time::Duration;

use serde::Deserialize;

/// History compaction tunables.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CompactionConfig {
    /// Turn count at which compaction triggers (default: 6).
    pub threshold: usize,
    /// Number of most recent turns preserved verbatim (default: 4).
    pub keep_last: usize,
}

impl Default for CompactionConfig {
    fn default() -> Self {
        Self {
            threshold: 6,
            keep_last: 4,
        }
    }
}

/// Exact-key cache tunables.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExactCacheConfig {
    /// Leading key segment shared by every entry (default: "answerflow").
    pub prefix: String,
    /// Deployment environment segment of the key (default: "development").
    pub environment: String,
    /// Entry time-to-live in seconds (default: 3600).
    pub ttl_secs: u64,
}

impl ExactCacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

impl Default for ExactCacheConfig {
    fn default() -> Self {
        Self {
            prefix: "answerflow".to_string(),
            environment: "development".to_string(),
            ttl_secs: 3600,
        }
    }
}

/// Semantic cache tunables, applied per namespace.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SemanticCacheConfig {
    /// Maximum similarity distance for a hit (default: 0.2).
    pub distance_threshold: f32,
    /// Entry time-to-live in seconds (default: 3600).
    pub ttl_secs: u64,
}

impl SemanticCacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

impl Default for SemanticCacheConfig {
    fn default() -> Self {
        Self {
            distance_threshold: 0.2,
            ttl_secs: 3600,
        }
    }
}

/// Safety-gated pipeline tunables.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Wall-clock budget for one request, start to done (default: 60).
    pub timeout_secs: u64,
    /// Fixed message returned for any safety veto.
    pub refusal_message: String,
    /// Fixed message returned when the budget expires.
    pub timeout_message: String,
}

impl PipelineConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 60,
            refusal_message: "I'm sorry, I can't help with that request.".to_string(),
            timeout_message: "The request timed out. Please try again later.".to_string(),
        }
    }
}

/// Aggregate configuration for the orchestrator.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    pub compaction: CompactionConfig,
    pub exact_cache: ExactCacheConfig,
    pub semantic_cache: SemanticCacheConfig,
    pub pipeline: PipelineConfig,
}
