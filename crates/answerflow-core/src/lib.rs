//! Answerflow Core - Safety-gated conversational answer generation
//!
//! This crate provides:
//! - Concurrent safety-gated generation pipeline (pre-veto races and
//!   cancels the generation task, post-veto re-checks the output, one
//!   timeout spans the request)
//! - Streaming variant applying the same veto protocol mid-stream
//! - Response caching: exact-key and semantic strategies behind an
//!   explicit cache manager
//! - Bounded per-session history with summarizing compaction
//! - Scripted mock capabilities for tests

pub mod cache;
pub mod config;
pub mod error;
pub mod history;
pub mod mock;
pub mod pipeline;
pub mod retrieval;

// Re-export commonly used types
pub use cache::{
    CacheContext, CacheManager, CallSite, ExactCache, MemoryKvStore, MemorySimilarityIndex,
    ResponseValidator, SemanticNamespace, TypedValidator,
};
pub use config::{
    CompactionConfig, ExactCacheConfig, OrchestratorConfig, PipelineConfig, SemanticCacheConfig,
};
pub use error::{PipelineError, Result};
pub use history::{HistoryCompactor, SessionHistoryStore, format_transcript};
pub use pipeline::{
    AnswerOrchestrator, AnswerResponse, BlockStage, ChunkEvent, GateOutcome, GatedPipeline,
    PRE_ANSWER_NAMESPACE, PRE_ANSWER_STREAM_NAMESPACE, StreamEvent, StreamOutcome,
    StreamingAdapter,
};
pub use retrieval::CachedRetriever;
