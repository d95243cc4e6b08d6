//! Answerflow Traits - Shared trait definitions and capability contracts.
//!
//! This crate provides the interfaces the orchestration core consumes:
//! - Turn and Role conversation primitives
//! - GenerationBackend (one-shot + streaming, cancellable)
//! - SafetyEvaluator and veto reporting
//! - KvStore and SimilarityIndex storage contracts
//! - DocumentRetriever and EmbeddingProvider
//! - Summarizer for history compaction

pub mod embedding;
pub mod error;
pub mod generation;
pub mod retrieval;
pub mod safety;
pub mod store;
pub mod summarize;
pub mod turn;

// ── Top-level re-exports ─────────────────────────────────────────────

pub use embedding::EmbeddingProvider;
pub use error::{CapabilityError, Result as CapabilityResult};
pub use generation::{ChunkStream, GenerationBackend, GenerationRequest};
pub use retrieval::{DOCUMENT_SEPARATOR, DocumentRetriever, RetrievedDocument, join_documents};
pub use safety::{BLOCK_MARKER, SafetyEvaluator, SafetyOptions, SafetyReport, SafetyVerdict};
pub use store::{KvStore, ScoredMatch, SimilarityIndex};
pub use summarize::Summarizer;
pub use turn::{Role, Turn};
