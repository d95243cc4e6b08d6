//! Answer orchestrator - the transport-facing surface of the core.
//!
//! One request flows: id normalization → history compaction check →
//! semantic cache lookup → (miss) the safety-gated pipeline or its
//! streaming variant → history write-back, cache write-back, return.
//!
//! Accepted answers are the only cacheable payloads; refusals and timeout
//! notices are never written to the cache. Compaction runs before a
//! one-shot request and exactly once after a stream persists, never
//! mid-stream.

use std::sync::Arc;

use answerflow_traits::{
    GenerationBackend, GenerationRequest, SafetyEvaluator, Summarizer, Turn,
};
use futures::StreamExt;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::cache::{CacheContext, CacheManager};
use crate::config::OrchestratorConfig;
use crate::error::Result;
use crate::history::{HistoryCompactor, SessionHistoryStore};
use crate::pipeline::gated::{GateOutcome, GatedPipeline};
use crate::pipeline::streaming::{ChunkEvent, StreamOutcome, StreamingAdapter};

/// Semantic namespace for one-shot answers keyed on the question.
pub const PRE_ANSWER_NAMESPACE: &str = "pre-answer";
/// Semantic namespace for streamed answer chunk sequences.
pub const PRE_ANSWER_STREAM_NAMESPACE: &str = "pre-answer-stream";

/// Response of a synchronous answer call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnswerResponse {
    pub response: String,
    pub session_id: String,
    pub user_id: String,
}

/// One event of a streamed answer.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// Emitted exactly once, before any content.
    Metadata { session_id: String, user_id: String },
    /// A content fragment.
    Content(String),
    /// Terminal sentinel; nothing follows it.
    Done,
}

/// The conversational answer orchestrator.
///
/// Cheap to clone; every collaborator sits behind an `Arc`.
#[derive(Clone)]
pub struct AnswerOrchestrator {
    pipeline: Arc<GatedPipeline>,
    streaming: Arc<StreamingAdapter>,
    history: Arc<SessionHistoryStore>,
    compactor: Arc<HistoryCompactor>,
    caches: Arc<CacheManager>,
    config: OrchestratorConfig,
}

impl AnswerOrchestrator {
    pub fn new(
        backend: Arc<dyn GenerationBackend>,
        safety: Arc<dyn SafetyEvaluator>,
        summarizer: Arc<dyn Summarizer>,
        caches: Arc<CacheManager>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            pipeline: Arc::new(GatedPipeline::new(
                Arc::clone(&backend),
                Arc::clone(&safety),
                config.pipeline.clone(),
            )),
            streaming: Arc::new(StreamingAdapter::new(
                backend,
                safety,
                config.pipeline.clone(),
            )),
            history: Arc::new(SessionHistoryStore::new()),
            compactor: Arc::new(HistoryCompactor::new(summarizer, config.compaction.clone())),
            caches,
            config,
        }
    }

    /// The session history store backing this orchestrator.
    pub fn history(&self) -> &SessionHistoryStore {
        &self.history
    }

    /// Answer one question synchronously.
    pub async fn answer(
        &self,
        question: &str,
        session_id: Option<String>,
        user_id: Option<String>,
    ) -> Result<AnswerResponse> {
        let (session_id, user_id) = normalize_ids(session_id, user_id);
        let chat_history = self.prepared_history(&session_id).await;

        let namespace = self.caches.namespace(PRE_ANSWER_NAMESPACE);
        let ctx = CacheContext::Question(question.to_string());
        if let Some(cached) = namespace.lookup::<String>(&ctx).await {
            self.history.append(
                &session_id,
                [Turn::user(question), Turn::assistant(&cached)],
            );
            return Ok(AnswerResponse {
                response: cached,
                session_id,
                user_id,
            });
        }

        let request = GenerationRequest::new(
            question,
            chat_history,
            session_id.clone(),
            user_id.clone(),
        );
        let response = match self.pipeline.run(request).await? {
            GateOutcome::Accepted(text) => {
                self.history.append(
                    &session_id,
                    [Turn::user(question), Turn::assistant(&text)],
                );
                namespace.store(&ctx, &text).await;
                text
            }
            GateOutcome::Blocked(stage) => {
                info!(%session_id, ?stage, "request refused");
                self.config.pipeline.refusal_message.clone()
            }
            GateOutcome::TimedOut => {
                // The exchange is recorded even though it never completed.
                let message = self.config.pipeline.timeout_message.clone();
                self.history.append(
                    &session_id,
                    [Turn::user(question), Turn::assistant(&message)],
                );
                message
            }
        };

        Ok(AnswerResponse {
            response,
            session_id,
            user_id,
        })
    }

    /// Answer one question as a stream of events: one metadata event,
    /// content fragments, one terminal sentinel.
    pub fn answer_stream(
        &self,
        question: &str,
        session_id: Option<String>,
        user_id: Option<String>,
    ) -> BoxStream<'static, StreamEvent> {
        let this = self.clone();
        let question = question.to_string();

        Box::pin(async_stream::stream! {
            let (session_id, user_id) = normalize_ids(session_id, user_id);
            yield StreamEvent::Metadata {
                session_id: session_id.clone(),
                user_id: user_id.clone(),
            };

            let chat_history = this.history.get(&session_id);
            let namespace = this.caches.namespace(PRE_ANSWER_STREAM_NAMESPACE);
            let ctx = CacheContext::Question(question.clone());

            if let Some(chunks) = namespace.lookup::<Vec<String>>(&ctx).await {
                let mut full = String::new();
                for chunk in chunks {
                    full.push_str(&chunk);
                    yield StreamEvent::Content(chunk);
                }
                yield StreamEvent::Done;
                this.history.append(
                    &session_id,
                    [Turn::user(&question), Turn::assistant(&full)],
                );
                this.compact_if_needed(&session_id).await;
                return;
            }

            let request = GenerationRequest::new(
                question.clone(),
                chat_history,
                session_id.clone(),
                user_id.clone(),
            );
            let mut gated = this.streaming.run(request);
            let mut live_chunks: Vec<String> = Vec::new();
            let mut outcome = None;
            while let Some(event) = gated.next().await {
                match event {
                    ChunkEvent::Content(text) => {
                        live_chunks.push(text.clone());
                        yield StreamEvent::Content(text);
                    }
                    ChunkEvent::Finished(o) => {
                        outcome = Some(o);
                        break;
                    }
                }
            }
            yield StreamEvent::Done;

            // Persistence happens after the sentinel; the compaction check
            // runs once, after persistence.
            match outcome {
                Some(StreamOutcome::Completed { full_text }) => {
                    this.history.append(
                        &session_id,
                        [Turn::user(&question), Turn::assistant(&full_text)],
                    );
                    namespace.store(&ctx, &live_chunks).await;
                    this.compact_if_needed(&session_id).await;
                }
                Some(StreamOutcome::Blocked(stage)) => {
                    info!(%session_id, ?stage, "streamed request refused");
                }
                Some(StreamOutcome::TimedOut) => {
                    let message = this.config.pipeline.timeout_message.clone();
                    this.history.append(
                        &session_id,
                        [Turn::user(&question), Turn::assistant(&message)],
                    );
                }
                Some(StreamOutcome::Failed(message)) => {
                    warn!(%session_id, %message, "streamed generation failed");
                }
                None => {}
            }
        })
    }

    /// History for a request, compacted first when over the threshold.
    async fn prepared_history(&self, session_id: &str) -> Vec<Turn> {
        let history = self.history.get(session_id);
        if self.compactor.needs_compaction(&history) {
            let compacted = self
                .compactor
                .compact(&history, self.compactor.keep_last())
                .await;
            self.history.replace(session_id, compacted.clone());
            return compacted;
        }
        history
    }

    async fn compact_if_needed(&self, session_id: &str) {
        let history = self.history.get(session_id);
        if self.compactor.needs_compaction(&history) {
            let compacted = self
                .compactor
                .compact(&history, self.compactor.keep_last())
                .await;
            self.history.replace(session_id, compacted);
        }
    }
}

/// Fill in missing session and user ids the way the transport expects.
fn normalize_ids(session_id: Option<String>, user_id: Option<String>) -> (String, String) {
    let session_id = session_id.unwrap_or_else(|| Uuid::new_v4().to_string());
    let user_id = user_id.unwrap_or_else(|| {
        let id = Uuid::new_v4().simple().to_string();
        format!("user_{}", &id[..8])
    });
    (session_id, user_id)
}
