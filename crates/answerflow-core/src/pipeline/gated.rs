//! Safety-gated generation pipeline.
//!
//! Per request:
//!
//! ```text
//! START → RUNNING(safety_pre, generation) → {PRE_BLOCKED | GENERATED}
//!       → RUNNING(safety_post) → {POST_BLOCKED | ACCEPTED} → DONE
//! ```
//!
//! The generation task starts alongside the pre-check, so an allowed
//! request pays max(safety, generation) instead of their sum. A pre-check
//! veto cancels generation through its token and waits for the task to
//! unwind before returning, so no work outlives the call. One wall-clock
//! budget spans the whole state machine.
//!
//! Exactly one generation call is made per request; retries, if any,
//! belong to the backend.

use std::sync::Arc;

use answerflow_traits::{GenerationBackend, GenerationRequest, SafetyEvaluator, SafetyOptions, Turn};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};

/// Which safety check vetoed the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockStage {
    /// Input vetoed before generation finished.
    Pre,
    /// Generated output vetoed.
    Post,
}

/// Terminal state of one gated generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateOutcome {
    /// Generated text that passed both checks.
    Accepted(String),
    /// A safety veto; the caller returns the fixed refusal message.
    Blocked(BlockStage),
    /// The wall-clock budget expired; final, not retryable.
    TimedOut,
}

/// The concurrent safety-gated generation pipeline.
pub struct GatedPipeline {
    backend: Arc<dyn GenerationBackend>,
    safety: Arc<dyn SafetyEvaluator>,
    config: PipelineConfig,
}

impl GatedPipeline {
    pub fn new(
        backend: Arc<dyn GenerationBackend>,
        safety: Arc<dyn SafetyEvaluator>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            backend,
            safety,
            config,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run one request through the gate within the configured budget.
    pub async fn run(&self, request: GenerationRequest) -> Result<GateOutcome> {
        let cancel = CancellationToken::new();
        let budget = self.config.timeout();

        match tokio::time::timeout(budget, self.execute(&request, cancel.clone())).await {
            Ok(outcome) => outcome,
            Err(_) => {
                // Expiry cancels whatever is still in flight; the spawned
                // generation task winds down through its token.
                cancel.cancel();
                warn!(
                    session_id = %request.session_id,
                    budget_secs = budget.as_secs(),
                    "pipeline timed out"
                );
                Ok(GateOutcome::TimedOut)
            }
        }
    }

    async fn execute(
        &self,
        request: &GenerationRequest,
        cancel: CancellationToken,
    ) -> Result<GateOutcome> {
        let backend = Arc::clone(&self.backend);
        let generation_request = request.clone();
        let generation_cancel = cancel.clone();
        let generation = tokio::spawn(async move {
            backend.generate(generation_request, generation_cancel).await
        });

        let options = SafetyOptions::for_session(&request.session_id, &request.user_id);
        let pre = match self
            .safety
            .evaluate(&[Turn::user(&request.question)], options.clone())
            .await
        {
            Ok(report) => report,
            Err(error) => {
                cancel.cancel();
                let _ = generation.await;
                return Err(error.into());
            }
        };

        if pre.is_blocked() {
            info!(session_id = %request.session_id, "input vetoed before generation");
            cancel.cancel();
            // Wait for the task to unwind; its output, if it beat the
            // cancellation, is dropped here and never observed.
            let _ = generation.await;
            return Ok(GateOutcome::Blocked(BlockStage::Pre));
        }

        let generated = match generation.await {
            Ok(result) => result.map_err(|e| PipelineError::Generation(e.to_string()))?,
            Err(join_error) => return Err(PipelineError::Join(join_error)),
        };

        let post = self
            .safety
            .evaluate(&[Turn::assistant(&generated)], options)
            .await?;
        if post.is_blocked() {
            info!(session_id = %request.session_id, "generated output vetoed");
            return Ok(GateOutcome::Blocked(BlockStage::Post));
        }

        Ok(GateOutcome::Accepted(generated))
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use super::*;
    use crate::mock::{MockBackend, MockReply, MockSafety, MockVerdict};

    fn request() -> GenerationRequest {
        GenerationRequest::new("What do beetles eat?", Vec::new(), "s1", "u1")
    }

    fn pipeline(backend: MockBackend, safety: MockSafety) -> GatedPipeline {
        GatedPipeline::new(Arc::new(backend), Arc::new(safety), PipelineConfig::default())
    }

    #[tokio::test]
    async fn clean_request_is_accepted() {
        let backend = MockBackend::from_replies(vec![MockReply::text("Beetles eat plants.")]);
        let safety = MockSafety::allow_all();
        let pipeline = pipeline(backend.clone(), safety.clone());

        let outcome = pipeline.run(request()).await.unwrap();

        assert_eq!(outcome, GateOutcome::Accepted("Beetles eat plants.".to_string()));
        assert_eq!(backend.calls(), 1);
        // One pre-check and one post-check.
        assert_eq!(safety.calls(), 2);
    }

    #[tokio::test]
    async fn pre_veto_blocks_and_discards_completed_generation() {
        // The generation resolves instantly, before the veto can cancel it;
        // its output still must never escape.
        let backend = MockBackend::from_replies(vec![MockReply::text("TOP SECRET ANSWER")]);
        let safety = MockSafety::from_verdicts(vec![MockVerdict::block().with_delay(50)]);
        let pipeline = pipeline(backend.clone(), safety.clone());

        let outcome = pipeline.run(request()).await.unwrap();

        assert_eq!(outcome, GateOutcome::Blocked(BlockStage::Pre));
        assert_eq!(backend.calls(), 1);
        // No post-check once the input is vetoed.
        assert_eq!(safety.calls(), 1);
    }

    #[tokio::test]
    async fn pre_veto_cancels_slow_generation() {
        let backend = MockBackend::from_replies(vec![MockReply::never()]);
        let safety = MockSafety::from_verdicts(vec![MockVerdict::block()]);
        let pipeline = pipeline(backend, safety);

        let started = Instant::now();
        let outcome = pipeline.run(request()).await.unwrap();

        assert_eq!(outcome, GateOutcome::Blocked(BlockStage::Pre));
        // The never-resolving task was cancelled, not waited out.
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn post_veto_blocks_generated_output() {
        let backend = MockBackend::from_replies(vec![MockReply::text("questionable")]);
        let safety =
            MockSafety::from_verdicts(vec![MockVerdict::allow(), MockVerdict::block()]);
        let pipeline = pipeline(backend, safety);

        let outcome = pipeline.run(request()).await.unwrap();

        assert_eq!(outcome, GateOutcome::Blocked(BlockStage::Post));
    }

    #[tokio::test]
    async fn generator_failure_propagates() {
        let backend = MockBackend::from_replies(vec![MockReply::error("backend exploded")]);
        let pipeline = pipeline(backend, MockSafety::allow_all());

        let result = pipeline.run(request()).await;

        assert!(matches!(result, Err(PipelineError::Generation(_))));
    }

    #[tokio::test]
    async fn budget_expiry_times_out() {
        let backend = MockBackend::from_replies(vec![MockReply::never()]);
        let config = PipelineConfig {
            timeout_secs: 1,
            ..PipelineConfig::default()
        };
        let pipeline =
            GatedPipeline::new(Arc::new(backend), Arc::new(MockSafety::allow_all()), config);

        let started = Instant::now();
        let outcome = pipeline.run(request()).await.unwrap();

        assert_eq!(outcome, GateOutcome::TimedOut);
        assert!(started.elapsed() < Duration::from_secs(3));
    }
}
