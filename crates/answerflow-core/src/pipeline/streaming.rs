//! Streaming adapter for the safety-gated pipeline.
//!
//! Applies the same veto protocol chunk by chunk. The backend stream is
//! pumped into a channel immediately so it overlaps the safety pre-check;
//! nothing is forwarded until the pre-check passes. While chunks flow, a
//! concurrent watcher re-evaluates the accumulating text and trips a veto
//! token; the first veto stops the stream, substitutes one generic refusal
//! message, and ends the sequence. The complete text gets one final
//! evaluation before the stream is declared done.
//!
//! A single deadline covers the whole stream, pre-check included.

use std::sync::Arc;

use answerflow_traits::{
    CapabilityResult, GenerationBackend, GenerationRequest, SafetyEvaluator, SafetyOptions, Turn,
};
use futures::stream::BoxStream;
use futures::StreamExt;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::PipelineConfig;
use crate::pipeline::gated::BlockStage;

/// One event of the gated chunk sequence.
#[derive(Debug, Clone, PartialEq)]
pub enum ChunkEvent {
    /// A content fragment, live or substituted (refusal/timeout notice).
    Content(String),
    /// Terminal event; nothing follows it.
    Finished(StreamOutcome),
}

/// Terminal state of one gated stream.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamOutcome {
    /// The stream drained and the full text passed every check.
    Completed { full_text: String },
    /// A safety veto stopped the stream.
    Blocked(BlockStage),
    /// The deadline expired mid-stream.
    TimedOut,
    /// The backend stream failed.
    Failed(String),
}

/// Streaming variant of the safety-gated pipeline.
pub struct StreamingAdapter {
    backend: Arc<dyn GenerationBackend>,
    safety: Arc<dyn SafetyEvaluator>,
    config: PipelineConfig,
}

impl StreamingAdapter {
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

    /// Run one request as a gated chunk sequence.
    ///
    /// The sequence always ends with exactly one [`ChunkEvent::Finished`].
    pub fn run(&self, request: GenerationRequest) -> BoxStream<'static, ChunkEvent> {
        let backend = Arc::clone(&self.backend);
        let safety = Arc::clone(&self.safety);
        let config = self.config.clone();

        Box::pin(async_stream::stream! {
            let deadline = Instant::now() + config.timeout();
            let stop = CancellationToken::new();

            // Pump the backend stream concurrently from the start; the
            // pre-check latency overlaps the first chunks.
            let (chunk_tx, mut chunk_rx) = mpsc::channel::<CapabilityResult<String>>(64);
            let pump_stop = stop.clone();
            let source_request = request.clone();
            let pump = tokio::spawn(async move {
                let mut source = backend.generate_stream(source_request);
                loop {
                    tokio::select! {
                        _ = pump_stop.cancelled() => break,
                        item = source.next() => match item {
                            Some(chunk) => {
                                if chunk_tx.send(chunk).await.is_err() {
                                    break;
                                }
                            }
                            None => break,
                        },
                    }
                }
            });

            let options = SafetyOptions::for_session(&request.session_id, &request.user_id);
            let pre = tokio::time::timeout_at(
                deadline,
                safety.evaluate(&[Turn::user(&request.question)], options.clone()),
            )
            .await;
            match pre {
                Err(_) => {
                    stop.cancel();
                    chunk_rx.close();
                    let _ = pump.await;
                    yield ChunkEvent::Content(config.timeout_message.clone());
                    yield ChunkEvent::Finished(StreamOutcome::TimedOut);
                    return;
                }
                Ok(Err(error)) => {
                    stop.cancel();
                    chunk_rx.close();
                    let _ = pump.await;
                    yield ChunkEvent::Finished(StreamOutcome::Failed(error.to_string()));
                    return;
                }
                Ok(Ok(report)) if report.is_blocked() => {
                    info!(session_id = %request.session_id, "input vetoed before streaming");
                    stop.cancel();
                    chunk_rx.close();
                    let _ = pump.await;
                    yield ChunkEvent::Content(config.refusal_message.clone());
                    yield ChunkEvent::Finished(StreamOutcome::Blocked(BlockStage::Pre));
                    return;
                }
                Ok(Ok(_)) => {}
            }

            // Watcher re-evaluates the accumulating output off the hot path.
            let (accumulated_tx, accumulated_rx) = watch::channel(String::new());
            let veto = CancellationToken::new();
            let watcher = tokio::spawn(watch_output(
                Arc::clone(&safety),
                accumulated_rx,
                veto.clone(),
                options.clone(),
            ));

            let mut full = String::new();
            let mut failure: Option<String> = None;
            loop {
                tokio::select! {
                    _ = veto.cancelled() => {
                        info!(session_id = %request.session_id, "stream vetoed mid-flight");
                        stop.cancel();
                        chunk_rx.close();
                        let _ = pump.await;
                        drop(accumulated_tx);
                        let _ = watcher.await;
                        yield ChunkEvent::Content(config.refusal_message.clone());
                        yield ChunkEvent::Finished(StreamOutcome::Blocked(BlockStage::Post));
                        return;
                    }
                    _ = tokio::time::sleep_until(deadline) => {
                        stop.cancel();
                        chunk_rx.close();
                        let _ = pump.await;
                        drop(accumulated_tx);
                        let _ = watcher.await;
                        warn!(session_id = %request.session_id, "stream timed out");
                        yield ChunkEvent::Content(config.timeout_message.clone());
                        yield ChunkEvent::Finished(StreamOutcome::TimedOut);
                        return;
                    }
                    item = chunk_rx.recv() => match item {
                        Some(Ok(text)) => {
                            full.push_str(&text);
                            let _ = accumulated_tx.send(full.clone());
                            yield ChunkEvent::Content(text);
                        }
                        Some(Err(error)) => {
                            failure = Some(error.to_string());
                            break;
                        }
                        None => break,
                    },
                }
            }

            stop.cancel();
            chunk_rx.close();
            let _ = pump.await;
            drop(accumulated_tx);
            let _ = watcher.await;

            if let Some(message) = failure {
                yield ChunkEvent::Finished(StreamOutcome::Failed(message));
                return;
            }

            // The watcher may not have seen the tail; the complete text gets
            // one authoritative verdict.
            let post = tokio::time::timeout_at(
                deadline,
                safety.evaluate(&[Turn::assistant(&full)], options),
            )
            .await;
            match post {
                Err(_) => {
                    yield ChunkEvent::Content(config.timeout_message.clone());
                    yield ChunkEvent::Finished(StreamOutcome::TimedOut);
                }
                Ok(Err(error)) => {
                    yield ChunkEvent::Finished(StreamOutcome::Failed(error.to_string()));
                }
                Ok(Ok(report)) if report.is_blocked() => {
                    info!(session_id = %request.session_id, "completed stream vetoed");
                    yield ChunkEvent::Content(config.refusal_message.clone());
                    yield ChunkEvent::Finished(StreamOutcome::Blocked(BlockStage::Post));
                }
                Ok(Ok(_)) => {
                    yield ChunkEvent::Finished(StreamOutcome::Completed { full_text: full });
                }
            }
        })
    }
}

/// Evaluate each accumulated-output snapshot until the sender side closes
/// or a veto fires. Evaluator failures here are logged and skipped; the
/// final check on the complete text is authoritative.
async fn watch_output(
    safety: Arc<dyn SafetyEvaluator>,
    mut accumulated: watch::Receiver<String>,
    veto: CancellationToken,
    options: SafetyOptions,
) {
    while accumulated.changed().await.is_ok() {
        let snapshot = accumulated.borrow_and_update().clone();
        if snapshot.is_empty() {
            continue;
        }
        match safety
            .evaluate(&[Turn::assistant(&snapshot)], options.clone())
            .await
        {
            Ok(report) if report.is_blocked() => {
                veto.cancel();
                return;
            }
            Ok(_) => {}
            Err(error) => {
                warn!(%error, "mid-stream safety check failed, deferring to final check");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::mock::{MockBackend, MockReply, MockSafety, MockVerdict};

    fn request() -> GenerationRequest {
        GenerationRequest::new("What do beetles eat?", Vec::new(), "s1", "u1")
    }

    fn adapter(backend: MockBackend, safety: MockSafety) -> StreamingAdapter {
        StreamingAdapter::new(Arc::new(backend), Arc::new(safety), PipelineConfig::default())
    }

    async fn collect(mut stream: BoxStream<'static, ChunkEvent>) -> (Vec<String>, StreamOutcome) {
        let mut contents = Vec::new();
        let mut outcome = None;
        while let Some(event) = stream.next().await {
            match event {
                ChunkEvent::Content(text) => contents.push(text),
                ChunkEvent::Finished(o) => {
                    outcome = Some(o);
                    break;
                }
            }
        }
        (contents, outcome.expect("stream must finish"))
    }

    #[tokio::test]
    async fn clean_stream_completes_with_full_text() {
        let backend =
            MockBackend::from_replies(vec![MockReply::chunks(["Beetles ", "eat ", "plants."])]);
        let adapter = adapter(backend, MockSafety::allow_all());

        let (contents, outcome) = collect(adapter.run(request())).await;

        assert_eq!(contents.concat(), "Beetles eat plants.");
        assert_eq!(
            outcome,
            StreamOutcome::Completed {
                full_text: "Beetles eat plants.".to_string()
            }
        );
    }

    #[tokio::test]
    async fn pre_veto_yields_only_the_refusal() {
        let backend = MockBackend::from_replies(vec![MockReply::chunks(["secret"])]);
        let safety = MockSafety::from_verdicts(vec![MockVerdict::block()]);
        let config = PipelineConfig::default();
        let refusal = config.refusal_message.clone();
        let adapter = StreamingAdapter::new(Arc::new(backend), Arc::new(safety), config);

        let (contents, outcome) = collect(adapter.run(request())).await;

        assert_eq!(contents, vec![refusal]);
        assert_eq!(outcome, StreamOutcome::Blocked(BlockStage::Pre));
    }

    #[tokio::test]
    async fn mid_stream_veto_stops_before_the_tail() {
        let backend = MockBackend::from_replies(vec![
            MockReply::chunks(["early ", "middle ", "late ", "tail"]).with_delay(10),
        ]);
        // Pre-check allows; every verdict over the generated output blocks,
        // whether the watcher lands mid-stream or the final check does.
        let safety = MockSafety::from_verdicts(vec![
            MockVerdict::allow(),
            MockVerdict::block(),
            MockVerdict::block(),
        ]);
        let config = PipelineConfig::default();
        let refusal = config.refusal_message.clone();
        let adapter = StreamingAdapter::new(Arc::new(backend), Arc::new(safety), config);

        let (contents, outcome) = collect(adapter.run(request())).await;

        assert_eq!(outcome, StreamOutcome::Blocked(BlockStage::Post));
        assert_eq!(contents.last(), Some(&refusal));
    }

    #[tokio::test]
    async fn completed_stream_with_vetoed_text_is_blocked() {
        // Everything drains before the watcher runs; the final check still
        // vetoes the full concatenation.
        let backend = MockBackend::from_replies(vec![MockReply::chunks(["bad content"])]);
        let safety = MockSafety::from_verdicts(vec![
            MockVerdict::allow(),
            MockVerdict::block(),
            MockVerdict::block(),
        ]);
        let adapter = adapter(backend, safety);

        let (_, outcome) = collect(adapter.run(request())).await;

        assert_eq!(outcome, StreamOutcome::Blocked(BlockStage::Post));
    }

    #[tokio::test]
    async fn stalled_stream_times_out() {
        let backend = MockBackend::from_replies(vec![MockReply::never()]);
        let config = PipelineConfig {
            timeout_secs: 1,
            ..PipelineConfig::default()
        };
        let timeout_message = config.timeout_message.clone();
        let adapter =
            StreamingAdapter::new(Arc::new(backend), Arc::new(MockSafety::allow_all()), config);

        let started = std::time::Instant::now();
        let (contents, outcome) = collect(adapter.run(request())).await;

        assert_eq!(outcome, StreamOutcome::TimedOut);
        assert_eq!(contents, vec![timeout_message]);
        assert!(started.elapsed() < Duration::from_secs(3));
    }

    #[tokio::test]
    async fn backend_failure_surfaces_as_failed() {
        let backend = MockBackend::from_replies(vec![MockReply::error("stream broke")]);
        let adapter = adapter(backend, MockSafety::allow_all());

        let (_, outcome) = collect(adapter.run(request())).await;

        assert!(matches!(outcome, StreamOutcome::Failed(_)));
    }
}
