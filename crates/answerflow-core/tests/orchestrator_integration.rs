//! Integration tests for the answer orchestrator

use std::sync::Arc;
use std::time::{Duration, Instant};

use answerflow_core::mock::{MockBackend, MockEmbedder, MockReply, MockSafety, MockSummarizer, MockVerdict};
use answerflow_core::{
    AnswerOrchestrator, CacheContext, CacheManager, MemoryKvStore, MemorySimilarityIndex,
    OrchestratorConfig, PRE_ANSWER_NAMESPACE, PipelineConfig, StreamEvent,
};
use answerflow_traits::Role;
use futures::StreamExt;

const QUESTION: &str = "What do beetles eat?";

fn cache_manager(config: &OrchestratorConfig) -> Arc<CacheManager> {
    let embedder = Arc::new(MockEmbedder::new());
    Arc::new(CacheManager::new(
        Arc::new(MemoryKvStore::new()),
        Arc::new(MemorySimilarityIndex::new(embedder)),
        config.exact_cache.clone(),
        config.semantic_cache.clone(),
    ))
}

fn orchestrator(
    backend: MockBackend,
    safety: MockSafety,
    config: OrchestratorConfig,
) -> (AnswerOrchestrator, Arc<CacheManager>) {
    let caches = cache_manager(&config);
    let orchestrator = AnswerOrchestrator::new(
        Arc::new(backend),
        Arc::new(safety),
        Arc::new(MockSummarizer::fixed("earlier conversation summary")),
        Arc::clone(&caches),
        config,
    );
    (orchestrator, caches)
}

#[tokio::test]
async fn clean_question_answers_and_populates_cache() {
    let backend = MockBackend::from_replies(vec![MockReply::text("Beetles eat plants.")]);
    let (orchestrator, caches) =
        orchestrator(backend, MockSafety::allow_all(), OrchestratorConfig::default());

    let answer = orchestrator
        .answer(QUESTION, Some("s1".to_string()), Some("u1".to_string()))
        .await
        .unwrap();

    assert_eq!(answer.response, "Beetles eat plants.");
    assert_eq!(answer.session_id, "s1");
    assert_eq!(answer.user_id, "u1");

    // History grew by exactly the user/assistant pair.
    let history = orchestrator.history().get("s1");
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].role, Role::User);
    assert_eq!(history[0].content, QUESTION);
    assert_eq!(history[1].role, Role::Assistant);
    assert_eq!(history[1].content, "Beetles eat plants.");

    // The pre-answer namespace now carries the answer keyed by the question.
    let cached: Option<String> = caches
        .namespace(PRE_ANSWER_NAMESPACE)
        .lookup(&CacheContext::Question(QUESTION.to_string()))
        .await;
    assert_eq!(cached.as_deref(), Some("Beetles eat plants."));
}

#[tokio::test]
async fn repeated_question_is_served_from_cache() {
    let backend = MockBackend::from_replies(vec![MockReply::text("Beetles eat plants.")]);
    let (orchestrator, _) = orchestrator(
        backend.clone(),
        MockSafety::allow_all(),
        OrchestratorConfig::default(),
    );

    let first = orchestrator
        .answer(QUESTION, Some("s1".to_string()), Some("u1".to_string()))
        .await
        .unwrap();
    let second = orchestrator
        .answer(QUESTION, Some("s2".to_string()), Some("u1".to_string()))
        .await
        .unwrap();

    assert_eq!(first.response, second.response);
    // The backend ran once; the second request never reached it.
    assert_eq!(backend.calls(), 1);
    // The cached exchange is still recorded in the second session.
    assert_eq!(orchestrator.history().get("s2").len(), 2);
}

#[tokio::test]
async fn pre_veto_refuses_and_keeps_history_clean() {
    // Generation completes immediately with content that must never leak.
    let backend = MockBackend::from_replies(vec![MockReply::text("FORBIDDEN CONTENT")]);
    let safety = MockSafety::from_verdicts(vec![MockVerdict::block().with_delay(20)]);
    let (orchestrator, caches) = orchestrator(backend, safety, OrchestratorConfig::default());

    let answer = orchestrator
        .answer(QUESTION, Some("s1".to_string()), Some("u1".to_string()))
        .await
        .unwrap();

    assert!(!answer.response.contains("FORBIDDEN CONTENT"));
    assert_eq!(
        answer.response,
        PipelineConfig::default().refusal_message
    );
    // Nothing persisted, nothing cached.
    assert!(orchestrator.history().get("s1").is_empty());
    let cached: Option<String> = caches
        .namespace(PRE_ANSWER_NAMESPACE)
        .lookup(&CacheContext::Question(QUESTION.to_string()))
        .await;
    assert!(cached.is_none());
}

#[tokio::test]
async fn post_veto_refuses_and_keeps_history_clean() {
    let backend = MockBackend::from_replies(vec![MockReply::text("questionable output")]);
    let safety = MockSafety::from_verdicts(vec![MockVerdict::allow(), MockVerdict::block()]);
    let (orchestrator, _) = orchestrator(backend, safety, OrchestratorConfig::default());

    let answer = orchestrator
        .answer(QUESTION, Some("s1".to_string()), Some("u1".to_string()))
        .await
        .unwrap();

    assert_eq!(answer.response, PipelineConfig::default().refusal_message);
    assert!(orchestrator.history().get("s1").is_empty());
}

#[tokio::test]
async fn timeout_answers_with_notice_and_records_the_turn() {
    let backend = MockBackend::from_replies(vec![MockReply::never()]);
    let config = OrchestratorConfig {
        pipeline: PipelineConfig {
            timeout_secs: 1,
            ..PipelineConfig::default()
        },
        ..OrchestratorConfig::default()
    };
    let timeout_message = config.pipeline.timeout_message.clone();
    let (orchestrator, _) = orchestrator(backend, MockSafety::allow_all(), config);

    let started = Instant::now();
    let answer = orchestrator
        .answer(QUESTION, Some("s1".to_string()), Some("u1".to_string()))
        .await
        .unwrap();

    assert!(started.elapsed() < Duration::from_secs(3));
    assert_eq!(answer.response, timeout_message);

    // The incomplete exchange is still on the record.
    let history = orchestrator.history().get("s1");
    assert_eq!(history.len(), 2);
    assert_eq!(history[1].content, timeout_message);
}

#[tokio::test]
async fn long_sessions_are_compacted() {
    let backend = MockBackend::new();
    let (orchestrator, _) =
        orchestrator(backend, MockSafety::allow_all(), OrchestratorConfig::default());

    // Three exchanges put six turns on record, hitting the threshold.
    for i in 0..3 {
        orchestrator
            .answer(&format!("question number {i}"), Some("s1".to_string()), None)
            .await
            .unwrap();
    }
    assert_eq!(orchestrator.history().len("s1"), 6);

    // The next request compacts before generating.
    orchestrator
        .answer("one more question", Some("s1".to_string()), None)
        .await
        .unwrap();

    let history = orchestrator.history().get("s1");
    // Summary turn + four kept turns + the new exchange.
    assert_eq!(history.len(), 1 + 4 + 2);
    assert_eq!(history[0].role, Role::System);
    assert!(history[0].content.starts_with("Previous conversation summary:"));
}

#[tokio::test]
async fn stream_emits_metadata_content_and_sentinel() {
    let backend =
        MockBackend::from_replies(vec![MockReply::chunks(["Beetles ", "eat ", "plants."])]);
    let (orchestrator, _) =
        orchestrator(backend, MockSafety::allow_all(), OrchestratorConfig::default());

    let events: Vec<StreamEvent> = orchestrator
        .answer_stream(QUESTION, Some("s1".to_string()), Some("u1".to_string()))
        .collect()
        .await;

    assert_eq!(
        events.first(),
        Some(&StreamEvent::Metadata {
            session_id: "s1".to_string(),
            user_id: "u1".to_string(),
        })
    );
    assert_eq!(events.last(), Some(&StreamEvent::Done));

    let content: String = events
        .iter()
        .filter_map(|event| match event {
            StreamEvent::Content(text) => Some(text.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(content, "Beetles eat plants.");

    // Persistence happened after the sentinel.
    let history = orchestrator.history().get("s1");
    assert_eq!(history.len(), 2);
    assert_eq!(history[1].content, "Beetles eat plants.");
}

#[tokio::test]
async fn stream_replay_matches_the_live_run() {
    let backend =
        MockBackend::from_replies(vec![MockReply::chunks(["Beetles ", "eat ", "plants."])]);
    let (orchestrator, _) = orchestrator(
        backend.clone(),
        MockSafety::allow_all(),
        OrchestratorConfig::default(),
    );

    let live: Vec<StreamEvent> = orchestrator
        .answer_stream(QUESTION, Some("s1".to_string()), Some("u1".to_string()))
        .collect()
        .await;
    let replayed: Vec<StreamEvent> = orchestrator
        .answer_stream(QUESTION, Some("s2".to_string()), Some("u1".to_string()))
        .collect()
        .await;

    let concat = |events: &[StreamEvent]| -> String {
        events
            .iter()
            .filter_map(|event| match event {
                StreamEvent::Content(text) => Some(text.as_str()),
                _ => None,
            })
            .collect()
    };

    assert_eq!(concat(&live), concat(&replayed));
    // The replay never touched the backend.
    assert_eq!(backend.calls(), 1);
}

#[tokio::test]
async fn blocked_stream_replaces_content_with_refusal() {
    let backend = MockBackend::from_replies(vec![MockReply::chunks(["secret"])]);
    let safety = MockSafety::from_verdicts(vec![MockVerdict::block()]);
    let (orchestrator, _) = orchestrator(backend, safety, OrchestratorConfig::default());

    let events: Vec<StreamEvent> = orchestrator
        .answer_stream(QUESTION, Some("s1".to_string()), Some("u1".to_string()))
        .collect()
        .await;

    let refusal = PipelineConfig::default().refusal_message;
    assert!(events.contains(&StreamEvent::Content(refusal)));
    assert!(!events.contains(&StreamEvent::Content("secret".to_string())));
    // The blocked exchange is not persisted.
    assert!(orchestrator.history().get("s1").is_empty());
}
