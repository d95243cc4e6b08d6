//! Deterministic mock capabilities for reliability and pipeline tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use answerflow_traits::{
    CapabilityError, CapabilityResult, ChunkStream, EmbeddingProvider, GenerationBackend,
    GenerationRequest, KvStore, SafetyEvaluator, SafetyOptions, SafetyReport, Summarizer, Turn,
};
use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

// ── MockBackend ──────────────────────────────────────────────────────

/// Deterministic step for scripted mock generations.
#[derive(Debug, Clone)]
pub enum MockReplyKind {
    /// Return a complete answer.
    Text(String),
    /// Stream an answer chunk by chunk.
    Chunks(Vec<String>),
    /// Return a generation error.
    Error(String),
    /// Never resolve until cancelled.
    Never,
}

/// Scripted generation step with optional delay.
#[derive(Debug, Clone)]
pub struct MockReply {
    pub delay_ms: u64,
    pub kind: MockReplyKind,
}

impl MockReply {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            delay_ms: 0,
            kind: MockReplyKind::Text(content.into()),
        }
    }

    pub fn chunks(chunks: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            delay_ms: 0,
            kind: MockReplyKind::Chunks(chunks.into_iter().map(Into::into).collect()),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            delay_ms: 0,
            kind: MockReplyKind::Error(message.into()),
        }
    }

    pub fn never() -> Self {
        Self {
            delay_ms: 0,
            kind: MockReplyKind::Never,
        }
    }

    pub fn with_delay(mut self, delay_ms: u64) -> Self {
        self.delay_ms = delay_ms;
        self
    }
}

/// A deterministic generation backend driven by scripted replies.
///
/// Without a script it echoes the question, so most tests only script the
/// interesting steps. Honors cancellation at its await points the way a
/// network-backed implementation would.
#[derive(Debug, Clone, Default)]
pub struct MockBackend {
    script: Arc<Mutex<VecDeque<MockReply>>>,
    calls: Arc<AtomicUsize>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_replies(replies: Vec<MockReply>) -> Self {
        Self {
            script: Arc::new(Mutex::new(VecDeque::from(replies))),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub async fn push_reply(&self, reply: MockReply) {
        self.script.lock().await.push_back(reply);
    }

    /// Total `generate` + `generate_stream` invocations so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    async fn next_reply(&self) -> Option<MockReply> {
        self.script.lock().await.pop_front()
    }

    fn echo(request: &GenerationRequest) -> String {
        format!("mock-echo: {}", request.question)
    }
}

#[async_trait]
impl GenerationBackend for MockBackend {
    async fn generate(
        &self,
        request: GenerationRequest,
        cancel: CancellationToken,
    ) -> CapabilityResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let Some(reply) = self.next_reply().await else {
            return Ok(Self::echo(&request));
        };

        if reply.delay_ms > 0 {
            tokio::select! {
                _ = cancel.cancelled() => return Err(CapabilityError::Cancelled),
                _ = sleep(Duration::from_millis(reply.delay_ms)) => {}
            }
        }

        match reply.kind {
            MockReplyKind::Text(content) => Ok(content),
            MockReplyKind::Chunks(chunks) => Ok(chunks.concat()),
            MockReplyKind::Error(message) => Err(CapabilityError::Generation(message)),
            MockReplyKind::Never => {
                cancel.cancelled().await;
                Err(CapabilityError::Cancelled)
            }
        }
    }

    fn generate_stream(&self, request: GenerationRequest) -> ChunkStream {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let backend = self.clone();
        Box::pin(async_stream::stream! {
            let reply = backend
                .next_reply()
                .await
                .unwrap_or_else(|| MockReply::text(MockBackend::echo(&request)));

            if reply.delay_ms > 0 {
                sleep(Duration::from_millis(reply.delay_ms)).await;
            }

            match reply.kind {
                MockReplyKind::Text(content) => yield Ok(content),
                MockReplyKind::Chunks(chunks) => {
                    for chunk in chunks {
                        yield Ok(chunk);
                    }
                }
                MockReplyKind::Error(message) => {
                    yield Err(CapabilityError::Generation(message));
                }
                MockReplyKind::Never => {
                    futures::future::pending::<()>().await;
                }
            }
        })
    }
}

// ── MockSafety ───────────────────────────────────────────────────────

/// Scripted safety verdict with optional delay.
#[derive(Debug, Clone)]
pub struct MockVerdict {
    pub delay_ms: u64,
    pub report: SafetyReport,
}

impl MockVerdict {
    pub fn allow() -> Self {
        Self {
            delay_ms: 0,
            report: SafetyReport::allow(),
        }
    }

    pub fn block() -> Self {
        Self {
            delay_ms: 0,
            report: SafetyReport::block("policy violation"),
        }
    }

    pub fn with_delay(mut self, delay_ms: u64) -> Self {
        self.delay_ms = delay_ms;
        self
    }
}

/// A deterministic safety evaluator driven by scripted verdicts. Allows
/// everything once the script runs dry.
#[derive(Debug, Clone, Default)]
pub struct MockSafety {
    script: Arc<Mutex<VecDeque<MockVerdict>>>,
    calls: Arc<AtomicUsize>,
}

impl MockSafety {
    pub fn allow_all() -> Self {
        Self::default()
    }

    pub fn from_verdicts(verdicts: Vec<MockVerdict>) -> Self {
        Self {
            script: Arc::new(Mutex::new(VecDeque::from(verdicts))),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SafetyEvaluator for MockSafety {
    async fn evaluate(
        &self,
        _messages: &[Turn],
        _options: SafetyOptions,
    ) -> CapabilityResult<SafetyReport> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let Some(verdict) = self.script.lock().await.pop_front() else {
            return Ok(SafetyReport::allow());
        };
        if verdict.delay_ms > 0 {
            sleep(Duration::from_millis(verdict.delay_ms)).await;
        }
        Ok(verdict.report)
    }
}

// ── MockSummarizer ───────────────────────────────────────────────────

/// Summarizer returning a fixed summary, or failing when none is set.
#[derive(Debug, Clone, Default)]
pub struct MockSummarizer {
    summary: Option<String>,
    calls: Arc<AtomicUsize>,
}

impl MockSummarizer {
    pub fn fixed(summary: impl Into<String>) -> Self {
        Self {
            summary: Some(summary.into()),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn failing() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Summarizer for MockSummarizer {
    async fn summarize(&self, _transcript: &str) -> CapabilityResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.summary
            .clone()
            .ok_or_else(|| CapabilityError::Summarizer("summarizer offline".to_string()))
    }
}

// ── MockEmbedder ─────────────────────────────────────────────────────

/// Embedding provider with pinned vectors per text and a deterministic
/// byte-histogram fallback for everything else.
#[derive(Debug, Clone)]
pub struct MockEmbedder {
    vectors: HashMap<String, Vec<f32>>,
    dimension: usize,
}

impl Default for MockEmbedder {
    fn default() -> Self {
        Self::new()
    }
}

impl MockEmbedder {
    pub fn new() -> Self {
        Self {
            vectors: HashMap::new(),
            dimension: 3,
        }
    }

    pub fn with_vector(mut self, text: impl Into<String>, vector: Vec<f32>) -> Self {
        self.dimension = vector.len();
        self.vectors.insert(text.into(), vector);
        self
    }

    fn histogram(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];
        for byte in text.bytes() {
            vector[byte as usize % self.dimension] += 1.0;
        }
        vector
    }
}

#[async_trait]
impl EmbeddingProvider for MockEmbedder {
    async fn embed(&self, text: &str) -> CapabilityResult<Vec<f32>> {
        Ok(self
            .vectors
            .get(text)
            .cloned()
            .unwrap_or_else(|| self.histogram(text)))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        "mock-embedder"
    }
}

// ── FlakyKvStore ─────────────────────────────────────────────────────

/// Key-value store that is permanently unreachable.
#[derive(Debug, Clone, Copy, Default)]
pub struct FlakyKvStore;

#[async_trait]
impl KvStore for FlakyKvStore {
    async fn get(&self, _key: &str) -> CapabilityResult<Option<String>> {
        Err(CapabilityError::Store("connection refused".to_string()))
    }

    async fn set(&self, _key: &str, _value: String, _ttl: Duration) -> CapabilityResult<()> {
        Err(CapabilityError::Store("connection refused".to_string()))
    }

    async fn delete(&self, _key: &str) -> CapabilityResult<()> {
        Err(CapabilityError::Store("connection refused".to_string()))
    }

    async fn keys(&self, _pattern: &str) -> CapabilityResult<Vec<String>> {
        Err(CapabilityError::Store("connection refused".to_string()))
    }
}
