//! Generation backend contract.
//!
//! The language-generation capability is consumed through
//! [`GenerationBackend`]: a one-shot call that must honor cooperative
//! cancellation, and a chunked streaming call. Implementations live outside
//! the core; the pipeline only depends on this trait.

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::turn::Turn;

/// One generation request: the question plus the conversation context it is
/// asked in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub question: String,
    pub chat_history: Vec<Turn>,
    pub session_id: String,
    pub user_id: String,
}

impl GenerationRequest {
    pub fn new(
        question: impl Into<String>,
        chat_history: Vec<Turn>,
        session_id: impl Into<String>,
        user_id: impl Into<String>,
    ) -> Self {
        Self {
            question: question.into(),
            chat_history,
            session_id: session_id.into(),
            user_id: user_id.into(),
        }
    }
}

/// Ordered, finite, non-restartable sequence of content fragments.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// Language-generation capability.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Produce a complete answer.
    ///
    /// The call must be cancellable mid-flight: implementations check
    /// `cancel` at their await points and return
    /// [`CapabilityError::Cancelled`](crate::error::CapabilityError::Cancelled)
    /// once it fires, without leaking the underlying network call.
    async fn generate(
        &self,
        request: GenerationRequest,
        cancel: CancellationToken,
    ) -> Result<String>;

    /// Produce the answer as an incremental chunk sequence.
    fn generate_stream(&self, request: GenerationRequest) -> ChunkStream;
}
