//! Safety-gated generation - the one-shot pipeline, its streaming variant,
//! and the orchestrator tying them to history and caching

mod gated;
mod orchestrator;
mod streaming;

pub use gated::{BlockStage, GateOutcome, GatedPipeline};
pub use orchestrator::{
    AnswerOrchestrator, AnswerResponse, PRE_ANSWER_NAMESPACE, PRE_ANSWER_STREAM_NAMESPACE,
    StreamEvent,
};
pub use streaming::{ChunkEvent, StreamOutcome, StreamingAdapter};
