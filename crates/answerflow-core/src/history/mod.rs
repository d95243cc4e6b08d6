//! Session history - Per-session conversation logs and their compaction

mod compaction;
mod store;

pub use compaction::{HistoryCompactor, format_transcript};
pub use store::SessionHistoryStore;
