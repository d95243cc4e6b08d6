//! History compaction - Summarize old turns to keep sessions bounded.
//!
//! Once a session crosses the configured turn threshold, the prefix older
//! than the last `keep_last` turns is rendered as a transcript, summarized
//! by the external capability, and replaced with a single synthetic system
//! turn. Summarization is best-effort: on failure the prefix is dropped
//! outright, so the request path never fails on compaction.

use std::sync::Arc;

use answerflow_traits::{Summarizer, Turn};
use tracing::{debug, warn};

use crate::config::CompactionConfig;

/// Render turns as a flattened role-prefixed transcript, one line per turn.
pub fn format_transcript(turns: &[Turn]) -> String {
    turns
        .iter()
        .map(|turn| format!("{}: {}", turn.role.label(), turn.content))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Compactor for per-session conversation histories.
pub struct HistoryCompactor {
    summarizer: Arc<dyn Summarizer>,
    config: CompactionConfig,
}

impl HistoryCompactor {
    pub fn new(summarizer: Arc<dyn Summarizer>, config: CompactionConfig) -> Self {
        Self { summarizer, config }
    }

    /// Check if compaction is needed.
    pub fn needs_compaction(&self, history: &[Turn]) -> bool {
        history.len() >= self.config.threshold
    }

    /// Configured number of recent turns preserved verbatim.
    pub fn keep_last(&self) -> usize {
        self.config.keep_last
    }

    /// Compact a history down to one summary turn plus the last `keep_last`
    /// turns.
    ///
    /// Returns the history unchanged when it is not longer than `keep_last`.
    /// Never fails: a summarizer error degrades to plain truncation.
    pub async fn compact(&self, history: &[Turn], keep_last: usize) -> Vec<Turn> {
        if history.len() <= keep_last {
            return history.to_vec();
        }

        let split = history.len() - keep_last;
        let old = &history[..split];
        let remaining = &history[split..];

        let transcript = format_transcript(old);
        match self.summarizer.summarize(&transcript).await {
            Ok(summary) => {
                debug!(
                    summarized = old.len(),
                    kept = remaining.len(),
                    "compacted history"
                );
                let mut compacted = Vec::with_capacity(remaining.len() + 1);
                compacted.push(Turn::system(format!(
                    "Previous conversation summary: {summary}"
                )));
                compacted.extend_from_slice(remaining);
                compacted
            }
            Err(error) => {
                warn!(%error, dropped = old.len(), "summarization failed, truncating history");
                remaining.to_vec()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use answerflow_traits::{CapabilityError, CapabilityResult, Role};
    use async_trait::async_trait;

    use super::*;

    struct FixedSummarizer {
        response: Option<String>,
    }

    #[async_trait]
    impl Summarizer for FixedSummarizer {
        async fn summarize(&self, _transcript: &str) -> CapabilityResult<String> {
            self.response
                .clone()
                .ok_or_else(|| CapabilityError::Summarizer("unavailable".to_string()))
        }
    }

    fn compactor(response: Option<&str>) -> HistoryCompactor {
        HistoryCompactor::new(
            Arc::new(FixedSummarizer {
                response: response.map(String::from),
            }),
            CompactionConfig::default(),
        )
    }

    fn history(len: usize) -> Vec<Turn> {
        (0..len)
            .map(|i| {
                if i % 2 == 0 {
                    Turn::user(format!("question {i}"))
                } else {
                    Turn::assistant(format!("answer {i}"))
                }
            })
            .collect()
    }

    #[test]
    fn transcript_is_role_prefixed() {
        let turns = vec![Turn::user("hi"), Turn::assistant("hello")];
        assert_eq!(format_transcript(&turns), "User: hi\nAssistant: hello");
    }

    #[test]
    fn threshold_triggers_compaction() {
        let compactor = compactor(Some("summary"));
        assert!(!compactor.needs_compaction(&history(5)));
        assert!(compactor.needs_compaction(&history(6)));
    }

    #[tokio::test]
    async fn compacted_history_is_bounded_and_preserves_tail() {
        let compactor = compactor(Some("the gist"));
        let original = history(8);

        let compacted = compactor.compact(&original, 4).await;

        assert!(compacted.len() <= 4 + 1);
        assert_eq!(compacted[0].role, Role::System);
        assert_eq!(
            compacted[0].content,
            "Previous conversation summary: the gist"
        );
        assert_eq!(&compacted[1..], &original[4..]);
    }

    #[tokio::test]
    async fn short_history_passes_through() {
        let compactor = compactor(Some("unused"));
        let original = history(3);

        let compacted = compactor.compact(&original, 4).await;

        assert_eq!(compacted, original);
    }

    #[tokio::test]
    async fn summarizer_failure_truncates() {
        let compactor = compactor(None);
        let original = history(8);

        let compacted = compactor.compact(&original, 4).await;

        assert_eq!(compacted, &original[4..]);
    }
}
