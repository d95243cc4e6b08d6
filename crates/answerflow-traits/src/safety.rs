//! Content-safety evaluator contract.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::Result;
use crate::turn::Turn;

/// Marker that flags a veto when it appears in an evaluator's response text,
/// independent of the structured verdict.
pub const BLOCK_MARKER: &str = "sorry";

/// Structured verdict returned by a safety evaluation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SafetyVerdict {
    Allow,
    Block,
}

/// Outcome of one safety evaluation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SafetyReport {
    pub verdict: SafetyVerdict,
    pub text: String,
}

impl SafetyReport {
    pub fn allow() -> Self {
        Self {
            verdict: SafetyVerdict::Allow,
            text: String::new(),
        }
    }

    pub fn block(text: impl Into<String>) -> Self {
        Self {
            verdict: SafetyVerdict::Block,
            text: text.into(),
        }
    }

    /// Whether this report vetoes the request or response.
    ///
    /// Any evaluator response carrying a block indicator counts: either the
    /// structured `Block` verdict or [`BLOCK_MARKER`] in the response text.
    pub fn is_blocked(&self) -> bool {
        self.verdict == SafetyVerdict::Block || self.text.to_lowercase().contains(BLOCK_MARKER)
    }
}

/// Per-request options forwarded to the evaluator.
#[derive(Debug, Clone, Default)]
pub struct SafetyOptions {
    pub metadata: Map<String, Value>,
}

impl SafetyOptions {
    /// Options carrying the session and user identity of the request under
    /// evaluation.
    pub fn for_session(session_id: &str, user_id: &str) -> Self {
        let mut metadata = Map::new();
        metadata.insert("session_id".to_string(), Value::from(session_id));
        metadata.insert("user_id".to_string(), Value::from(user_id));
        Self { metadata }
    }
}

/// Content-safety capability.
#[async_trait]
pub trait SafetyEvaluator: Send + Sync {
    async fn evaluate(&self, messages: &[Turn], options: SafetyOptions) -> Result<SafetyReport>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_verdict_is_blocked() {
        assert!(SafetyReport::block("policy violation").is_blocked());
        assert!(!SafetyReport::allow().is_blocked());
    }

    #[test]
    fn marker_in_text_is_blocked() {
        let report = SafetyReport {
            verdict: SafetyVerdict::Allow,
            text: "I'm Sorry, I can't help with that.".to_string(),
        };
        assert!(report.is_blocked());
    }
}
