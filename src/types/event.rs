//! Incremental inference events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::tool::ModelToolCall;

/// One event of an inference stream.
#[derive(Debug, Clone, PartialEq)]
pub enum InferenceEvent {
    /// A fragment of generated text.
    Delta(String),
    /// Terminal event. Exactly one per successful stream.
    Done(CompletionRecord),
}

/// Metadata reported by the final `done` message.
///
/// Durations are nanoseconds. Anything the server omitted stays zero or `None`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CompletionRecord {
    #[serde(default)]
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub done_reason: Option<String>,
    #[serde(default)]
    pub total_duration: u64,
    #[serde(default)]
    pub load_duration: u64,
    #[serde(default)]
    pub prompt_eval_count: u64,
    #[serde(default)]
    pub prompt_eval_duration: u64,
    #[serde(default)]
    pub eval_count: u64,
    #[serde(default)]
    pub eval_duration: u64,
    /// Continuation context (generate endpoint only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<Vec<i64>>,
    /// Tool calls the model requested anywhere in the stream.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ModelToolCall>,
}

impl CompletionRecord {
    /// Generation speed, if the server reported an eval duration.
    pub fn tokens_per_second(&self) -> Option<f64> {
        if self.eval_duration == 0 {
            return None;
        }
        Some(self.eval_count as f64 / (self.eval_duration as f64 / 1_000_000_000.0))
    }
}

/// Drained result of a non-streaming inference.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InferenceOutput {
    pub content: String,
    pub done: CompletionRecord,
}
