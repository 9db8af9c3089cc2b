use serde::{Deserialize, Serialize};

use crate::types::{FinishReason, TokenUsage};

/// Non-streaming response payload returned by Anthropic Messages.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct AnthropicMessage {
    /// Some compatibility layers omit the `id`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) model: Option<String>,
    #[serde(default)]
    pub(crate) content: Vec<AnthropicBlock>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) stop_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) usage: Option<AnthropicUsage>,
}

impl AnthropicMessage {
    /// Text blocks joined in order; `tool_use` and other blocks are ignored.
    pub(crate) fn text(&self) -> String {
        self.content
            .iter()
            .filter(|block| block.kind == "text")
            .filter_map(|block| block.text.as_deref())
            .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct AnthropicBlock {
    #[serde(rename = "type")]
    pub(crate) kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) text: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub(crate) struct AnthropicUsage {
    #[serde(default)]
    pub(crate) input_tokens: Option<u64>,
    #[serde(default)]
    pub(crate) output_tokens: Option<u64>,
}

impl From<AnthropicUsage> for TokenUsage {
    /// Anthropic reports no total; it is the sum of whichever counters are present.
    fn from(usage: AnthropicUsage) -> Self {
        let total = match (usage.input_tokens, usage.output_tokens) {
            (None, None) => None,
            (input, output) => Some(input.unwrap_or(0) + output.unwrap_or(0)),
        };
        Self {
            prompt_tokens: usage.input_tokens,
            completion_tokens: usage.output_tokens,
            total_tokens: total,
        }
    }
}

pub(crate) fn finish_reason(stop_reason: &str) -> FinishReason {
    match stop_reason {
        "end_turn" | "stop_sequence" => FinishReason::Stop,
        "max_tokens" => FinishReason::Length,
        "refusal" => FinishReason::ContentFilter,
        other => FinishReason::Other(other.to_string()),
    }
}

/// One SSE `data:` payload, tagged by its own `type` field.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub(crate) enum AnthropicEvent {
    ContentBlockDelta {
        #[serde(default)]
        delta: AnthropicDelta,
    },
    MessageDelta {
        #[serde(default)]
        delta: AnthropicDelta,
        #[serde(default)]
        usage: Option<AnthropicUsage>,
    },
    MessageStop,
    Error {
        #[serde(default)]
        error: AnthropicStreamError,
    },
    /// message_start, content_block_start/stop, ping
    #[serde(other)]
    Other,
}

/// `text_delta` carries `text`, `message_delta` carries `stop_reason`.
#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct AnthropicDelta {
    #[serde(default)]
    pub(crate) text: Option<String>,
    #[serde(default)]
    pub(crate) stop_reason: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct AnthropicStreamError {
    #[serde(default, rename = "type")]
    pub(crate) kind: Option<String>,
    #[serde(default)]
    pub(crate) message: Option<String>,
}
