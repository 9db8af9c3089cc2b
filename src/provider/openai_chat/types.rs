//! Chat Completions wire format. Buffered replies and stream chunks share one shape:
//! a choice carries `message` in the former and `delta` in the latter.

use serde::{Deserialize, Serialize};

use crate::types::{FinishReason, TokenUsage};

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub(crate) struct OpenAiCompletion {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) model: Option<String>,
    #[serde(default)]
    pub(crate) choices: Vec<OpenAiChoice>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) usage: Option<OpenAiUsage>,
}

impl OpenAiCompletion {
    /// Vendors may reorder choices; the gateway only ever asks for one.
    pub(crate) fn first_choice(&self) -> Option<&OpenAiChoice> {
        self.choices.iter().min_by_key(|choice| choice.index)
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub(crate) struct OpenAiChoice {
    #[serde(default)]
    pub(crate) index: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) message: Option<OpenAiText>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) delta: Option<OpenAiText>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) finish_reason: Option<String>,
}

impl OpenAiChoice {
    pub(crate) fn text(&self) -> &str {
        self.message
            .as_ref()
            .or(self.delta.as_ref())
            .and_then(|part| part.content.as_deref())
            .unwrap_or_default()
    }

    pub(crate) fn finish_reason(&self) -> Option<FinishReason> {
        self.finish_reason.as_deref().map(|reason| match reason {
            "stop" => FinishReason::Stop,
            "length" => FinishReason::Length,
            "content_filter" => FinishReason::ContentFilter,
            other => FinishReason::Other(other.to_string()),
        })
    }
}

/// `message` or `delta`. Role is ignored; null content shows up on refusals and role-only deltas.
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub(crate) struct OpenAiText {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) role: Option<String>,
    #[serde(default)]
    pub(crate) content: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, Default)]
pub(crate) struct OpenAiUsage {
    #[serde(default)]
    pub(crate) prompt_tokens: Option<u64>,
    #[serde(default)]
    pub(crate) completion_tokens: Option<u64>,
    #[serde(default)]
    pub(crate) total_tokens: Option<u64>,
}

impl From<OpenAiUsage> for TokenUsage {
    fn from(usage: OpenAiUsage) -> Self {
        Self {
            prompt_tokens: usage.prompt_tokens,
            completion_tokens: usage.completion_tokens,
            total_tokens: usage.total_tokens,
        }
    }
}
