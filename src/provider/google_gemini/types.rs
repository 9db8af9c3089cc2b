use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::LLMError;
use crate::types::{FinishReason, TokenUsage};

/// `generateContent` 的返回体；`streamGenerateContent?alt=sse` 的每个 data 帧也是同一结构
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GeminiReply {
    #[serde(default)]
    pub(crate) candidates: Vec<GeminiCandidate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) prompt_feedback: Option<GeminiPromptFeedback>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) usage_metadata: Option<GeminiUsage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) model_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) response_id: Option<String>,
}

impl GeminiReply {
    /// A prompt rejected by the safety filters arrives as a 200 with `blockReason` set.
    pub(crate) fn ensure_not_blocked(&self, provider: &'static str) -> Result<(), LLMError> {
        match self
            .prompt_feedback
            .as_ref()
            .and_then(|feedback| feedback.block_reason.as_deref())
        {
            Some(reason) => Err(LLMError::provider(provider, format!("prompt blocked: {reason}"))),
            None => Ok(()),
        }
    }

    /// 缺省 index 时按数组位置排序
    pub(crate) fn first_candidate(&self) -> Option<&GeminiCandidate> {
        self.candidates
            .iter()
            .enumerate()
            .min_by_key(|(position, candidate)| candidate.index.unwrap_or(*position))
            .map(|(_, candidate)| candidate)
    }

    pub(crate) fn text(&self) -> String {
        self.first_candidate()
            .map(GeminiCandidate::text)
            .unwrap_or_default()
    }

    pub(crate) fn finish_reason(&self) -> Option<FinishReason> {
        self.first_candidate()
            .and_then(|candidate| candidate.finish_reason.as_deref())
            .map(|reason| match reason {
                "STOP" => FinishReason::Stop,
                "MAX_TOKENS" => FinishReason::Length,
                "SAFETY" | "RECITATION" | "BLOCKLIST" | "PROHIBITED_CONTENT" | "SPII" => {
                    FinishReason::ContentFilter
                }
                other => FinishReason::Other(other.to_string()),
            })
    }

    pub(crate) fn usage(&self) -> Option<TokenUsage> {
        self.usage_metadata.map(Into::into)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GeminiCandidate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) content: Option<GeminiContent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) finish_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) index: Option<usize>,
}

impl GeminiCandidate {
    /// 拼接文本 part，跳过 thought part
    pub(crate) fn text(&self) -> String {
        self.content
            .iter()
            .flat_map(|content| content.parts.iter())
            .filter(|part| part.thought != Some(true))
            .filter_map(|part| part.text.as_deref())
            .collect()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct GeminiContent {
    #[serde(default)]
    pub(crate) parts: Vec<GeminiPart>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) role: Option<String>,
}

/// functionCall 等其他 part 只留在 raw 里
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct GeminiPart {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) thought: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GeminiPromptFeedback {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) block_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) safety_ratings: Option<Value>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GeminiUsage {
    #[serde(default)]
    pub(crate) prompt_token_count: Option<u64>,
    #[serde(default)]
    pub(crate) candidates_token_count: Option<u64>,
    #[serde(default)]
    pub(crate) total_token_count: Option<u64>,
}

impl From<GeminiUsage> for TokenUsage {
    fn from(usage: GeminiUsage) -> Self {
        Self {
            prompt_tokens: usage.prompt_token_count,
            completion_tokens: usage.candidates_token_count,
            total_tokens: usage.total_token_count,
        }
    }
}
