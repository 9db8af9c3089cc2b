use crate::error::LLMError;
use crate::types::{ChatResponse, ProviderMetadata};

use super::types::GeminiReply;

/// 将 generateContent 返回体映射为统一的 ChatResponse
pub(crate) fn map_response(
    reply: GeminiReply,
    provider: &'static str,
    endpoint: String,
) -> Result<ChatResponse, LLMError> {
    if reply.candidates.is_empty() {
        reply.ensure_not_blocked(provider)?;
    }
    let raw = serde_json::to_value(&reply).ok();

    Ok(ChatResponse {
        text: reply.text(),
        usage: reply.usage(),
        finish_reason: reply.finish_reason(),
        model: reply.model_version,
        provider: ProviderMetadata {
            provider: provider.to_string(),
            request_id: reply.response_id,
            endpoint: Some(endpoint),
            raw,
        },
    })
}
