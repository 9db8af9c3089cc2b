use crate::error::LLMError;
use crate::types::{ChatResponse, ProviderMetadata};

use super::types::{AnthropicMessage, finish_reason};

pub(crate) fn map_response(
    message: AnthropicMessage,
    provider: &'static str,
    endpoint: String,
) -> Result<ChatResponse, LLMError> {
    let raw = serde_json::to_value(&message).ok();

    Ok(ChatResponse {
        text: message.text(),
        usage: message.usage.map(Into::into),
        finish_reason: message.stop_reason.as_deref().map(finish_reason),
        model: message.model,
        provider: ProviderMetadata {
            provider: provider.to_string(),
            request_id: message.id,
            endpoint: Some(endpoint),
            raw,
        },
    })
}
