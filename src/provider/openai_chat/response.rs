use crate::error::LLMError;
use crate::types::{ChatResponse, ProviderMetadata};

use super::types::OpenAiCompletion;

/// Buffered completion to [`ChatResponse`]. A reply with no choices is a vendor error, a
/// choice with null content is an empty reply.
pub(crate) fn map_response(
    completion: OpenAiCompletion,
    provider: &'static str,
    endpoint: String,
) -> Result<ChatResponse, LLMError> {
    let choice = completion
        .first_choice()
        .ok_or_else(|| LLMError::provider(provider, "response contained no choices"))?;
    let text = choice.text().to_string();
    let finish_reason = choice.finish_reason();
    let raw = serde_json::to_value(&completion).ok();

    Ok(ChatResponse {
        text,
        usage: completion.usage.map(Into::into),
        finish_reason,
        model: completion.model,
        provider: ProviderMetadata {
            provider: provider.to_string(),
            request_id: completion.id,
            endpoint: Some(endpoint),
            raw,
        },
    })
}
