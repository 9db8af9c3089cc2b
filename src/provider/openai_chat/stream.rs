use crate::error::LLMError;
use crate::http::HttpBodyStream;
use crate::provider::ChatStream;
use crate::stream::decode_chat_stream;
use crate::types::{ChatChunk, TokenUsage};

use super::types::OpenAiCompletion;

pub(crate) fn create_stream(body: HttpBodyStream, provider: &'static str) -> ChatStream {
    decode_chat_stream(body, provider, move |data| {
        let chunk: OpenAiCompletion = serde_json::from_str(data).map_err(|err| {
            LLMError::provider(provider, format!("failed to parse stream chunk: {err}"))
        })?;
        Ok(convert_stream_chunk(chunk))
    })
}

/// Flattens the first choice's delta; chunks with no text, usage or finish reason are dropped.
fn convert_stream_chunk(chunk: OpenAiCompletion) -> Option<ChatChunk> {
    let choice = chunk.first_choice();
    let text = choice.map(|choice| choice.text().to_string()).unwrap_or_default();
    let finish_reason = choice.and_then(|choice| choice.finish_reason());
    let usage: Option<TokenUsage> = chunk.usage.map(Into::into);

    if text.is_empty() && finish_reason.is_none() && usage.is_none() {
        return None;
    }
    Some(ChatChunk {
        text,
        usage,
        finish_reason,
        is_terminal: false,
    })
}
