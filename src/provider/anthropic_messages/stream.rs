use crate::error::LLMError;
use crate::http::HttpBodyStream;
use crate::provider::ChatStream;
use crate::stream::decode_chat_stream;
use crate::types::ChatChunk;

use super::types::{AnthropicEvent, AnthropicStreamError, finish_reason};

pub(crate) fn create_stream(body: HttpBodyStream, provider: &'static str) -> ChatStream {
    decode_chat_stream(body, provider, move |data| {
        let event: AnthropicEvent = serde_json::from_str(data).map_err(|err| {
            LLMError::provider(provider, format!("failed to parse stream event: {err}"))
        })?;
        convert_stream_event(event, provider)
    })
}

fn convert_stream_event(
    event: AnthropicEvent,
    provider: &'static str,
) -> Result<Option<ChatChunk>, LLMError> {
    match event {
        AnthropicEvent::ContentBlockDelta { delta } => Ok(delta
            .text
            .filter(|text| !text.is_empty())
            .map(ChatChunk::text)),
        AnthropicEvent::MessageDelta { delta, usage } => {
            let finish = delta.stop_reason.as_deref().map(finish_reason);
            if finish.is_none() && usage.is_none() {
                return Ok(None);
            }
            Ok(Some(ChatChunk {
                text: String::new(),
                usage: usage.map(Into::into),
                finish_reason: finish,
                is_terminal: false,
            }))
        }
        AnthropicEvent::MessageStop => Ok(Some(ChatChunk::terminal())),
        AnthropicEvent::Error { error } => Err(stream_error(error, provider)),
        AnthropicEvent::Other => Ok(None),
    }
}

/// Overload and rate-limit errors mid-stream surface as [`LLMError::RateLimit`].
fn stream_error(error: AnthropicStreamError, provider: &'static str) -> LLMError {
    let kind = error.kind.unwrap_or_else(|| "error".to_string());
    let message = error.message.unwrap_or_else(|| "stream error".to_string());
    match kind.as_str() {
        "overloaded_error" | "rate_limit_error" => LLMError::RateLimit {
            message,
            retry_after: None,
        },
        _ => LLMError::provider(provider, format!("{message} ({kind})")),
    }
}
