use crate::error::LLMError;
use crate::http::HttpBodyStream;
use crate::provider::ChatStream;
use crate::stream::decode_chat_stream;
use crate::types::ChatChunk;

use super::types::GeminiReply;

/// streamGenerateContent?alt=sse 的每个 data 帧都是完整的 GenerateContentResponse
pub(crate) fn create_stream(body: HttpBodyStream, provider: &'static str) -> ChatStream {
    decode_chat_stream(body, provider, move |data| {
        let chunk: GeminiReply = serde_json::from_str(data).map_err(|err| {
            LLMError::provider(provider, format!("failed to parse stream chunk: {err}"))
        })?;
        convert_stream_chunk(chunk, provider)
    })
}

fn convert_stream_chunk(
    chunk: GeminiReply,
    provider: &'static str,
) -> Result<Option<ChatChunk>, LLMError> {
    chunk.ensure_not_blocked(provider)?;

    let text = chunk.text();
    let finish_reason = chunk.finish_reason();
    let usage = chunk.usage();

    if text.is_empty() && finish_reason.is_none() && usage.is_none() {
        return Ok(None);
    }
    Ok(Some(ChatChunk {
        text,
        usage,
        finish_reason,
        is_terminal: false,
    }))
}
