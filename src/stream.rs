//! Server-Sent Events decoding for vendor streaming endpoints.

use async_stream::stream;
use futures_util::StreamExt;

use crate::error::LLMError;
use crate::http::HttpBodyStream;
use crate::provider::ChatStream;
use crate::types::ChatChunk;

/// Upper bound for one buffered event. A vendor that never sends the blank separator line
/// must not grow the buffer without limit.
const MAX_EVENT_BYTES: usize = 1 << 20;

/// One SSE event after its `data:` lines were joined.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseFrame {
    Data(String),
    /// The OpenAI-style `[DONE]` sentinel.
    Done,
}

/// Incremental SSE parser. Body bytes may be cut anywhere, including inside a line or a
/// UTF-8 sequence.
///
/// Only `data:` fields are kept. `event:`, `id:`, `retry:` and comment lines are dropped
/// because every supported vendor repeats the event type inside the JSON payload.
#[derive(Debug)]
pub struct SseParser {
    provider: &'static str,
    buffer: Vec<u8>,
    data: Vec<u8>,
    has_data: bool,
}

impl SseParser {
    pub fn new(provider: &'static str) -> Self {
        Self {
            provider,
            buffer: Vec::new(),
            data: Vec::new(),
            has_data: false,
        }
    }

    /// Feeds raw body bytes and returns the events they complete.
    pub fn push(&mut self, bytes: &[u8]) -> Result<Vec<SseFrame>, LLMError> {
        self.buffer.extend_from_slice(bytes);
        let mut frames = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|byte| *byte == b'\n') {
            let mut line: Vec<u8> = self.buffer.drain(..=pos).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            if line.is_empty() {
                frames.extend(self.dispatch()?);
            } else {
                self.field(&line);
            }
        }

        if self.buffer.len() + self.data.len() > MAX_EVENT_BYTES {
            return Err(LLMError::provider(
                self.provider,
                format!("stream event exceeds {MAX_EVENT_BYTES} bytes"),
            ));
        }
        Ok(frames)
    }

    /// Flushes an event the vendor left unterminated when the body closed.
    pub fn finish(&mut self) -> Result<Option<SseFrame>, LLMError> {
        let rest = std::mem::take(&mut self.buffer);
        if !rest.is_empty() {
            self.field(rest.strip_suffix(b"\r").unwrap_or(&rest));
        }
        self.dispatch()
    }

    fn field(&mut self, line: &[u8]) {
        let Some(value) = line.strip_prefix(b"data:") else {
            return;
        };
        let value = value.strip_prefix(b" ").unwrap_or(value);
        if self.has_data {
            self.data.push(b'\n');
        }
        self.data.extend_from_slice(value);
        self.has_data = true;
    }

    fn dispatch(&mut self) -> Result<Option<SseFrame>, LLMError> {
        if !std::mem::take(&mut self.has_data) {
            return Ok(None);
        }
        let data = String::from_utf8(std::mem::take(&mut self.data)).map_err(|err| {
            LLMError::provider(self.provider, format!("invalid UTF-8 in stream chunk: {err}"))
        })?;
        if data.is_empty() {
            return Ok(None);
        }
        if data.trim() == "[DONE]" {
            return Ok(Some(SseFrame::Done));
        }
        Ok(Some(SseFrame::Data(data)))
    }
}

/// Decodes an SSE body and maps every `data:` payload through `convert`.
///
/// `convert` returns `Ok(None)` for payloads that carry nothing worth forwarding
/// (pings, metadata-only events). `[DONE]` yields a terminal [`ChatChunk`] and ends the
/// stream; so does the first error.
pub(crate) fn decode_chat_stream<F>(
    mut body: HttpBodyStream,
    provider: &'static str,
    mut convert: F,
) -> ChatStream
where
    F: FnMut(&str) -> Result<Option<ChatChunk>, LLMError> + Send + 'static,
{
    Box::pin(stream! {
        let mut parser = SseParser::new(provider);
        loop {
            let next = body.next().await;
            let closed = next.is_none();
            let frames = match next {
                Some(Ok(bytes)) => parser.push(&bytes),
                Some(Err(err)) => Err(err),
                None => parser.finish().map(|frame| frame.into_iter().collect()),
            };
            let frames = match frames {
                Ok(frames) => frames,
                Err(err) => {
                    yield Err(err);
                    return;
                }
            };

            for frame in frames {
                match frame {
                    SseFrame::Done => {
                        yield Ok(ChatChunk::terminal());
                        return;
                    }
                    SseFrame::Data(data) => match convert(&data) {
                        Ok(Some(chunk)) => {
                            yield Ok(chunk);
                        }
                        Ok(None) => {}
                        Err(err) => {
                            yield Err(err);
                            return;
                        }
                    },
                }
            }
            if closed {
                return;
            }
        }
    })
}
