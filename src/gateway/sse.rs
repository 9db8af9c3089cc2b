//! `data:` framing for the `/chat` event stream.

use axum::response::sse::Event;

pub const DONE: &str = "[DONE]";

/// Frames one text chunk. Carriage returns are folded into line feeds, and each line of a
/// multi-line chunk becomes its own `data:` field.
pub fn chunk_event(chunk: &str) -> Event {
    Event::default().data(normalize_newlines(chunk))
}

pub fn error_event(message: &str) -> Event {
    chunk_event(&format!("Error: {message}"))
}

pub fn done_event() -> Event {
    Event::default().data(DONE)
}

fn normalize_newlines(chunk: &str) -> String {
    chunk.replace("\r\n", "\n").replace('\r', "\n")
}
