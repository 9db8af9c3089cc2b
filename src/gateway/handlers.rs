use std::any::Any;
use std::convert::Infallible;
use std::panic::AssertUnwindSafe;

use async_stream::stream;
use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::{HeaderMap, HeaderValue, header};
use axum::response::sse::Sse;
use axum::response::{IntoResponse, Response};
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{error, info, warn};

use crate::adapter::{DEFAULT_LANGUAGE, SessionScope};
use crate::provider::ProviderKind;
use crate::types::Message;

use super::{
    AppState, GatewayError, SESSION_HEADER, id_headers, request_id, sse, wants_cancel_previous,
};

#[derive(Debug, Deserialize)]
pub(crate) struct ChatBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    model: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct VoiceChatBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    language: Option<String>,
}

#[derive(Debug, Serialize)]
struct VoiceChatReply {
    success: bool,
    response: String,
    language: String,
}

#[derive(Debug, Serialize)]
struct RelatedQuestionsReply {
    success: bool,
    questions: Vec<String>,
}

pub(crate) async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// `POST /chat`: streams the reply as SSE and always finishes with `data: [DONE]`.
pub(crate) async fn chat(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<ChatBody>, JsonRejection>,
) -> Result<Response, GatewayError> {
    let session_id = state
        .sessions
        .resolve(super::header(&headers, SESSION_HEADER));
    let Json(body) = body?;
    let message = body.message.trim();
    if message.is_empty() {
        return Err(GatewayError::no_message());
    }

    if wants_cancel_previous(&headers) {
        state.sessions.cancel_current(&session_id);
    }
    let model = state.model_for(body.model.as_deref());
    let ticket = state
        .sessions
        .begin_request(&session_id, request_id(&headers));
    info!(session_id = %session_id, request_id = %ticket.request_id, model = %model, "chat request");

    let replies = state.adapter.generate_response(
        vec![Message::user(message)],
        &model,
        Some(SessionScope::request(&session_id, &ticket.request_id)),
        ticket.token.clone(),
    );
    let sessions = state.sessions.clone();
    let token = ticket.token.clone();
    let stream_session = session_id.clone();
    let request_id = ticket.request_id.clone();
    let events = stream! {
        let mut replies = AssertUnwindSafe(replies).catch_unwind();
        while let Some(item) = replies.next().await {
            if token.is_cancelled() {
                info!(request_id = %request_id, "request was cancelled");
                break;
            }
            if !sessions.is_current(&stream_session, &request_id) {
                info!(request_id = %request_id, "request was superseded");
                break;
            }
            match item {
                Ok(chunk) if chunk.is_empty() => {}
                Ok(chunk) => yield Ok::<_, Infallible>(sse::chunk_event(&chunk)),
                Err(panic) => {
                    let message = panic_message(panic.as_ref());
                    error!(request_id = %request_id, error = %message, "error generating response");
                    yield Ok(sse::error_event(&message));
                    break;
                }
            }
        }
        yield Ok(sse::done_event());
    };

    let mut response_headers = id_headers(&session_id, Some(&ticket.request_id));
    response_headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    response_headers.insert("x-accel-buffering", HeaderValue::from_static("no"));
    Ok((response_headers, Sse::new(events)).into_response())
}

/// `POST /voice-chat`: collects the full reply in the requested language.
pub(crate) async fn voice_chat(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<VoiceChatBody>, JsonRejection>,
) -> Result<Response, GatewayError> {
    let session_id = state
        .sessions
        .resolve(super::header(&headers, SESSION_HEADER));
    let Json(body) = body?;
    let message = body.message.trim();
    if message.is_empty() {
        warn!(session_id = %session_id, "empty voice message");
        return Err(GatewayError::no_message());
    }
    let language = body
        .language
        .as_deref()
        .map(str::trim)
        .filter(|language| !language.is_empty())
        .unwrap_or(DEFAULT_LANGUAGE)
        .to_string();
    let model = state.model_for(body.model.as_deref());
    ProviderKind::from_model(&model)?;

    let ticket = state
        .sessions
        .begin_request(&session_id, request_id(&headers));
    info!(session_id = %session_id, request_id = %ticket.request_id, model = %model, language = %language, "voice request");

    let messages = vec![
        Message::system(voice_system_prompt(&language)),
        Message::user(message),
    ];
    let reply = state
        .adapter
        .complete_text(
            messages,
            &model,
            Some(SessionScope::request(&session_id, &ticket.request_id)),
            ticket.token.clone(),
        )
        .await
        .inspect_err(|err| error!(error = %err, "model error"))?;
    let Some(response) = reply else {
        warn!(request_id = %ticket.request_id, "request was superseded");
        return Err(GatewayError::Superseded);
    };
    if response.is_empty() {
        return Err(GatewayError::EmptyResponse);
    }

    info!(request_id = %ticket.request_id, "voice response generated");
    let reply = VoiceChatReply {
        success: true,
        response,
        language,
    };
    Ok((id_headers(&session_id, Some(&ticket.request_id)), Json(reply)).into_response())
}

/// `POST /related-questions`: up to three follow-up questions, empty on provider failure.
pub(crate) async fn related_questions(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<ChatBody>, JsonRejection>,
) -> Result<Response, GatewayError> {
    let session_id = state
        .sessions
        .resolve(super::header(&headers, SESSION_HEADER));
    let Json(body) = body?;
    let message = body.message.trim();
    if message.is_empty() {
        return Err(GatewayError::no_message());
    }
    let model = state.model_for(body.model.as_deref());
    ProviderKind::from_model(&model)?;

    let questions = state
        .adapter
        .generate_related_questions(message, &model)
        .await;
    let reply = RelatedQuestionsReply {
        success: true,
        questions,
    };
    Ok((id_headers(&session_id, None), Json(reply)).into_response())
}

fn voice_system_prompt(language: &str) -> String {
    format!(
        "You are a helpful assistant. Respond in {language}. \
         If the user speaks in Hindi, respond in Hindi. \
         If they speak in English, respond in English. \
         Maintain the same language and style as the user's input. \
         Keep responses natural and conversational in the detected language."
    )
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|message| message.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "generation task panicked".to_string())
}
