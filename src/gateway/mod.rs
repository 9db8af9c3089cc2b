//! HTTP surface: `/chat` (SSE), `/voice-chat`, `/related-questions` and `/health`.

use std::sync::Arc;

use axum::Router;
use axum::http::{HeaderMap, HeaderName, HeaderValue};
use axum::routing::{get, post};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::adapter::ProviderAdapter;
use crate::client::LLMClient;
use crate::config::GatewayConfig;
use crate::session::SessionStore;

mod error;
mod handlers;
pub mod sse;

pub use error::GatewayError;

pub const SESSION_HEADER: &str = "x-session-id";
pub const REQUEST_HEADER: &str = "x-request-id";
pub const CANCEL_PREVIOUS_HEADER: &str = "x-cancel-previous";

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub adapter: ProviderAdapter,
    pub sessions: Arc<SessionStore>,
    pub default_model: String,
}

impl AppState {
    pub fn new(adapter: ProviderAdapter, default_model: impl Into<String>) -> Self {
        Self {
            sessions: adapter.sessions().clone(),
            adapter,
            default_model: default_model.into(),
        }
    }

    pub fn from_config(config: &GatewayConfig, client: LLMClient) -> Self {
        let adapter = ProviderAdapter::new(client, Arc::new(SessionStore::new()))
            .with_memory_turns(config.memory_turns)
            .with_max_output_tokens(config.max_output_tokens);
        Self::new(adapter, config.default_model.clone())
    }

    /// Request model, or the configured default when absent or blank, after the remap.
    pub(crate) fn model_for(&self, requested: Option<&str>) -> String {
        let model = requested
            .map(str::trim)
            .filter(|model| !model.is_empty())
            .unwrap_or(self.default_model.as_str());
        remap_model(model).to_string()
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/chat", post(handlers::chat))
        .route("/voice-chat", post(handlers::voice_chat))
        .route("/related-questions", post(handlers::related_questions))
        .route("/health", get(handlers::health))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Substitutes premium model names with their economy counterparts.
///
/// # Examples
///
/// ```
/// use vaani_gateway::gateway::remap_model;
///
/// assert_eq!(remap_model("gpt-4"), "gpt-3.5-turbo");
/// assert_eq!(remap_model("gemini-pro"), "gemini-pro");
/// ```
pub fn remap_model(model: &str) -> &str {
    match model {
        "gpt-4" => "gpt-3.5-turbo",
        "claude-3-opus" => "claude-3-haiku",
        "llama-70b" => "llama-v2-7b",
        "mixtral-8x7b-instruct" => "mixtral-8x7b",
        other => other,
    }
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

fn wants_cancel_previous(headers: &HeaderMap) -> bool {
    header(headers, CANCEL_PREVIOUS_HEADER)
        .is_some_and(|value| value.trim().eq_ignore_ascii_case("true"))
}

fn request_id(headers: &HeaderMap) -> String {
    header(headers, REQUEST_HEADER)
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

/// Echoes the session and request ids so clients learn generated values.
fn id_headers(session_id: &str, request_id: Option<&str>) -> HeaderMap {
    let mut headers = HeaderMap::new();
    let pairs = [(SESSION_HEADER, Some(session_id)), (REQUEST_HEADER, request_id)];
    for (name, value) in pairs {
        if let Some(value) = value.and_then(|value| HeaderValue::from_str(value).ok()) {
            headers.insert(HeaderName::from_static(name), value);
        }
    }
    headers
}
