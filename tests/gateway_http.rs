use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::response::Response;
use http_body_util::BodyExt;
use parking_lot::Mutex;
use serde_json::{Value, json};
use tower::ServiceExt;
use vaani_gateway::provider::{ChatStream, DynProvider, LLMProvider, ProviderKind};
use vaani_gateway::{
    AppState, ChatChunk, ChatRequest, ChatResponse, LLMClient, LLMError, ProviderAdapter,
    ProviderMetadata, SessionStore, build_router,
};

const DONE_FRAME: &str = "data: [DONE]\n\n";

/// Plays back a fixed script and records every request it receives.
#[derive(Default)]
struct StubProvider {
    chunks: Vec<String>,
    reply: String,
    delay: Option<Duration>,
    failure: Option<String>,
    seen: Mutex<Vec<ChatRequest>>,
}

impl StubProvider {
    fn streaming(chunks: &[&str]) -> Self {
        Self {
            chunks: chunks.iter().map(|chunk| chunk.to_string()).collect(),
            ..Self::default()
        }
    }

    fn replying(reply: &str) -> Self {
        Self {
            reply: reply.to_string(),
            ..Self::default()
        }
    }

    fn failing(message: &str) -> Self {
        Self {
            failure: Some(message.to_string()),
            ..Self::default()
        }
    }

    fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    fn calls(&self) -> usize {
        self.seen.lock().len()
    }

    fn last_request(&self) -> ChatRequest {
        self.seen.lock().last().cloned().expect("provider was called")
    }

    fn check(&self, request: ChatRequest) -> Result<(), LLMError> {
        self.seen.lock().push(request);
        match &self.failure {
            Some(message) => Err(LLMError::Provider {
                provider: "stub",
                message: message.clone(),
            }),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl LLMProvider for StubProvider {
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, LLMError> {
        let model = request.options.model.clone();
        self.check(request)?;
        Ok(ChatResponse {
            text: self.reply.clone(),
            usage: None,
            finish_reason: None,
            model,
            provider: ProviderMetadata {
                provider: "stub".to_string(),
                request_id: None,
                endpoint: None,
                raw: None,
            },
        })
    }

    async fn stream_chat(&self, request: ChatRequest) -> Result<ChatStream, LLMError> {
        self.check(request)?;
        let chunks = self.chunks.clone();
        let delay = self.delay;
        Ok(Box::pin(async_stream::stream! {
            for text in chunks {
                if let Some(delay) = delay {
                    tokio::time::sleep(delay).await;
                }
                yield Ok(ChatChunk::text(text));
            }
            yield Ok(ChatChunk::terminal());
        }))
    }

    fn name(&self) -> &'static str {
        "stub"
    }
}

fn app(stub: &Arc<StubProvider>) -> Router {
    let provider: DynProvider = stub.clone();
    let client = ProviderKind::ALL
        .into_iter()
        .fold(LLMClient::builder(), |builder, kind| {
            builder.register(kind, provider.clone())
        })
        .build();
    let adapter = ProviderAdapter::new(client, Arc::new(SessionStore::new()));
    build_router(AppState::new(adapter, "gemini-pro"))
}

fn post(uri: &str, headers: &[(&str, &str)], body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json");
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    builder
        .body(Body::from(body.to_string()))
        .expect("request")
}

async fn send(app: &Router, request: Request<Body>) -> Response {
    app.clone().oneshot(request).await.expect("router is infallible")
}

async fn body_text(response: Response) -> String {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("body")
        .to_bytes();
    String::from_utf8(bytes.to_vec()).expect("utf-8 body")
}

async fn body_json(response: Response) -> Value {
    serde_json::from_str(&body_text(response).await).expect("json body")
}

fn header_value(response: &Response, name: &str) -> String {
    response
        .headers()
        .get(name)
        .and_then(|value| value.to_str().ok())
        .expect("header present")
        .to_string()
}

async fn next_data(body: &mut Body) -> Option<String> {
    loop {
        let frame = body.frame().await?.expect("frame");
        if let Ok(data) = frame.into_data() {
            return Some(String::from_utf8(data.to_vec()).expect("utf-8 frame"));
        }
    }
}

#[tokio::test]
async fn chat_streams_chunks_and_ends_with_done() {
    let stub = Arc::new(StubProvider::streaming(&["Hel", "lo"]));
    let app = app(&stub);

    let response = send(&app, post("/chat", &[], json!({ "message": "Hi", "model": "gpt-3.5-turbo" }))).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(header_value(&response, "content-type").starts_with("text/event-stream"));
    assert_eq!(header_value(&response, "cache-control"), "no-cache");
    assert!(header_value(&response, "x-session-id").starts_with("session_"));

    let body = body_text(response).await;
    assert_eq!(body, format!("data: Hel\n\ndata: lo\n\n{DONE_FRAME}"));
}

#[tokio::test]
async fn session_id_is_echoed_and_memory_is_replayed() {
    let stub = Arc::new(StubProvider::streaming(&["Hello there"]));
    let app = app(&stub);

    let first = send(&app, post("/chat", &[], json!({ "message": "Hi", "model": "gpt-3.5-turbo" }))).await;
    let session_id = header_value(&first, "x-session-id");
    body_text(first).await;

    let second = send(
        &app,
        post(
            "/chat",
            &[("x-session-id", &session_id), ("x-request-id", "req-2")],
            json!({ "message": "And again", "model": "gpt-3.5-turbo" }),
        ),
    )
    .await;
    assert_eq!(header_value(&second, "x-session-id"), session_id);
    assert_eq!(header_value(&second, "x-request-id"), "req-2");
    body_text(second).await;

    let request = stub.last_request();
    let contents: Vec<_> = request
        .messages
        .iter()
        .map(|message| message.content.as_str())
        .collect();
    assert_eq!(&contents[1..], ["Hi", "Hello there", "And again"]);
}

#[tokio::test]
async fn empty_message_is_rejected_before_any_provider_call() {
    let stub = Arc::new(StubProvider::streaming(&["unused"]));
    let app = app(&stub);

    for uri in ["/chat", "/voice-chat", "/related-questions"] {
        let response = send(&app, post(uri, &[], json!({ "message": "   " }))).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{uri}");
        let body = body_json(response).await;
        assert_eq!(body, json!({ "success": false, "detail": "No message provided" }));
    }
    assert_eq!(stub.calls(), 0);
}

#[tokio::test]
async fn malformed_json_is_a_bad_request() {
    let stub = Arc::new(StubProvider::streaming(&["unused"]));
    let app = app(&stub);

    let request = Request::builder()
        .method("POST")
        .uri("/chat")
        .header("content-type", "application/json")
        .body(Body::from("{not json"))
        .expect("request");
    let response = send(&app, request).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["success"], json!(false));
    assert_eq!(stub.calls(), 0);
}

#[tokio::test]
async fn provider_failure_becomes_apology_then_done() {
    let stub = Arc::new(StubProvider::failing("upstream exploded"));
    let app = app(&stub);

    let response = send(&app, post("/chat", &[], json!({ "message": "Hi", "model": "claude-3-haiku" }))).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_text(response).await;
    assert!(body.starts_with("data: I apologize, but I encountered an error: "));
    assert!(body.contains("upstream exploded"));
    assert!(body.ends_with(DONE_FRAME));
}

#[tokio::test]
async fn unknown_model_is_reported_on_every_endpoint() {
    let stub = Arc::new(StubProvider::streaming(&["unused"]));
    let app = app(&stub);
    let payload = json!({ "message": "Hi", "model": "unknown-model" });

    let chat = body_text(send(&app, post("/chat", &[], payload.clone())).await).await;
    assert_eq!(
        chat,
        format!(
            "data: I apologize, but I encountered an error: Unsupported model: unknown-model\n\n{DONE_FRAME}"
        )
    );

    for uri in ["/voice-chat", "/related-questions"] {
        let response = send(&app, post(uri, &[], payload.clone())).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR, "{uri}");
        let body = body_json(response).await;
        assert_eq!(body["success"], json!(false));
        assert_eq!(body["detail"], json!("Model error: Unsupported model: unknown-model"));
    }
    assert_eq!(stub.calls(), 0);
}

#[tokio::test]
async fn premium_models_are_remapped_before_dispatch() {
    let stub = Arc::new(StubProvider::streaming(&["ok"]));
    let app = app(&stub);

    body_text(send(&app, post("/chat", &[], json!({ "message": "Hi", "model": "gpt-4" }))).await).await;
    assert_eq!(stub.last_request().options.model.as_deref(), Some("gpt-3.5-turbo"));
}

#[tokio::test]
async fn default_model_uses_single_prompt() {
    let stub = Arc::new(StubProvider::streaming(&["ok"]));
    let app = app(&stub);

    body_text(send(&app, post("/chat", &[], json!({ "message": "Namaste" }))).await).await;
    let request = stub.last_request();
    assert_eq!(request.options.model.as_deref(), Some("gemini-pro"));
    assert_eq!(request.messages.len(), 1);
    assert!(request.messages[0].content.contains("Namaste"));
}

#[tokio::test]
async fn carriage_returns_never_reach_the_wire() {
    let stub = Arc::new(StubProvider::streaming(&["line one\r\nline two"]));
    let app = app(&stub);

    let body = body_text(send(&app, post("/chat", &[], json!({ "message": "Hi", "model": "gpt-3.5-turbo" }))).await).await;
    assert!(!body.contains('\r'));
    assert!(body.starts_with("data: line one\ndata: line two\n\n"));
    assert!(body.ends_with(DONE_FRAME));
}

#[tokio::test]
async fn cancel_previous_stops_the_running_stream() {
    let stub = Arc::new(
        StubProvider::streaming(&["c0", "c1", "c2", "c3"]).with_delay(Duration::from_millis(200)),
    );
    let app = app(&stub);
    let headers = [("x-session-id", "s-cancel")];

    let first = send(
        &app,
        post("/chat", &headers, json!({ "message": "long answer", "model": "gpt-3.5-turbo" })),
    )
    .await;
    let mut body = first.into_body();
    assert_eq!(next_data(&mut body).await.as_deref(), Some("data: c0\n\n"));

    let second = send(
        &app,
        post(
            "/chat",
            &[("x-session-id", "s-cancel"), ("x-cancel-previous", "true")],
            json!({ "message": "never mind", "model": "gpt-3.5-turbo" }),
        ),
    )
    .await;
    assert_eq!(second.status(), StatusCode::OK);

    let mut rest = String::new();
    while let Some(data) = next_data(&mut body).await {
        rest.push_str(&data);
    }
    assert_eq!(rest, DONE_FRAME);
}

#[tokio::test]
async fn newer_chat_supersedes_the_running_one_without_cancel_header() {
    let stub = Arc::new(
        StubProvider::streaming(&["c0", "c1", "c2"]).with_delay(Duration::from_millis(50)),
    );
    let app = app(&stub);
    let headers = [("x-session-id", "overlap")];

    let first = send(
        &app,
        post("/chat", &headers, json!({ "message": "first question", "model": "gpt-3.5-turbo" })),
    )
    .await;
    let mut first_body = first.into_body();
    assert_eq!(next_data(&mut first_body).await.as_deref(), Some("data: c0\n\n"));

    let second = send(
        &app,
        post("/chat", &headers, json!({ "message": "second question", "model": "gpt-3.5-turbo" })),
    )
    .await;
    assert_eq!(
        body_text(second).await,
        format!("data: c0\n\ndata: c1\n\ndata: c2\n\n{DONE_FRAME}")
    );

    let mut rest = String::new();
    while let Some(data) = next_data(&mut first_body).await {
        rest.push_str(&data);
    }
    assert_eq!(rest, DONE_FRAME);

    body_text(
        send(&app, post("/chat", &headers, json!({ "message": "third", "model": "gpt-3.5-turbo" }))).await,
    )
    .await;
    let contents: Vec<_> = stub
        .last_request()
        .messages
        .iter()
        .map(|message| message.content.clone())
        .collect();
    assert_eq!(&contents[1..], ["second question", "c0c1c2", "third"]);
}

#[tokio::test]
async fn voice_chat_returns_full_reply_in_language() {
    let stub = Arc::new(StubProvider::streaming(&["Hola", "! ¿Qué tal?"]));
    let app = app(&stub);

    let response = send(
        &app,
        post(
            "/voice-chat",
            &[("x-session-id", "voice-1")],
            json!({ "message": "Hola", "language": "es", "model": "gpt-3.5-turbo" }),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header_value(&response, "x-session-id"), "voice-1");
    let body = body_json(response).await;
    assert_eq!(
        body,
        json!({ "success": true, "response": "Hola! ¿Qué tal?", "language": "es" })
    );

    let request = stub.last_request();
    assert!(
        request
            .messages
            .iter()
            .any(|message| message.content.contains("Respond in es"))
    );
}

#[tokio::test]
async fn voice_chat_defaults_language() {
    let stub = Arc::new(StubProvider::streaming(&["Hi"]));
    let app = app(&stub);

    let body = body_json(
        send(&app, post("/voice-chat", &[], json!({ "message": "Hello", "model": "groq-llama" }))).await,
    )
    .await;
    assert_eq!(body["language"], json!("en-US"));
}

#[tokio::test]
async fn voice_chat_without_text_is_an_error() {
    let stub = Arc::new(StubProvider::streaming(&[]));
    let app = app(&stub);

    let response = send(&app, post("/voice-chat", &[], json!({ "message": "Hello", "model": "gpt-3.5-turbo" }))).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        body_json(response).await["detail"],
        json!("Model error: No response generated")
    );
}

#[tokio::test]
async fn superseded_voice_request_gets_conflict() {
    let stub = Arc::new(
        StubProvider::streaming(&["one", "two", "three"]).with_delay(Duration::from_millis(100)),
    );
    let app = app(&stub);

    let voice = tokio::spawn({
        let app = app.clone();
        async move {
            app.oneshot(post(
                "/voice-chat",
                &[("x-session-id", "busy")],
                json!({ "message": "Hello", "model": "gpt-3.5-turbo" }),
            ))
            .await
        }
    });
    tokio::time::sleep(Duration::from_millis(30)).await;

    let newer = send(
        &app,
        post("/chat", &[("x-session-id", "busy")], json!({ "message": "Newer", "model": "gpt-3.5-turbo" })),
    )
    .await;
    assert_eq!(newer.status(), StatusCode::OK);

    let response = voice.await.expect("join").expect("router is infallible");
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(
        body_json(response).await,
        json!({ "success": false, "detail": "Request superseded" })
    );
}

#[tokio::test]
async fn related_questions_are_capped_at_three() {
    let stub = Arc::new(StubProvider::replying("Q1?\nQ2?\nQ3?\nQ4?"));
    let app = app(&stub);

    let response = send(&app, post("/related-questions", &[], json!({ "message": "Tell me about Rust" }))).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(header_value(&response, "x-session-id").starts_with("session_"));
    let body = body_json(response).await;
    assert_eq!(body, json!({ "success": true, "questions": ["Q1?", "Q2?", "Q3?"] }));
}

#[tokio::test]
async fn related_questions_swallow_provider_failures() {
    let stub = Arc::new(StubProvider::failing("boom"));
    let app = app(&stub);

    let body = body_json(send(&app, post("/related-questions", &[], json!({ "message": "Hi" }))).await).await;
    assert_eq!(body, json!({ "success": true, "questions": [] }));
    assert_eq!(stub.calls(), 1);
}

#[tokio::test]
async fn health_and_cors() {
    let stub = Arc::new(StubProvider::default());
    let app = app(&stub);

    let response = send(
        &app,
        Request::builder()
            .uri("/health")
            .header("origin", "http://localhost:3000")
            .body(Body::empty())
            .expect("request"),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header_value(&response, "access-control-allow-origin"), "*");
    assert_eq!(body_json(response).await, json!({ "status": "ok" }));
}
