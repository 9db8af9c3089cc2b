//! Turns a normalized message list into vendor calls and normalized text chunks.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_stream::stream;
use futures_core::Stream;
use futures_util::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::client::LLMClient;
use crate::error::LLMError;
use crate::provider::ProviderKind;
use crate::session::SessionStore;
use crate::types::{ChatOptions, ChatRequest, Message, Role};

/// Fallible text chunks; ends early on cancellation.
pub type TextStream = Pin<Box<dyn Stream<Item = Result<String, LLMError>> + Send>>;

/// Infallible text chunks; errors arrive as one apology chunk.
pub type ReplyStream = Pin<Box<dyn Stream<Item = String> + Send>>;

pub const DEFAULT_LANGUAGE: &str = "en-US";
const LANGUAGE_MARKER: &str = "Respond in";

/// 生成所属的会话，以及可选的请求 id
///
/// With a request id the generation stops once another request takes over the session, and
/// its exchange is remembered only while the request is still current.
#[derive(Debug, Clone, Copy)]
pub struct SessionScope<'a> {
    pub session_id: &'a str,
    pub request_id: Option<&'a str>,
}

impl<'a> SessionScope<'a> {
    /// Memory of `session_id` without a supersession check.
    pub fn session(session_id: &'a str) -> Self {
        Self {
            session_id,
            request_id: None,
        }
    }

    pub fn request(session_id: &'a str, request_id: &'a str) -> Self {
        Self {
            session_id,
            request_id: Some(request_id),
        }
    }
}

#[derive(Debug, Clone)]
struct OwnedScope {
    session_id: String,
    request_id: Option<String>,
}

impl From<SessionScope<'_>> for OwnedScope {
    fn from(scope: SessionScope<'_>) -> Self {
        Self {
            session_id: scope.session_id.to_string(),
            request_id: scope.request_id.map(str::to_string),
        }
    }
}

enum Generated {
    Text(String),
    /// The vendor stream completed; carries the user turn to remember.
    Finished(String),
}

type GenerationStream = Pin<Box<dyn Stream<Item = Result<Generated, LLMError>> + Send>>;

/// 调用供应商并归一化输出
#[derive(Clone)]
pub struct ProviderAdapter {
    client: LLMClient,
    sessions: Arc<SessionStore>,
    memory_turns: usize,
    max_output_tokens: Option<u32>,
}

impl ProviderAdapter {
    pub fn new(client: LLMClient, sessions: Arc<SessionStore>) -> Self {
        Self {
            client,
            sessions,
            memory_turns: 4,
            max_output_tokens: None,
        }
    }

    /// 每次请求最多携带的历史消息条数
    pub fn with_memory_turns(mut self, memory_turns: usize) -> Self {
        self.memory_turns = memory_turns;
        self
    }

    /// 输出上限；`None` 时使用各供应商自身的默认值
    pub fn with_max_output_tokens(mut self, max_output_tokens: Option<u32>) -> Self {
        self.max_output_tokens = max_output_tokens;
        self
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    /// Streams the reply for `messages` as fallible text chunks.
    ///
    /// The provider call and every chunk are raced against `cancel`; once it fires the
    /// vendor stream is dropped, which aborts the HTTP request, and the sequence ends
    /// without an error. A superseded request ends the same way. With a `scope`, the
    /// exchange is added to the session memory only when the vendor stream completes.
    pub fn stream_text(
        &self,
        messages: Vec<Message>,
        model: &str,
        scope: Option<SessionScope<'_>>,
        cancel: CancellationToken,
    ) -> TextStream {
        let this = self.clone();
        let scope = scope.map(OwnedScope::from);
        let mut generation = self.generate(messages, model, scope.clone(), cancel);

        Box::pin(stream! {
            let mut reply = String::new();
            while let Some(item) = generation.next().await {
                match item {
                    Ok(Generated::Text(text)) => {
                        reply.push_str(&text);
                        yield Ok(text);
                    }
                    Ok(Generated::Finished(user_turn)) => {
                        this.commit(scope.as_ref(), &user_turn, &reply);
                    }
                    Err(err) => {
                        yield Err(err);
                        return;
                    }
                }
            }
        })
    }

    /// Collects the whole reply.
    ///
    /// `Ok(None)` means the generation was cancelled or superseded before its reply was
    /// committed to the session.
    pub async fn complete_text(
        &self,
        messages: Vec<Message>,
        model: &str,
        scope: Option<SessionScope<'_>>,
        cancel: CancellationToken,
    ) -> Result<Option<String>, LLMError> {
        let scope = scope.map(OwnedScope::from);
        let mut generation = self.generate(messages, model, scope.clone(), cancel);
        let mut reply = String::new();
        while let Some(item) = generation.next().await {
            match item? {
                Generated::Text(text) => reply.push_str(&text),
                Generated::Finished(user_turn) => {
                    let committed = self.commit(scope.as_ref(), &user_turn, &reply);
                    return Ok(committed.then_some(reply));
                }
            }
        }
        Ok(None)
    }

    /// Same as [`ProviderAdapter::stream_text`] but never fails: the first error is
    /// replaced by an apology chunk and the stream then ends normally.
    pub fn generate_response(
        &self,
        messages: Vec<Message>,
        model: &str,
        scope: Option<SessionScope<'_>>,
        cancel: CancellationToken,
    ) -> ReplyStream {
        let mut inner = self.stream_text(messages, model, scope, cancel);
        Box::pin(stream! {
            while let Some(item) = inner.next().await {
                match item {
                    Ok(text) => yield text,
                    Err(err) => {
                        warn!(error = %err, "generation failed");
                        yield apology(&err);
                        break;
                    }
                }
            }
        })
    }

    /// Runs one vendor call. Ends without [`Generated::Finished`] when cancelled or
    /// superseded.
    fn generate(
        &self,
        messages: Vec<Message>,
        model: &str,
        scope: Option<OwnedScope>,
        cancel: CancellationToken,
    ) -> GenerationStream {
        let this = self.clone();
        let model = model.to_string();

        Box::pin(stream! {
            let (kind, provider) = match this.client.resolve(&model) {
                Ok(resolved) => resolved,
                Err(err) => {
                    yield Err(err);
                    return;
                }
            };

            let user_turn = messages
                .iter()
                .rev()
                .find(|message| message.role == Role::User)
                .map(|message| message.content.clone())
                .unwrap_or_default();
            let history = scope
                .as_ref()
                .map(|scope| this.sessions.recent_turns(&scope.session_id, this.memory_turns))
                .unwrap_or_default();
            let request = this.build_request(kind, &model, messages, history);
            info!(
                session_id = scope.as_ref().map_or("-", |scope| scope.session_id.as_str()),
                model = %model,
                provider = %kind,
                "generating response"
            );

            let mut chunks = match until_cancelled(&cancel, provider.stream_chat(request)).await {
                None => {
                    debug!(model = %model, "cancelled before the vendor responded");
                    return;
                }
                Some(Err(err)) => {
                    yield Err(err);
                    return;
                }
                Some(Ok(chunks)) => chunks,
            };

            loop {
                match until_cancelled(&cancel, chunks.next()).await {
                    None => {
                        info!(model = %model, "generation cancelled");
                        return;
                    }
                    Some(None) => break,
                    Some(Some(Err(err))) => {
                        yield Err(err);
                        return;
                    }
                    Some(Some(Ok(chunk))) => {
                        if chunk.is_terminal {
                            break;
                        }
                        if chunk.text.is_empty() {
                            continue;
                        }
                        if this.is_superseded(scope.as_ref()) {
                            info!(model = %model, "generation superseded");
                            return;
                        }
                        yield Ok(Generated::Text(chunk.text));
                    }
                }
            }
            yield Ok(Generated::Finished(user_turn));
        })
    }

    fn is_superseded(&self, scope: Option<&OwnedScope>) -> bool {
        scope.is_some_and(|scope| {
            scope.request_id.as_deref().is_some_and(|request_id| {
                !self.sessions.is_current(&scope.session_id, request_id)
            })
        })
    }

    /// 写入会话记忆；返回请求是否仍然有效
    fn commit(&self, scope: Option<&OwnedScope>, user_turn: &str, reply: &str) -> bool {
        let Some(scope) = scope else {
            return true;
        };
        match scope.request_id.as_deref() {
            Some(request_id) if reply.is_empty() => {
                self.sessions.is_current(&scope.session_id, request_id)
            }
            Some(request_id) => {
                self.sessions
                    .record_if_current(&scope.session_id, request_id, user_turn, reply)
            }
            None => {
                if !reply.is_empty() {
                    self.sessions
                        .record_exchange(&scope.session_id, user_turn, reply);
                }
                true
            }
        }
    }

    /// Asks the model for up to three follow-up questions. Any failure yields an empty list.
    pub async fn generate_related_questions(&self, message: &str, model: &str) -> Vec<String> {
        let provider = match self.client.resolve(model) {
            Ok((_, provider)) => provider,
            Err(err) => {
                warn!(model, error = %err, "related questions unavailable");
                return Vec::new();
            }
        };

        let request = ChatRequest {
            messages: vec![Message::user(related_questions_prompt(message))],
            options: self.options(model),
        };
        match provider.chat(request).await {
            Ok(response) => parse_questions(&response.text),
            Err(err) => {
                warn!(model, error = %err, "error generating related questions");
                Vec::new()
            }
        }
    }

    fn options(&self, model: &str) -> ChatOptions {
        ChatOptions {
            model: Some(model.to_string()),
            max_output_tokens: self.max_output_tokens,
            ..ChatOptions::default()
        }
    }

    fn build_request(
        &self,
        kind: ProviderKind,
        model: &str,
        messages: Vec<Message>,
        history: Vec<Message>,
    ) -> ChatRequest {
        let language = extract_language(&messages);
        let messages = if kind.uses_single_prompt() {
            let last = messages
                .last()
                .map(|message| message.content.as_str())
                .unwrap_or_default();
            vec![Message::user(single_prompt(&language, &history, last))]
        } else {
            let mut outgoing = Vec::with_capacity(history.len() + messages.len() + 1);
            outgoing.push(Message::system(chat_directive(&language)));
            outgoing.extend(history);
            outgoing.extend(messages);
            outgoing
        };
        ChatRequest {
            messages,
            options: self.options(model),
        }
    }
}

async fn until_cancelled<F: Future>(cancel: &CancellationToken, fut: F) -> Option<F::Output> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        output = fut => Some(output),
    }
}

pub fn apology(err: &LLMError) -> String {
    format!("I apologize, but I encountered an error: {err}")
}

/// Language requested by the first system message containing `Respond in`.
///
/// The language is the text after the marker up to the next period. Defaults to `en-US`.
///
/// # Examples
///
/// ```
/// use vaani_gateway::adapter::extract_language;
/// use vaani_gateway::types::Message;
///
/// let messages = [Message::system("You are helpful. Respond in hi-IN. Be brief.")];
/// assert_eq!(extract_language(&messages), "hi-IN");
/// assert_eq!(extract_language(&[Message::user("Respond in fr.")]), "en-US");
/// ```
pub fn extract_language(messages: &[Message]) -> String {
    messages
        .iter()
        .filter(|message| message.role == Role::System)
        .find_map(|message| {
            let (_, rest) = message.content.split_once(LANGUAGE_MARKER)?;
            let language = rest.split('.').next().unwrap_or_default().trim();
            (!language.is_empty()).then(|| language.to_string())
        })
        .unwrap_or_else(|| DEFAULT_LANGUAGE.to_string())
}

pub fn is_hindi(language: &str) -> bool {
    let lower = language.to_ascii_lowercase();
    lower == "hi" || lower.starts_with("hi-") || lower.contains("hindi")
}

/// System message prepended for chat-completion style vendors.
pub fn chat_directive(language: &str) -> String {
    format!(
        "You must respond in {language}. If the user speaks in Hindi, respond in Hindi using \
         Devanagari script. Maintain consistent language throughout."
    )
}

/// Free-text prompt for vendors that take a single prompt.
pub fn single_prompt(language: &str, history: &[Message], last: &str) -> String {
    let mut prompt = format!(
        "You must respond in {language}. Maintain the same language throughout the response. "
    );
    if is_hindi(language) {
        prompt.push_str("Use Hindi script (Devanagari) for Hindi responses. ");
    }
    for turn in history {
        match turn.role {
            Role::User => prompt.push_str(&format!("\nUser: {}", turn.content)),
            Role::Assistant => prompt.push_str(&format!("\nAssistant: {}", turn.content)),
            Role::System => {}
        }
    }
    prompt.push_str(&format!("\nUser: {last}\nAssistant:"));
    prompt
}

pub fn related_questions_prompt(message: &str) -> String {
    format!(
        "Based on this message: '{message}', generate 3 related follow-up questions. \
         Return them as a simple array of strings."
    )
}

/// Keeps the first three non-empty trimmed lines that do not start with `[` or `]`.
pub fn parse_questions(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('[') && !line.starts_with(']'))
        .take(3)
        .map(str::to_string)
        .collect()
}
