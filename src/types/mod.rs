//! Shared data structures modeling chat requests and responses.
//!
//! These types normalize provider-specific payloads so the gateway can stay agnostic
//! of individual vendor API differences.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Conversation role attached to every [`Message`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    /// Wire name shared by every chat-completion style vendor.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// Normalized chat message shared across providers.
///
/// # Examples
///
/// ```
/// # use vaani_gateway::types::{Message, Role};
/// let msg = Message::user("Hola");
/// assert_eq!(msg.role, Role::User);
/// assert_eq!(msg.content, "Hola");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Role associated with this message.
    pub role: Role,
    /// Plain text content.
    pub content: String,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// Unified chat request accepted by every [`crate::provider::LLMProvider`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    /// Ordered list of messages to send.
    pub messages: Vec<Message>,
    /// Fine-grained chat options.
    #[serde(default)]
    pub options: ChatOptions,
}

impl ChatRequest {
    /// Builds a request for `model` with default options otherwise.
    pub fn new(messages: Vec<Message>, model: impl Into<String>) -> Self {
        Self {
            messages,
            options: ChatOptions {
                model: Some(model.into()),
                ..ChatOptions::default()
            },
        }
    }
}

/// Tunable chat options supported across providers.
///
/// Every field is optional so callers can only set knobs they care about. Providers
/// fall back to their documented defaults for unset values.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ChatOptions {
    /// Model identifier sent upstream.
    pub model: Option<String>,
    /// Sampling temperature, typically within `0.0..=2.0`.
    pub temperature: Option<f32>,
    /// Maximum number of output tokens returned by the provider.
    pub max_output_tokens: Option<u32>,
}

/// Full (non-streamed) provider answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    /// Concatenated assistant text.
    pub text: String,
    /// Token usage accounting.
    pub usage: Option<TokenUsage>,
    /// Why the response stopped.
    pub finish_reason: Option<FinishReason>,
    /// Effective model identifier reported by the provider.
    pub model: Option<String>,
    /// Metadata about the provider invocation.
    pub provider: ProviderMetadata,
}

/// Streaming chunk representing incremental response data.
///
/// Providers emit chunks until `is_terminal` becomes `true` or the body ends.
/// Chunks that only carry usage or a finish reason have an empty `text`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatChunk {
    /// Text appended by this chunk.
    pub text: String,
    /// Optional real-time token usage updates.
    pub usage: Option<TokenUsage>,
    /// Why the response stopped, when reported in this chunk.
    pub finish_reason: Option<FinishReason>,
    /// Indicates whether this is the terminal chunk.
    pub is_terminal: bool,
}

impl ChatChunk {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            usage: None,
            finish_reason: None,
            is_terminal: false,
        }
    }

    pub fn terminal() -> Self {
        Self {
            text: String::new(),
            usage: None,
            finish_reason: None,
            is_terminal: true,
        }
    }
}

/// Token usage metrics collected from the provider.
///
/// # Examples
///
/// ```
/// # use vaani_gateway::types::TokenUsage;
/// let usage = TokenUsage {
///     prompt_tokens: Some(1200),
///     completion_tokens: Some(200),
///     total_tokens: Some(1400),
/// };
/// assert_eq!(usage.total_tokens, Some(1400));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct TokenUsage {
    pub prompt_tokens: Option<u64>,
    pub completion_tokens: Option<u64>,
    /// Total tokens across prompt and completion.
    pub total_tokens: Option<u64>,
}

/// Why a chat response stopped generating content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    Length,
    ContentFilter,
    Other(String),
}

/// Provider metadata returned with each response.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ProviderMetadata {
    /// Provider identifier such as `openai_chat`.
    pub provider: String,
    /// Upstream request identifier.
    pub request_id: Option<String>,
    /// Endpoint URL the request was sent to.
    pub endpoint: Option<String>,
    /// Raw response excerpt for debugging.
    pub raw: Option<Value>,
}
