use std::fmt;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use futures_core::Stream;
use serde::{Deserialize, Serialize};

use crate::error::LLMError;
use crate::types::{ChatChunk, ChatRequest, ChatResponse};

pub mod anthropic_messages;
pub mod google_gemini;
pub mod openai_chat;
pub(crate) mod vendor;

/// 流式响应别名
pub type ChatStream = Pin<Box<dyn Stream<Item = Result<ChatChunk, LLMError>> + Send>>;

/// 统一的 Provider Trait 所有供应商实现该接口即可接入
#[async_trait]
pub trait LLMProvider: Send + Sync {
    /// 提交完整请求并等待完整响应
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, LLMError>;

    /// 以流式方式返回增量事件
    async fn stream_chat(&self, request: ChatRequest) -> Result<ChatStream, LLMError>;

    /// 供应商名称
    fn name(&self) -> &'static str;
}

/// 线程安全 Provider
pub type DynProvider = Arc<dyn LLMProvider>;

/// Vendors reachable through the gateway.
///
/// Resolved once per request from the model identifier, see [`ProviderKind::from_model`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    Gemini,
    OpenAi,
    Anthropic,
    Fireworks,
    Groq,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 5] = [
        ProviderKind::Gemini,
        ProviderKind::OpenAi,
        ProviderKind::Anthropic,
        ProviderKind::Fireworks,
        ProviderKind::Groq,
    ];

    /// Selects the vendor from the model identifier prefix.
    ///
    /// # Examples
    ///
    /// ```
    /// use vaani_gateway::provider::ProviderKind;
    ///
    /// assert_eq!(ProviderKind::from_model("gpt-3.5-turbo").unwrap(), ProviderKind::OpenAi);
    /// assert!(ProviderKind::from_model("unknown-model").is_err());
    /// ```
    pub fn from_model(model: &str) -> Result<Self, LLMError> {
        Self::ALL
            .into_iter()
            .find(|kind| model.starts_with(kind.model_prefix()))
            .ok_or_else(|| LLMError::UnsupportedModel {
                model: model.to_string(),
            })
    }

    pub fn model_prefix(&self) -> &'static str {
        match self {
            ProviderKind::Gemini => "gemini",
            ProviderKind::OpenAi => "gpt",
            ProviderKind::Anthropic => "claude",
            ProviderKind::Fireworks => "fireworks",
            ProviderKind::Groq => "groq",
        }
    }

    /// Gemini only accepts a single assembled prompt; the others take a message list.
    pub fn uses_single_prompt(&self) -> bool {
        matches!(self, ProviderKind::Gemini)
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ProviderKind::Gemini => "gemini",
            ProviderKind::OpenAi => "openai",
            ProviderKind::Anthropic => "anthropic",
            ProviderKind::Fireworks => "fireworks",
            ProviderKind::Groq => "groq",
        })
    }
}
