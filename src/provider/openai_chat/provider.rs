use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::LLMError;
use crate::http::{DynHttpTransport, HttpRequest};
use crate::provider::vendor::VendorClient;
use crate::provider::{ChatStream, LLMProvider};
use crate::types::{ChatRequest, ChatResponse};

use super::error::parse_openai_error;
use super::request::build_openai_body;
use super::response::map_response;
use super::stream::create_stream;
use super::types::OpenAiCompletion;

const OPENAI_BASE_URL: &str = "https://api.openai.com";
const FIREWORKS_BASE_URL: &str = "https://api.fireworks.ai/inference";
const GROQ_BASE_URL: &str = "https://api.groq.com/openai";

/// OpenAI Chat Completions Provider；Fireworks、Groq 走同一协议，仅 base_url 与名称不同
pub struct OpenAiChatProvider {
    vendor: VendorClient,
}

impl OpenAiChatProvider {
    /// 创建指向 OpenAI 官方接口的 Provider
    pub fn new(transport: DynHttpTransport, api_key: impl Into<String>) -> Self {
        Self::compatible("openai_chat", OPENAI_BASE_URL, transport, api_key)
    }

    pub fn fireworks(transport: DynHttpTransport, api_key: impl Into<String>) -> Self {
        Self::compatible("fireworks", FIREWORKS_BASE_URL, transport, api_key)
    }

    pub fn groq(transport: DynHttpTransport, api_key: impl Into<String>) -> Self {
        Self::compatible("groq", GROQ_BASE_URL, transport, api_key)
    }

    fn compatible(
        name: &'static str,
        base_url: &str,
        transport: DynHttpTransport,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            vendor: VendorClient::new(name, transport, base_url, api_key.into()),
        }
    }

    /// 自定义 base_url
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.vendor.base_url = base_url.into();
        self
    }

    pub fn with_default_model(mut self, model: impl Into<String>) -> Self {
        self.vendor.default_model = Some(model.into());
        self
    }

    /// 单次请求超时
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.vendor.timeout = timeout;
        self
    }

    pub(crate) fn endpoint(&self) -> String {
        self.vendor.url("v1", "chat/completions")
    }

    fn http_request(&self, request: &ChatRequest, stream: bool) -> Result<HttpRequest, LLMError> {
        let model = self.vendor.model(request)?;
        let body = build_openai_body(request, &model, stream)?;
        let headers = HashMap::from([(
            "Authorization".to_string(),
            format!("Bearer {}", self.vendor.api_key),
        )]);
        self.vendor.request(self.endpoint(), &body, headers, stream)
    }

    fn parse_error(&self) -> impl FnOnce(u16, &str, Option<Duration>) -> LLMError {
        let name = self.vendor.provider;
        move |status, body, retry_after| parse_openai_error(name, status, body, retry_after)
    }
}

#[async_trait]
impl LLMProvider for OpenAiChatProvider {
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, LLMError> {
        let completion: OpenAiCompletion = self
            .vendor
            .fetch(self.http_request(&request, false)?, self.parse_error())
            .await?;
        map_response(completion, self.name(), self.endpoint())
    }

    async fn stream_chat(&self, request: ChatRequest) -> Result<ChatStream, LLMError> {
        let body = self
            .vendor
            .open_stream(self.http_request(&request, true)?, self.parse_error())
            .await?;
        Ok(create_stream(body, self.name()))
    }

    fn name(&self) -> &'static str {
        self.vendor.provider
    }
}
