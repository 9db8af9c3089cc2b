use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::LLMError;
use crate::http::{DynHttpTransport, HttpRequest};
use crate::provider::vendor::VendorClient;
use crate::provider::{ChatStream, LLMProvider};
use crate::types::{ChatRequest, ChatResponse};

use super::error::parse_anthropic_error;
use super::request::build_anthropic_body;
use super::response::map_response;
use super::stream::create_stream;
use super::types::AnthropicMessage;

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const DEFAULT_VERSION: &str = "2023-06-01";
/// Messages API 要求 max_tokens 必填
const DEFAULT_MAX_TOKENS: u32 = 1000;

/// Anthropic Messages Provider（Claude 3.x Messages API）
pub struct AnthropicMessagesProvider {
    vendor: VendorClient,
    version: String,
}

impl AnthropicMessagesProvider {
    /// 使用默认 base_url 与 anthropic-version 创建 Provider
    pub fn new(transport: DynHttpTransport, api_key: impl Into<String>) -> Self {
        Self {
            vendor: VendorClient::new(
                "anthropic_messages",
                transport,
                DEFAULT_BASE_URL,
                api_key.into(),
            ),
            version: DEFAULT_VERSION.to_string(),
        }
    }

    /// 自定义 base_url，便于接入代理或测试桩
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.vendor.base_url = base_url.into();
        self
    }

    /// 自定义 anthropic-version
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn with_default_model(mut self, model: impl Into<String>) -> Self {
        self.vendor.default_model = Some(model.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.vendor.timeout = timeout;
        self
    }

    pub(crate) fn endpoint(&self) -> String {
        self.vendor.url("v1", "messages")
    }

    fn build_headers(&self) -> HashMap<String, String> {
        HashMap::from([
            ("x-api-key".to_string(), self.vendor.api_key.clone()),
            ("anthropic-version".to_string(), self.version.clone()),
        ])
    }

    fn http_request(&self, request: &ChatRequest, stream: bool) -> Result<HttpRequest, LLMError> {
        let model = self.vendor.model(request)?;
        let body = match request.options.max_output_tokens {
            Some(_) => build_anthropic_body(request, &model, stream)?,
            None => {
                let mut request = request.clone();
                request.options.max_output_tokens = Some(DEFAULT_MAX_TOKENS);
                build_anthropic_body(&request, &model, stream)?
            }
        };
        self.vendor
            .request(self.endpoint(), &body, self.build_headers(), stream)
    }
}

#[async_trait]
impl LLMProvider for AnthropicMessagesProvider {
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, LLMError> {
        let message: AnthropicMessage = self
            .vendor
            .fetch(self.http_request(&request, false)?, parse_anthropic_error)
            .await?;
        map_response(message, self.name(), self.endpoint())
    }

    async fn stream_chat(&self, request: ChatRequest) -> Result<ChatStream, LLMError> {
        let body = self
            .vendor
            .open_stream(self.http_request(&request, true)?, parse_anthropic_error)
            .await?;
        Ok(create_stream(body, self.name()))
    }

    fn name(&self) -> &'static str {
        self.vendor.provider
    }
}
