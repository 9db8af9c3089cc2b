use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::LLMError;
use crate::http::{DynHttpTransport, HttpRequest};
use crate::provider::vendor::VendorClient;
use crate::provider::{ChatStream, LLMProvider};
use crate::types::{ChatRequest, ChatResponse};

use super::error::parse_gemini_error;
use super::request::build_gemini_body;
use super::response::map_response;
use super::stream::create_stream;
use super::types::GeminiReply;

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
const API_VERSION: &str = "v1beta";

/// Google Gemini GenerateContent provider implementation.
///
/// The API key travels in `x-goog-api-key` rather than the `key` query parameter so it
/// never shows up in logged URLs.
pub struct GoogleGeminiProvider {
    vendor: VendorClient,
}

impl GoogleGeminiProvider {
    pub fn new(transport: DynHttpTransport, api_key: impl Into<String>) -> Self {
        Self {
            vendor: VendorClient::new("google_gemini", transport, DEFAULT_BASE_URL, api_key.into()),
        }
    }

    /// Overrides the base URL, e.g. to point at a proxy or a test double.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.vendor.base_url = base_url.into();
        self
    }

    /// Model used when the request names none, such as `gemini-pro`.
    pub fn with_default_model(mut self, model: impl Into<String>) -> Self {
        self.vendor.default_model = Some(model.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.vendor.timeout = timeout;
        self
    }

    pub(crate) fn endpoint(&self, model: &str) -> String {
        self.vendor
            .url(API_VERSION, &format!("{}:generateContent", model_path(model)))
    }

    pub(crate) fn stream_endpoint(&self, model: &str) -> String {
        self.vendor.url(
            API_VERSION,
            &format!("{}:streamGenerateContent?alt=sse", model_path(model)),
        )
    }

    fn build_headers(&self) -> HashMap<String, String> {
        HashMap::from([("x-goog-api-key".to_string(), self.vendor.api_key.clone())])
    }

    fn http_request(
        &self,
        url: String,
        request: &ChatRequest,
        stream: bool,
    ) -> Result<HttpRequest, LLMError> {
        let body = build_gemini_body(request)?;
        self.vendor.request(url, &body, self.build_headers(), stream)
    }
}

/// `gemini-pro` and `models/gemini-pro` address the same resource.
fn model_path(model: &str) -> String {
    if model.starts_with("models/") {
        model.to_string()
    } else {
        format!("models/{model}")
    }
}

#[async_trait]
impl LLMProvider for GoogleGeminiProvider {
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, LLMError> {
        let endpoint = self.endpoint(&self.vendor.model(&request)?);
        let reply: GeminiReply = self
            .vendor
            .fetch(self.http_request(endpoint.clone(), &request, false)?, parse_gemini_error)
            .await?;
        map_response(reply, self.name(), endpoint)
    }

    async fn stream_chat(&self, request: ChatRequest) -> Result<ChatStream, LLMError> {
        let endpoint = self.stream_endpoint(&self.vendor.model(&request)?);
        let body = self
            .vendor
            .open_stream(self.http_request(endpoint, &request, true)?, parse_gemini_error)
            .await?;
        Ok(create_stream(body, self.name()))
    }

    fn name(&self) -> &'static str {
        self.vendor.provider
    }
}
