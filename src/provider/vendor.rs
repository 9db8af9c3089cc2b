//! Connection state shared by the HTTP-backed providers.

use std::collections::HashMap;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::LLMError;
use crate::http::{DynHttpTransport, HttpBodyStream, HttpRequest};
use crate::types::ChatRequest;

/// Transport, credentials and per-vendor defaults. Each provider owns one and adds its own
/// headers and wire format on top.
pub(crate) struct VendorClient {
    pub(crate) provider: &'static str,
    transport: DynHttpTransport,
    pub(crate) base_url: String,
    pub(crate) api_key: String,
    pub(crate) default_model: Option<String>,
    pub(crate) timeout: Option<Duration>,
}

impl VendorClient {
    pub(crate) fn new(
        provider: &'static str,
        transport: DynHttpTransport,
        base_url: &str,
        api_key: String,
    ) -> Self {
        Self {
            provider,
            transport,
            base_url: base_url.to_string(),
            api_key,
            default_model: None,
            timeout: None,
        }
    }

    /// Joins `path` onto the base URL and inserts the API `version` segment unless the
    /// configured base already ends with it.
    pub(crate) fn url(&self, version: &str, path: &str) -> String {
        let base = self.base_url.trim_end_matches('/');
        let versioned = base
            .rsplit_once('/')
            .is_some_and(|(_, last)| last == version);
        if versioned {
            format!("{base}/{path}")
        } else {
            format!("{base}/{version}/{path}")
        }
    }

    /// 请求未指定模型时回退到默认模型
    pub(crate) fn model(&self, request: &ChatRequest) -> Result<String, LLMError> {
        request
            .options
            .model
            .clone()
            .or_else(|| self.default_model.clone())
            .ok_or_else(|| LLMError::Validation {
                message: format!("model is required for {}", self.provider),
            })
    }

    /// JSON POST carrying the vendor headers plus the `Accept` type matching `stream`.
    pub(crate) fn request(
        &self,
        url: String,
        body: &Value,
        headers: HashMap<String, String>,
        stream: bool,
    ) -> Result<HttpRequest, LLMError> {
        let accept = if stream {
            "text/event-stream"
        } else {
            "application/json"
        };
        let mut request = HttpRequest::json(url, body)?
            .with_headers(headers)
            .with_timeout(self.timeout);
        request
            .headers
            .insert("Accept".to_string(), accept.to_string());
        Ok(request)
    }

    /// Sends a buffered request and decodes the JSON reply.
    pub(crate) async fn fetch<T, F>(&self, request: HttpRequest, on_error: F) -> Result<T, LLMError>
    where
        T: DeserializeOwned,
        F: FnOnce(u16, &str, Option<Duration>) -> LLMError,
    {
        let text = self.transport.send(request).await?.into_text(on_error)?;
        serde_json::from_str(&text).map_err(|err| {
            LLMError::provider(self.provider, format!("failed to parse response: {err}"))
        })
    }

    /// Sends a streaming request and hands back the SSE body once the vendor accepted it.
    pub(crate) async fn open_stream<F>(
        &self,
        request: HttpRequest,
        on_error: F,
    ) -> Result<HttpBodyStream, LLMError>
    where
        F: FnOnce(u16, &str, Option<Duration>) -> LLMError,
    {
        self.transport
            .send_stream(request)
            .await?
            .into_body(on_error)
            .await
    }
}
