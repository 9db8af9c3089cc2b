//! Outbound HTTP used by the vendor providers.
//!
//! Every vendor call is a JSON `POST`; the transport trait keeps providers testable without
//! a network and lets the reqwest client be swapped out.

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_core::Stream;
use futures_util::StreamExt;
use serde::Serialize;

use crate::error::LLMError;

pub mod reqwest;

/// JSON `POST` addressed to a vendor endpoint.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub url: String,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
    /// Whole exchange for [`HttpTransport::send`]; time to response headers for
    /// [`HttpTransport::send_stream`].
    pub timeout: Option<Duration>,
}

impl HttpRequest {
    /// Serializes `body` and sets `Content-Type: application/json`.
    ///
    /// # Examples
    ///
    /// ```
    /// use vaani_gateway::http::HttpRequest;
    ///
    /// let request = HttpRequest::json("https://example.com/v1/messages", &serde_json::json!({"a": 1}))
    ///     .unwrap();
    /// assert_eq!(request.body, br#"{"a":1}"#.to_vec());
    /// assert_eq!(request.headers["Content-Type"], "application/json");
    /// ```
    ///
    /// # Errors
    ///
    /// Returns [`LLMError::Validation`] when the body cannot be serialized.
    pub fn json<T: Serialize>(url: impl Into<String>, body: &T) -> Result<Self, LLMError> {
        let body = serde_json::to_vec(body).map_err(|err| LLMError::Validation {
            message: format!("failed to serialize request: {err}"),
        })?;
        Ok(Self {
            url: url.into(),
            headers: HashMap::from([("Content-Type".to_string(), "application/json".to_string())]),
            body,
            timeout: None,
        })
    }

    /// Adds vendor headers; later values win.
    pub fn with_headers(mut self, headers: HashMap<String, String>) -> Self {
        self.headers.extend(headers);
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Fully buffered vendor reply.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Body text of a 2xx reply. Anything else goes through `on_error`, which receives the
    /// status, the body and the `Retry-After` hint.
    pub fn into_text<F>(self, on_error: F) -> Result<String, LLMError>
    where
        F: FnOnce(u16, &str, Option<Duration>) -> LLMError,
    {
        let success = self.is_success();
        let retry_after = retry_after(&self.headers);
        let text = String::from_utf8(self.body)
            .map_err(|err| LLMError::transport(format!("response body is not UTF-8: {err}")))?;
        if success {
            Ok(text)
        } else {
            Err(on_error(self.status, &text, retry_after))
        }
    }
}

/// Error bodies are read up to this size; the rest of the reply is dropped unread.
const MAX_ERROR_BODY_BYTES: usize = 64 * 1024;

/// Vendor reply whose body is consumed incrementally.
pub struct HttpStreamResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: HttpBodyStream,
}

impl HttpStreamResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Hands back the body of a 2xx reply. Otherwise the error body is drained and mapped
    /// through `on_error`.
    pub async fn into_body<F>(self, on_error: F) -> Result<HttpBodyStream, LLMError>
    where
        F: FnOnce(u16, &str, Option<Duration>) -> LLMError,
    {
        if self.is_success() {
            return Ok(self.body);
        }
        let retry_after = retry_after(&self.headers);
        let mut body = self.body;
        let mut bytes = Vec::new();
        while let Some(chunk) = body.next().await {
            let chunk = chunk?;
            let room = MAX_ERROR_BODY_BYTES - bytes.len();
            if chunk.len() >= room {
                bytes.extend_from_slice(&chunk[..room]);
                break;
            }
            bytes.extend_from_slice(&chunk);
        }
        let text = String::from_utf8_lossy(&bytes);
        Err(on_error(self.status, &text, retry_after))
    }
}

/// Raw body chunks of a streamed reply.
///
/// Dropping the stream releases the connection, which is how an in-flight vendor
/// generation gets aborted.
pub type HttpBodyStream = Pin<Box<dyn Stream<Item = Result<Vec<u8>, LLMError>> + Send>>;

/// Transport abstraction used to decouple providers from the concrete HTTP client.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Sends a request and resolves once the whole body has arrived.
    ///
    /// # Errors
    ///
    /// Network failures and timeouts map to [`LLMError::Transport`].
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, LLMError>;

    /// Sends a request and resolves as soon as the response headers arrive.
    ///
    /// # Errors
    ///
    /// Network failures and timeouts map to [`LLMError::Transport`].
    async fn send_stream(&self, request: HttpRequest) -> Result<HttpStreamResponse, LLMError>;
}

pub type DynHttpTransport = Arc<dyn HttpTransport>;

/// Numeric `Retry-After` seconds. Nothing is retried; the hint only travels inside
/// [`LLMError::RateLimit`]. HTTP-date values are ignored.
fn retry_after(headers: &HashMap<String, String>) -> Option<Duration> {
    headers
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case("retry-after"))
        .and_then(|(_, value)| value.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}
