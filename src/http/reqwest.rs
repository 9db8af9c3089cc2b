use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, RequestBuilder, Response};
use tracing::debug;

use crate::error::LLMError;

use super::{
    DynHttpTransport, HttpBodyStream, HttpRequest, HttpResponse, HttpStreamResponse,
    HttpTransport,
};

const USER_AGENT: &str = concat!("vaani-gateway/", env!("CARGO_PKG_VERSION"));
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
/// 携带凭据的请求头，标记为 sensitive 以免出现在调试输出中
const SECRET_HEADERS: [&str; 3] = ["authorization", "x-api-key", "x-goog-api-key"];

/// 基于 reqwest 的出站传输
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    /// 使用自定义 reqwest::Client
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// 网关默认客户端：10 秒建连超时，关闭 Nagle 让流式分片尽快到达
    pub fn default_client() -> Result<Self, LLMError> {
        Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(CONNECT_TIMEOUT)
            .tcp_nodelay(true)
            .build()
            .map(Self::new)
            .map_err(|err| LLMError::transport(format!("failed to create reqwest client: {err}")))
    }

    fn prepare(&self, request: HttpRequest) -> Result<RequestBuilder, LLMError> {
        let HttpRequest {
            url, headers, body, ..
        } = request;

        let mut header_map = HeaderMap::with_capacity(headers.len());
        for (raw_name, raw_value) in headers {
            let name = HeaderName::from_bytes(raw_name.as_bytes())
                .map_err(|err| LLMError::transport(format!("invalid header name {raw_name}: {err}")))?;
            let mut value = HeaderValue::from_str(&raw_value).map_err(|err| {
                LLMError::transport(format!("invalid header value for {name}: {err}"))
            })?;
            if SECRET_HEADERS.contains(&name.as_str()) {
                value.set_sensitive(true);
            }
            header_map.insert(name, value);
        }

        Ok(self.client.post(url).headers(header_map).body(body))
    }

    fn headers_to_map(headers: &HeaderMap) -> HashMap<String, String> {
        headers
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|value| (name.as_str().to_string(), value.to_string()))
            })
            .collect()
    }

    fn log_response(url: &str, response: &Response) {
        debug!(url, status = response.status().as_u16(), "vendor responded");
    }
}

fn transport_error(err: reqwest::Error) -> LLMError {
    let message = if err.is_timeout() {
        format!("vendor request timed out: {err}")
    } else if err.is_connect() {
        format!("could not connect to vendor: {err}")
    } else {
        err.to_string()
    };
    LLMError::transport(message)
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, LLMError> {
        let url = request.url.clone();
        let timeout = request.timeout;
        let mut builder = self.prepare(request)?;
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        let response = builder.send().await.map_err(transport_error)?;
        Self::log_response(&url, &response);
        let status = response.status().as_u16();
        let headers = Self::headers_to_map(response.headers());
        let body = response.bytes().await.map_err(transport_error)?.to_vec();

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }

    /// The timeout only bounds the wait for response headers, so long generations are
    /// never cut off mid-stream.
    async fn send_stream(&self, request: HttpRequest) -> Result<HttpStreamResponse, LLMError> {
        let url = request.url.clone();
        let timeout = request.timeout;
        let pending = self.prepare(request)?.send();

        let response = match timeout {
            Some(limit) => tokio::time::timeout(limit, pending).await.map_err(|_| {
                LLMError::transport(format!("vendor sent no response headers within {limit:?}"))
            })?,
            None => pending.await,
        }
        .map_err(transport_error)?;
        Self::log_response(&url, &response);

        let status = response.status().as_u16();
        let headers = Self::headers_to_map(response.headers());
        let body: HttpBodyStream = Box::pin(
            response
                .bytes_stream()
                .map(|chunk| chunk.map(|bytes| bytes.to_vec()).map_err(transport_error)),
        );

        Ok(HttpStreamResponse {
            status,
            headers,
            body,
        })
    }
}

/// 便捷构造线程安全 Transport
pub fn default_dyn_transport() -> Result<DynHttpTransport, LLMError> {
    Ok(Arc::new(ReqwestTransport::default_client()?))
}
