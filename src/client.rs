use std::collections::HashMap;

use crate::error::LLMError;
use crate::provider::{ChatStream, DynProvider, ProviderKind};
use crate::types::{ChatRequest, ChatResponse};

/// LLM 调用入口 负责维护每个供应商对应的 Provider
#[derive(Clone)]
pub struct LLMClient {
    providers: HashMap<ProviderKind, DynProvider>,
}

impl LLMClient {
    /// 创建 Builder 便于后续注册 Provider
    pub fn builder() -> LLMClientBuilder {
        LLMClientBuilder {
            providers: HashMap::new(),
        }
    }

    /// 按模型名前缀选出供应商并返回其 Provider
    ///
    /// # Errors
    ///
    /// 前缀无法识别时返回 [`LLMError::UnsupportedModel`]，
    /// 供应商未配置时返回 [`LLMError::ProviderNotConfigured`]。
    pub fn resolve(&self, model: &str) -> Result<(ProviderKind, DynProvider), LLMError> {
        let kind = ProviderKind::from_model(model)?;
        Ok((kind, self.provider(kind)?))
    }

    /// 查询指定供应商的 Provider
    pub fn provider(&self, kind: ProviderKind) -> Result<DynProvider, LLMError> {
        self.providers
            .get(&kind)
            .cloned()
            .ok_or(LLMError::ProviderNotConfigured { kind })
    }

    /// 发送同步聊天请求，模型取自 `request.options.model`
    pub async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, LLMError> {
        let (_, provider) = self.resolve(request_model(&request)?)?;
        provider.chat(request).await
    }

    /// 发起流式聊天请求
    pub async fn stream_chat(&self, request: ChatRequest) -> Result<ChatStream, LLMError> {
        let (_, provider) = self.resolve(request_model(&request)?)?;
        provider.stream_chat(request).await
    }

    /// 返回当前已注册的供应商，按声明顺序排列
    pub fn kinds(&self) -> Vec<ProviderKind> {
        ProviderKind::ALL
            .into_iter()
            .filter(|kind| self.providers.contains_key(kind))
            .collect()
    }
}

fn request_model(request: &ChatRequest) -> Result<&str, LLMError> {
    request
        .options
        .model
        .as_deref()
        .ok_or_else(|| LLMError::Validation {
            message: "model is required".to_string(),
        })
}

/// 负责注册 Provider 的 Builder
pub struct LLMClientBuilder {
    providers: HashMap<ProviderKind, DynProvider>,
}

impl LLMClientBuilder {
    /// 注册供应商对应的 Provider，重复注册时后者覆盖前者
    pub fn register(mut self, kind: ProviderKind, provider: DynProvider) -> Self {
        self.providers.insert(kind, provider);
        self
    }

    /// 构建最终的 LLMClient
    pub fn build(self) -> LLMClient {
        LLMClient {
            providers: self.providers,
        }
    }
}
