use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crate::client::LLMClient;
use crate::error::LLMError;
use crate::http::DynHttpTransport;
use crate::provider::anthropic_messages::AnthropicMessagesProvider;
use crate::provider::google_gemini::GoogleGeminiProvider;
use crate::provider::openai_chat::OpenAiChatProvider;
use crate::provider::{DynProvider, ProviderKind};

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8000";
const DEFAULT_MODEL: &str = "gemini-pro";
const DEFAULT_MEMORY_TURNS: usize = 4;

/// 网关运行配置
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub bind_addr: SocketAddr,
    /// 请求体未指定 model 时使用
    pub default_model: String,
    /// 每次请求最多携带的历史轮数
    pub memory_turns: usize,
    /// 输出 token 上限，`None` 时各供应商使用自身默认值
    pub max_output_tokens: Option<u32>,
    /// 单次供应商调用超时，`None` 表示不限
    pub request_timeout: Option<Duration>,
    /// 会话空闲淘汰阈值，`None` 表示会话常驻内存
    pub session_idle_ttl: Option<Duration>,
    pub providers: Vec<ProviderConfig>,
}

/// 单个供应商的接入配置
#[derive(Clone)]
pub struct ProviderConfig {
    pub kind: ProviderKind,
    pub api_key: String,
    pub base_url: Option<String>,
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("kind", &self.kind)
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl GatewayConfig {
    /// 读取进程环境变量，启动前先加载 `.env`
    pub fn from_env() -> Result<Self, LLMError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// 通过任意查找函数构建配置，空字符串视为未设置
    ///
    /// # Errors
    ///
    /// 缺少必需的 API Key 或数值无法解析时返回 [`LLMError::InvalidConfig`]。
    pub fn from_lookup<F>(lookup: F) -> Result<Self, LLMError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let mut providers = Vec::new();
        for kind in ProviderKind::ALL {
            let key_var = api_key_var(kind);
            match get(key_var) {
                Some(api_key) => providers.push(ProviderConfig {
                    kind,
                    api_key,
                    base_url: get(base_url_var(kind)),
                }),
                None if is_required(kind) => {
                    return Err(LLMError::invalid_config(key_var, "required API key is not set"));
                }
                None => {}
            }
        }

        Ok(Self {
            bind_addr: parse_field(
                "GATEWAY_BIND_ADDR",
                get("GATEWAY_BIND_ADDR").as_deref().unwrap_or(DEFAULT_BIND_ADDR),
            )?,
            default_model: get("GATEWAY_DEFAULT_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            memory_turns: parse_or(
                "GATEWAY_MEMORY_TURNS",
                get("GATEWAY_MEMORY_TURNS"),
                DEFAULT_MEMORY_TURNS,
            )?,
            max_output_tokens: get("GATEWAY_MAX_OUTPUT_TOKENS")
                .map(|raw| parse_field("GATEWAY_MAX_OUTPUT_TOKENS", &raw))
                .transpose()?,
            request_timeout: parse_secs(
                "GATEWAY_REQUEST_TIMEOUT_SECS",
                get("GATEWAY_REQUEST_TIMEOUT_SECS"),
            )?,
            session_idle_ttl: parse_secs(
                "GATEWAY_SESSION_IDLE_SECS",
                get("GATEWAY_SESSION_IDLE_SECS"),
            )?,
            providers,
        })
    }

    pub fn provider(&self, kind: ProviderKind) -> Option<&ProviderConfig> {
        self.providers.iter().find(|provider| provider.kind == kind)
    }
}

/// 根据网关配置构建 LLMClient，每个已配置的供应商注册一个 Provider
pub fn build_client_from_config(
    config: &GatewayConfig,
    transport: DynHttpTransport,
) -> Result<LLMClient, LLMError> {
    let mut builder = LLMClient::builder();
    for provider_config in &config.providers {
        let provider = build_provider_from_config(
            provider_config,
            config.request_timeout,
            transport.clone(),
        )?;
        builder = builder.register(provider_config.kind, provider);
    }
    Ok(builder.build())
}

fn build_provider_from_config(
    config: &ProviderConfig,
    timeout: Option<Duration>,
    transport: DynHttpTransport,
) -> Result<DynProvider, LLMError> {
    if config.api_key.is_empty() {
        return Err(LLMError::Auth {
            message: format!("provider {} requires an API key", config.kind),
        });
    }
    let api_key = config.api_key.clone();

    let provider: DynProvider = match config.kind {
        ProviderKind::Gemini => {
            let mut provider = GoogleGeminiProvider::new(transport, api_key).with_timeout(timeout);
            if let Some(base_url) = &config.base_url {
                provider = provider.with_base_url(base_url.clone());
            }
            Arc::new(provider)
        }
        ProviderKind::Anthropic => {
            let mut provider =
                AnthropicMessagesProvider::new(transport, api_key).with_timeout(timeout);
            if let Some(base_url) = &config.base_url {
                provider = provider.with_base_url(base_url.clone());
            }
            Arc::new(provider)
        }
        ProviderKind::OpenAi | ProviderKind::Fireworks | ProviderKind::Groq => {
            let provider = match config.kind {
                ProviderKind::Fireworks => OpenAiChatProvider::fireworks(transport, api_key),
                ProviderKind::Groq => OpenAiChatProvider::groq(transport, api_key),
                _ => OpenAiChatProvider::new(transport, api_key),
            };
            let mut provider = provider.with_timeout(timeout);
            if let Some(base_url) = &config.base_url {
                provider = provider.with_base_url(base_url.clone());
            }
            Arc::new(provider)
        }
    };

    Ok(provider)
}

fn api_key_var(kind: ProviderKind) -> &'static str {
    match kind {
        ProviderKind::Gemini => "GOOGLE_API_KEY",
        ProviderKind::OpenAi => "OPENAI_API_KEY",
        ProviderKind::Anthropic => "ANTHROPIC_API_KEY",
        ProviderKind::Fireworks => "FIREWORKS_API_KEY",
        ProviderKind::Groq => "GROQ_API_KEY",
    }
}

fn base_url_var(kind: ProviderKind) -> &'static str {
    match kind {
        ProviderKind::Gemini => "GOOGLE_BASE_URL",
        ProviderKind::OpenAi => "OPENAI_BASE_URL",
        ProviderKind::Anthropic => "ANTHROPIC_BASE_URL",
        ProviderKind::Fireworks => "FIREWORKS_BASE_URL",
        ProviderKind::Groq => "GROQ_BASE_URL",
    }
}

fn is_required(kind: ProviderKind) -> bool {
    matches!(
        kind,
        ProviderKind::Gemini | ProviderKind::OpenAi | ProviderKind::Anthropic
    )
}

fn parse_field<T>(field: &str, raw: &str) -> Result<T, LLMError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    raw.parse()
        .map_err(|err| LLMError::invalid_config(field, format!("{raw:?}: {err}")))
}

fn parse_or<T>(field: &str, value: Option<String>, default: T) -> Result<T, LLMError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    match value {
        Some(raw) => parse_field(field, &raw),
        None => Ok(default),
    }
}

fn parse_secs(field: &str, value: Option<String>) -> Result<Option<Duration>, LLMError> {
    let Some(raw) = value else {
        return Ok(None);
    };
    let secs: u64 = parse_field(field, &raw)?;
    if secs == 0 {
        return Err(LLMError::invalid_config(field, "must be greater than zero"));
    }
    Ok(Some(Duration::from_secs(secs)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::reqwest::default_dyn_transport;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    const REQUIRED: [(&str, &str); 3] = [
        ("GOOGLE_API_KEY", "g-key"),
        ("OPENAI_API_KEY", "o-key"),
        ("ANTHROPIC_API_KEY", "a-key"),
    ];

    #[test]
    fn defaults_apply_when_only_keys_are_set() {
        let config = GatewayConfig::from_lookup(lookup(&REQUIRED)).expect("config");
        assert_eq!(config.bind_addr, "0.0.0.0:8000".parse::<SocketAddr>().unwrap());
        assert_eq!(config.default_model, "gemini-pro");
        assert_eq!(config.memory_turns, 4);
        assert!(config.max_output_tokens.is_none());
        assert!(config.request_timeout.is_none());
        assert!(config.session_idle_ttl.is_none());
        let kinds: Vec<_> = config.providers.iter().map(|p| p.kind).collect();
        assert_eq!(
            kinds,
            vec![
                ProviderKind::Gemini,
                ProviderKind::OpenAi,
                ProviderKind::Anthropic
            ]
        );
    }

    #[test]
    fn first_missing_required_key_is_reported() {
        let err = GatewayConfig::from_lookup(lookup(&[("GOOGLE_API_KEY", "g")])).unwrap_err();
        match err {
            LLMError::InvalidConfig { field, .. } => assert_eq!(field, "OPENAI_API_KEY"),
            other => panic!("unexpected error type: {other:?}"),
        }

        // 空白值视为未设置
        let err = GatewayConfig::from_lookup(lookup(&[
            ("GOOGLE_API_KEY", "  "),
            ("OPENAI_API_KEY", "o"),
            ("ANTHROPIC_API_KEY", "a"),
        ]))
        .unwrap_err();
        assert!(matches!(err, LLMError::InvalidConfig { field, .. } if field == "GOOGLE_API_KEY"));
    }

    #[test]
    fn overrides_and_optional_vendors_are_read() {
        let mut pairs = REQUIRED.to_vec();
        pairs.extend([
            ("GROQ_API_KEY", "q-key"),
            ("GROQ_BASE_URL", "http://localhost:1234"),
            ("GATEWAY_BIND_ADDR", "127.0.0.1:9000"),
            ("GATEWAY_MEMORY_TURNS", "2"),
            ("GATEWAY_MAX_OUTPUT_TOKENS", "512"),
            ("GATEWAY_REQUEST_TIMEOUT_SECS", "30"),
            ("GATEWAY_SESSION_IDLE_SECS", "600"),
        ]);
        let config = GatewayConfig::from_lookup(lookup(&pairs)).expect("config");
        assert_eq!(config.bind_addr.port(), 9000);
        assert_eq!(config.memory_turns, 2);
        assert_eq!(config.max_output_tokens, Some(512));
        assert_eq!(config.request_timeout, Some(Duration::from_secs(30)));
        assert_eq!(config.session_idle_ttl, Some(Duration::from_secs(600)));
        let groq = config.provider(ProviderKind::Groq).expect("groq configured");
        assert_eq!(groq.base_url.as_deref(), Some("http://localhost:1234"));
        assert!(config.provider(ProviderKind::Fireworks).is_none());
    }

    #[test]
    fn invalid_numbers_name_the_field() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("GATEWAY_MEMORY_TURNS", "four"));
        match GatewayConfig::from_lookup(lookup(&pairs)).unwrap_err() {
            LLMError::InvalidConfig { field, reason } => {
                assert_eq!(field, "GATEWAY_MEMORY_TURNS");
                assert!(reason.contains("four"), "unexpected reason: {reason}");
            }
            other => panic!("unexpected error type: {other:?}"),
        }

        let mut pairs = REQUIRED.to_vec();
        pairs.push(("GATEWAY_REQUEST_TIMEOUT_SECS", "0"));
        assert!(GatewayConfig::from_lookup(lookup(&pairs)).is_err());

        let mut pairs = REQUIRED.to_vec();
        pairs.push(("GATEWAY_MAX_OUTPUT_TOKENS", "-1"));
        assert!(matches!(
            GatewayConfig::from_lookup(lookup(&pairs)).unwrap_err(),
            LLMError::InvalidConfig { field, .. } if field == "GATEWAY_MAX_OUTPUT_TOKENS"
        ));
    }

    #[test]
    fn debug_output_redacts_api_keys() {
        let config = GatewayConfig::from_lookup(lookup(&REQUIRED)).expect("config");
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("g-key"));
        assert!(rendered.contains("<redacted>"));
    }

    /// 每个已配置的供应商都应注册到 LLMClient
    #[test]
    fn build_client_registers_every_configured_vendor() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("FIREWORKS_API_KEY", "f-key"));
        let config = GatewayConfig::from_lookup(lookup(&pairs)).expect("config");
        let transport = default_dyn_transport().expect("transport");

        let client = build_client_from_config(&config, transport).expect("client");
        assert_eq!(
            client.kinds(),
            vec![
                ProviderKind::Gemini,
                ProviderKind::OpenAi,
                ProviderKind::Anthropic,
                ProviderKind::Fireworks
            ]
        );
        assert_eq!(
            client.provider(ProviderKind::Fireworks).expect("fireworks").name(),
            "fireworks"
        );
        assert!(matches!(
            client.provider(ProviderKind::Groq),
            Err(LLMError::ProviderNotConfigured { kind: ProviderKind::Groq })
        ));
    }

    #[test]
    fn empty_api_key_is_rejected_at_build_time() {
        let config = GatewayConfig {
            providers: vec![ProviderConfig {
                kind: ProviderKind::OpenAi,
                api_key: String::new(),
                base_url: None,
            }],
            ..GatewayConfig::from_lookup(lookup(&REQUIRED)).expect("config")
        };
        let transport = default_dyn_transport().expect("transport");
        match build_client_from_config(&config, transport) {
            Err(LLMError::Auth { message }) => assert!(message.contains("openai")),
            Err(other) => panic!("unexpected error type: {other:?}"),
            Ok(_) => panic!("expected auth error"),
        }
    }
}
