use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;

use crate::error::{LLMError, VendorFailure};

#[derive(Deserialize)]
struct Envelope {
    error: Option<Detail>,
}

#[derive(Deserialize)]
struct Detail {
    message: Option<String>,
    /// String on OpenAI, sometimes a number on compatible hosts.
    code: Option<Value>,
}

/// Parses error bodies returned by OpenAI-compatible endpoints (OpenAI, Fireworks, Groq).
/// Classification relies on the HTTP status alone.
pub(crate) fn parse_openai_error(
    provider: &'static str,
    status: u16,
    body: &str,
    retry_after: Option<Duration>,
) -> LLMError {
    let Ok(Envelope {
        error: Some(detail),
    }) = serde_json::from_str::<Envelope>(body)
    else {
        return VendorFailure::unparsed(provider, status, body);
    };

    let code = match detail.code {
        Some(Value::String(text)) => Some(text),
        Some(Value::Number(number)) => Some(number.to_string()),
        _ => None,
    };
    VendorFailure {
        provider,
        status,
        message: detail.message,
        code,
        kind: None,
    }
    .into_error(retry_after)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_and_rate_limit_are_classified() {
        let body = r#"{"error":{"message":"Incorrect API key provided","code":"invalid_api_key"}}"#;
        match parse_openai_error("openai_chat", 401, body, None) {
            LLMError::Auth { message } => {
                assert!(message.contains("Incorrect API key provided"));
                assert!(message.contains("invalid_api_key"));
            }
            other => panic!("expected Auth, got {other:?}"),
        }

        let body = r#"{"error":{"message":"Rate limit reached"}}"#;
        match parse_openai_error("groq", 429, body, Some(Duration::from_secs(2))) {
            LLMError::RateLimit { retry_after, .. } => {
                assert_eq!(retry_after, Some(Duration::from_secs(2)));
            }
            other => panic!("expected RateLimit, got {other:?}"),
        }
    }

    #[test]
    fn missing_model_reports_identifier() {
        let body = r#"{"error":{"message":"The model `gpt-9` does not exist","code":"model_not_found"}}"#;
        match parse_openai_error("openai_chat", 404, body, None) {
            LLMError::ModelNotFound { model, .. } => assert_eq!(model.as_deref(), Some("gpt-9")),
            other => panic!("expected ModelNotFound, got {other:?}"),
        }
    }

    #[test]
    fn context_overflow_maps_to_token_limit() {
        let body = r#"{"error":{"message":"too long","code":"context_length_exceeded"}}"#;
        assert!(matches!(
            parse_openai_error("openai_chat", 400, body, None),
            LLMError::TokenLimitExceeded { .. }
        ));
    }

    #[test]
    fn unparseable_body_keeps_status_and_provider() {
        match parse_openai_error("fireworks", 502, "<html>bad gateway</html>", None) {
            LLMError::Provider { provider, message } => {
                assert_eq!(provider, "fireworks");
                assert!(message.starts_with("status 502"));
            }
            other => panic!("expected Provider, got {other:?}"),
        }
    }
}
