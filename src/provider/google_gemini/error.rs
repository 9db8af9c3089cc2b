use std::time::Duration;

use serde::Deserialize;

use crate::error::{FailureKind, LLMError, VendorFailure};

const PROVIDER: &str = "google_gemini";

/// google.rpc.Status: `{"error": {"code", "message", "status"}}`
#[derive(Deserialize)]
struct Envelope {
    error: Option<Detail>,
}

#[derive(Deserialize)]
struct Detail {
    message: Option<String>,
    status: Option<String>,
}

/// Parses error responses returned by Google Gemini. The RPC status string doubles as
/// the error code.
pub(crate) fn parse_gemini_error(
    status: u16,
    body: &str,
    retry_after: Option<Duration>,
) -> LLMError {
    let Ok(Envelope {
        error: Some(detail),
    }) = serde_json::from_str::<Envelope>(body)
    else {
        return VendorFailure::unparsed(PROVIDER, status, body);
    };

    let kind = match detail.status.as_deref() {
        Some("UNAUTHENTICATED" | "PERMISSION_DENIED") => Some(FailureKind::Auth),
        Some("RESOURCE_EXHAUSTED") => Some(FailureKind::RateLimit),
        Some("NOT_FOUND") => Some(FailureKind::NotFound),
        Some("INVALID_ARGUMENT" | "FAILED_PRECONDITION") => Some(FailureKind::Invalid),
        _ => None,
    };
    VendorFailure {
        provider: PROVIDER,
        status,
        message: detail.message,
        code: detail.status,
        kind,
    }
    .into_error(retry_after)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_key_is_auth() {
        // Gemini 对无效 key 返回 400 + INVALID_ARGUMENT，但 403 PERMISSION_DENIED 更常见
        let body = r#"{"error":{"code":403,"message":"API key not valid","status":"PERMISSION_DENIED"}}"#;
        match parse_gemini_error(403, body, None) {
            LLMError::Auth { message } => assert!(message.contains("PERMISSION_DENIED")),
            other => panic!("expected Auth, got {other:?}"),
        }
    }

    #[test]
    fn quota_exhaustion_is_rate_limit() {
        let body = r#"{"error":{"code":429,"message":"Quota exceeded","status":"RESOURCE_EXHAUSTED"}}"#;
        match parse_gemini_error(429, body, Some(Duration::from_secs(5))) {
            LLMError::RateLimit { retry_after, .. } => {
                assert_eq!(retry_after, Some(Duration::from_secs(5)));
            }
            other => panic!("expected RateLimit, got {other:?}"),
        }
    }

    #[test]
    fn unknown_model_is_reported() {
        let body = r#"{"error":{"code":404,"message":"models/gemini-bogus is not found","status":"NOT_FOUND"}}"#;
        assert!(matches!(
            parse_gemini_error(404, body, None),
            LLMError::ModelNotFound { .. }
        ));
    }

    #[test]
    fn unparseable_body_falls_back_to_provider_error() {
        match parse_gemini_error(503, "upstream connect error", None) {
            LLMError::Provider { provider, message } => {
                assert_eq!(provider, "google_gemini");
                assert_eq!(message, "status 503: upstream connect error");
            }
            other => panic!("expected Provider, got {other:?}"),
        }
    }
}
