use std::time::Duration;

use serde::Deserialize;

use crate::error::{FailureKind, LLMError, VendorFailure};

const PROVIDER: &str = "anthropic_messages";

#[derive(Deserialize)]
struct Envelope {
    error: Option<Detail>,
}

#[derive(Deserialize)]
struct Detail {
    message: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
    code: Option<String>,
}

/// Parses error responses returned by the Anthropic Messages API.
///
/// `error.type` (`authentication_error`, `overloaded_error`, ...) is used when the HTTP
/// status alone says nothing, e.g. 529 Overloaded.
pub(crate) fn parse_anthropic_error(
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

    let kind = match detail.kind.as_deref() {
        Some("authentication_error" | "permission_error") => Some(FailureKind::Auth),
        Some("rate_limit_error" | "overloaded_error") => Some(FailureKind::RateLimit),
        Some("not_found_error") => Some(FailureKind::NotFound),
        Some("invalid_request_error") => Some(FailureKind::Invalid),
        _ => None,
    };
    VendorFailure {
        provider: PROVIDER,
        status,
        message: detail.message,
        code: detail.code,
        kind,
    }
    .into_error(retry_after)
}
