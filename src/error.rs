use std::time::Duration;

use thiserror::Error;

use crate::provider::ProviderKind;

/// Aggregates every failure mode raised while talking to an upstream model vendor.
///
/// The gateway never lets these escape a streaming response: the adapter turns them into
/// an apology chunk. Non-streaming endpoints map them onto HTTP error bodies instead.
#[derive(Debug, Error)]
pub enum LLMError {
    /// Represents transport-layer or networking failures.
    #[error("transport error: {message}")]
    Transport { message: String },
    /// Reports invalid or missing credentials.
    #[error("auth failure: {message}")]
    Auth { message: String },
    /// Indicates that the provider throttled the request.
    #[error("rate limited: {message}")]
    RateLimit {
        /// Raw message returned by the upstream provider.
        message: String,
        /// Optional wait duration suggested by the provider.
        retry_after: Option<Duration>,
    },
    /// Indicates that the prompt or expected completion exceeds the allowed token budget.
    #[error("token limit exceeded: {message}")]
    TokenLimitExceeded { message: String },
    /// Signals validation failures in the request payload.
    #[error("invalid request: {message}")]
    Validation { message: String },
    /// The model identifier does not map onto any supported vendor.
    #[error("Unsupported model: {model}")]
    UnsupportedModel { model: String },
    /// The vendor is known but no credentials were configured for it.
    #[error("provider {kind} is not configured")]
    ProviderNotConfigured { kind: ProviderKind },
    /// Indicates that a requested model could not be resolved by the vendor.
    #[error("model not found: {message}")]
    ModelNotFound {
        /// Model identifier extracted from the error payload when available.
        model: Option<String>,
        /// Full error message returned by the provider.
        message: String,
    },
    /// Raised when building or validating configuration fails.
    #[error("invalid configuration for {field}: {reason}")]
    InvalidConfig {
        /// Name of the configuration field that failed validation.
        field: String,
        /// Additional context explaining why the field is invalid.
        reason: String,
    },
    /// Wraps provider-defined errors that cannot be normalized.
    #[error("provider {provider} error: {message}")]
    Provider {
        /// Name of the provider, such as `openai_chat`.
        provider: &'static str,
        /// Human-readable error message returned by the provider.
        message: String,
    },
}

impl LLMError {
    /// Creates an [`LLMError::Transport`] from a textual description.
    ///
    /// # Examples
    ///
    /// ```
    /// use vaani_gateway::error::LLMError;
    ///
    /// let err = LLMError::transport("dns lookup failed");
    /// assert!(matches!(err, LLMError::Transport { .. }));
    /// ```
    pub fn transport<T: Into<String>>(message: T) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Creates an [`LLMError::Provider`] with the given provider name and message.
    ///
    /// # Examples
    ///
    /// ```
    /// use vaani_gateway::error::LLMError;
    ///
    /// let err = LLMError::provider("openai_chat", "bad JSON payload");
    /// assert!(matches!(err, LLMError::Provider { provider: "openai_chat", .. }));
    /// ```
    pub fn provider<T: Into<String>>(provider: &'static str, message: T) -> Self {
        Self::Provider {
            provider,
            message: message.into(),
        }
    }

    /// Shorthand for [`LLMError::InvalidConfig`].
    pub fn invalid_config(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Coarse category a vendor reports next to its message (`error.type`, `error.status`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FailureKind {
    Auth,
    RateLimit,
    NotFound,
    Invalid,
}

impl FailureKind {
    fn from_status(status: u16) -> Option<Self> {
        match status {
            401 | 403 => Some(Self::Auth),
            429 => Some(Self::RateLimit),
            404 => Some(Self::NotFound),
            400 => Some(Self::Invalid),
            _ => None,
        }
    }
}

/// Fields read out of a vendor error body, before they become an [`LLMError`].
#[derive(Debug)]
pub(crate) struct VendorFailure {
    pub(crate) provider: &'static str,
    pub(crate) status: u16,
    pub(crate) message: Option<String>,
    /// Appended to the message and checked for context overflow.
    pub(crate) code: Option<String>,
    pub(crate) kind: Option<FailureKind>,
}

impl VendorFailure {
    /// Body that is not the vendor's JSON error envelope (proxies, HTML error pages).
    pub(crate) fn unparsed(provider: &'static str, status: u16, body: &str) -> LLMError {
        LLMError::provider(provider, format!("status {status}: {body}"))
    }

    /// The HTTP status decides first. The vendor's own category only covers statuses
    /// outside the standard set, such as Anthropic's 529.
    pub(crate) fn into_error(self, retry_after: Option<Duration>) -> LLMError {
        let code = self.code.filter(|code| !code.is_empty());
        let mut message = self.message.unwrap_or_else(|| "unknown error".to_string());
        if let Some(code) = &code {
            message = format!("{message} ({code})");
        }
        if is_context_overflow(code.as_deref(), &message) {
            return LLMError::TokenLimitExceeded { message };
        }

        match FailureKind::from_status(self.status).or(self.kind) {
            Some(FailureKind::Auth) => LLMError::Auth { message },
            Some(FailureKind::RateLimit) => LLMError::RateLimit {
                message,
                retry_after,
            },
            Some(FailureKind::NotFound) => LLMError::ModelNotFound {
                model: quoted_identifier(&message),
                message,
            },
            Some(FailureKind::Invalid) => LLMError::Validation { message },
            None => LLMError::provider(self.provider, message),
        }
    }
}

const OVERFLOW_CODES: [&str; 4] = [
    "context_length_exceeded",
    "max_context_length_exceeded",
    "prompt_tokens_exceeded",
    "context_window_exceeded",
];

const OVERFLOW_PHRASES: [&str; 5] = [
    "context length",
    "context window",
    "token limit",
    "maximum context length",
    "prompt is too long",
];

fn is_context_overflow(code: Option<&str>, message: &str) -> bool {
    if code.is_some_and(|code| OVERFLOW_CODES.iter().any(|known| code.eq_ignore_ascii_case(known))) {
        return true;
    }
    let message = message.to_ascii_lowercase();
    OVERFLOW_PHRASES.iter().any(|phrase| message.contains(phrase))
}

/// First non-blank segment quoted with backticks, double or single quotes.
fn quoted_identifier(message: &str) -> Option<String> {
    ['`', '"', '\''].into_iter().find_map(|quote| {
        let (_, rest) = message.split_once(quote)?;
        let (inner, _) = rest.split_once(quote)?;
        let inner = inner.trim();
        (!inner.is_empty()).then(|| inner.to_string())
    })
}
