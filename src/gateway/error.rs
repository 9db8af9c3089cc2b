use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::error::LLMError;

/// HTTP-side failures; every variant renders as `{success: false, detail}`.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("{0}")]
    BadRequest(String),
    /// A newer request took over the session before this one finished.
    #[error("Request superseded")]
    Superseded,
    #[error("Model error: {0}")]
    Model(#[from] LLMError),
    #[error("Model error: No response generated")]
    EmptyResponse,
}

#[derive(Debug, Serialize)]
struct ErrorPayload {
    success: bool,
    detail: String,
}

impl GatewayError {
    pub fn no_message() -> Self {
        Self::BadRequest("No message provided".to_string())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Superseded => StatusCode::CONFLICT,
            Self::Model(_) | Self::EmptyResponse => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<JsonRejection> for GatewayError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let payload = ErrorPayload {
            success: false,
            detail: self.to_string(),
        };
        (self.status(), Json(payload)).into_response()
    }
}
