use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

/// Errors reported to the caller before any sandbox resource is touched.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EngineError {
    #[error("Code not provided")]
    MissingCode,
    #[error("Language not provided")]
    MissingLanguage,
    #[error("Unsupported language: {0}")]
    UnsupportedLanguage(String),
    #[error("Invalid request body: {0}")]
    MalformedBody(String),
    #[error("Request body too large: {0}")]
    BodyTooLarge(String),
    #[error("Too many executions in progress, retry later")]
    Busy { retry_after_secs: u64 },
    #[error("Method not allowed")]
    MethodNotAllowed,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    message: String,
}

impl EngineError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::MissingCode
            | Self::MissingLanguage
            | Self::UnsupportedLanguage(_)
            | Self::MalformedBody(_) => StatusCode::BAD_REQUEST,
            Self::BodyTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            Self::Busy { .. } => StatusCode::SERVICE_UNAVAILABLE,
            Self::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
        }
    }
}

impl IntoResponse for EngineError {
    fn into_response(self) -> Response {
        let status = self.status();
        let mut response = (
            status,
            Json(ErrorBody {
                message: self.to_string(),
            }),
        )
            .into_response();

        if let Self::Busy { retry_after_secs } = self
            && let Ok(v) = HeaderValue::from_str(&retry_after_secs.to_string())
        {
            response.headers_mut().insert(header::RETRY_AFTER, v);
        }

        response
    }
}
