//! HTTP error responses

use crate::core::provider::ProviderError;
use crate::core::screenshot::ImageError;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;
use tracing::{error, warn};

/// Errors returned by the HTTP handlers
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Session not found")]
    SessionNotFound,

    #[error("Upload a screenshot first")]
    NoImage,

    #[error("No HTML has been generated yet")]
    NoHtml,

    #[error("A request is already running for this session")]
    Busy,

    #[error("{0}")]
    BadRequest(String),

    #[error("Upload rejected: {message}")]
    Upload { status: StatusCode, message: String },

    #[error(transparent)]
    Image(#[from] ImageError),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::SessionNotFound | ApiError::NoHtml => StatusCode::NOT_FOUND,
            ApiError::NoImage | ApiError::Busy => StatusCode::CONFLICT,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Upload { status, .. } => *status,
            ApiError::Image(ImageError::UnsupportedType(_)) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            ApiError::Image(ImageError::TooLarge { .. }) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::Image(_) => StatusCode::BAD_REQUEST,
            ApiError::Provider(e) => provider_status(e),
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_type(&self) -> &'static str {
        match self {
            ApiError::SessionNotFound | ApiError::NoHtml => "not_found_error",
            ApiError::NoImage | ApiError::Busy => "conflict_error",
            ApiError::BadRequest(_) | ApiError::Upload { .. } | ApiError::Image(_) => {
                "invalid_request_error"
            }
            ApiError::Provider(ProviderError::RateLimit(_)) => "rate_limit_error",
            ApiError::Provider(ProviderError::Authentication(_)) => "authentication_error",
            ApiError::Provider(ProviderError::Cancelled) => "cancelled",
            ApiError::Provider(ProviderError::Blocked(_)) => "blocked_error",
            ApiError::Provider(_) | ApiError::Internal(_) => "api_error",
        }
    }
}

/// Upstream failures surface as gateway errors, except the ones the user can act on
fn provider_status(error: &ProviderError) -> StatusCode {
    match error {
        ProviderError::RateLimit(_) => StatusCode::TOO_MANY_REQUESTS,
        ProviderError::Blocked(_) => StatusCode::UNPROCESSABLE_ENTITY,
        ProviderError::Cancelled => {
            StatusCode::from_u16(499).unwrap_or(StatusCode::REQUEST_TIMEOUT)
        }
        _ => StatusCode::BAD_GATEWAY,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("Request failed: {}", self);
        } else {
            warn!("Request rejected: {}", self);
        }

        let body = json!({
            "type": "error",
            "error": {
                "type": self.error_type(),
                "message": self.to_string(),
            }
        });
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(ApiError::SessionNotFound.status(), StatusCode::NOT_FOUND);
        assert_eq!(ApiError::Busy.status(), StatusCode::CONFLICT);
        assert_eq!(
            ApiError::Image(ImageError::UnsupportedType("image/gif".into())).status(),
            StatusCode::UNSUPPORTED_MEDIA_TYPE
        );
        assert_eq!(
            ApiError::Provider(ProviderError::RateLimit("x".into())).status(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            ApiError::Provider(ProviderError::Cancelled).status().as_u16(),
            499
        );
        assert_eq!(
            ApiError::Provider(ProviderError::Authentication("x".into())).status(),
            StatusCode::BAD_GATEWAY
        );
    }
}
