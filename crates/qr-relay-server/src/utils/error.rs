use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RelayError {
    #[error("rate limited")]
    RateLimited,

    #[error("cooldown, retry in {retry_after_secs} s")]
    Cooldown { retry_after_secs: u64 },

    #[error("NOT_FOUND")]
    NotFound,

    #[error("invalid session: {0}")]
    InvalidSession(String),

    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("upstream rejected: {0}")]
    UpstreamRejected(String),

    #[error("token not ready")]
    TokenNotReady,

    #[error("no {0}")]
    LoginFailed(String),

    #[error("internal error")]
    Internal(String),
}

impl RelayError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            RelayError::RateLimited | RelayError::Cooldown { .. } => StatusCode::TOO_MANY_REQUESTS,
            RelayError::NotFound => StatusCode::NOT_FOUND,
            RelayError::InvalidSession(_) => StatusCode::BAD_REQUEST,
            RelayError::TokenNotReady => StatusCode::CONFLICT,
            RelayError::UpstreamUnavailable(_)
            | RelayError::UpstreamRejected(_)
            | RelayError::LoginFailed(_) => StatusCode::BAD_GATEWAY,
            RelayError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    success: bool,
    error: String,
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        match &self {
            RelayError::Internal(detail) => tracing::error!("Internal error: {}", detail),
            _ if status.is_server_error() => tracing::error!("Relay error: {}", self),
            _ => tracing::warn!("Request rejected: {}", self),
        }

        let body = Json(ErrorResponse {
            success: false,
            error: self.to_string(),
        });

        (status, body).into_response()
    }
}
