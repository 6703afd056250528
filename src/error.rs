//! Errors that reach HTTP clients.
//!
//! Only policy violations and infrastructure failures are surfaced; each
//! maps to a distinct status and a generic message.

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::session::SessionError;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("rate limit exceeded")]
    RateLimited { limit: u32, retry_after_secs: u64 },

    #[error("csrf token missing or invalid")]
    CsrfMismatch,

    #[error("resource not found")]
    NotFound,

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("infrastructure failure: {0}")]
    Infrastructure(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            ApiError::CsrfMismatch => StatusCode::FORBIDDEN,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Infrastructure(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn public_message(&self) -> String {
        match self {
            ApiError::RateLimited { .. } => "Rate limit exceeded".to_string(),
            ApiError::CsrfMismatch => "Invalid CSRF token".to_string(),
            ApiError::NotFound => "Not found".to_string(),
            ApiError::BadRequest(msg) => msg.clone(),
            ApiError::Infrastructure(_) => "Internal server error".to_string(),
        }
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        ApiError::Infrastructure(err.to_string())
    }
}

impl From<SessionError> for ApiError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::NotFound | SessionError::Expired(_) => ApiError::NotFound,
            SessionError::Database(e) => ApiError::Infrastructure(e.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let ApiError::Infrastructure(detail) = &self {
            tracing::error!(error = %detail, "Request failed on infrastructure error");
        }

        let status = self.status();
        let mut response = (status, Json(json!({ "error": self.public_message() }))).into_response();

        if let ApiError::RateLimited {
            limit,
            retry_after_secs,
        } = self
        {
            let headers = response.headers_mut();
            headers.insert(header::RETRY_AFTER, HeaderValue::from(retry_after_secs));
            headers.insert("x-ratelimit-limit", HeaderValue::from(limit));
        }

        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            ApiError::RateLimited { limit: 1, retry_after_secs: 1 }.status(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(ApiError::CsrfMismatch.status(), StatusCode::FORBIDDEN);
        assert_eq!(
            ApiError::Infrastructure("db down".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_infrastructure_detail_is_not_exposed() {
        let err = ApiError::Infrastructure("disk I/O error at /var/db".into());
        assert_eq!(err.public_message(), "Internal server error");
    }

    #[test]
    fn test_rate_limited_headers() {
        let response = ApiError::RateLimited { limit: 2, retry_after_secs: 30 }.into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[header::RETRY_AFTER], "30");
        assert_eq!(response.headers()["x-ratelimit-limit"], "2");
    }
}
