//! API error type.
//!
//! Every handler and the guard funnel their failures into [`ApiError`], which
//! picks the status code and writes a scrubbed body. Detail that must not reach
//! the client (store errors, which credential check failed) is logged here.

use crate::auth::jwt::TokenError;
use crate::auth::models::InvalidName;
use crate::auth::password::PasswordError;
use crate::auth::rbac::AuthzError;
use crate::auth::service::AuthError;
use crate::db::StoreError;
use crate::middleware::logging::current_request_id;
use crate::validation::FieldError;
use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::{debug, error, warn};

pub const INVALID_CREDENTIALS: &str = "Invalid credentials";
pub const INVALID_TOKEN: &str = "Invalid token";

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("validation failed")]
    Validation(Vec<FieldError>),

    #[error("unauthorized: {0}")]
    Unauthorized(&'static str),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("too many requests")]
    RateLimited { retry_after: i64 },

    #[error("internal error: {0}")]
    Internal(String),
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<FieldError>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

impl ApiError {
    pub fn not_found(what: &str) -> Self {
        ApiError::NotFound(format!("{what} not found"))
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) | ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "bad_request",
            ApiError::Validation(_) => "validation_failed",
            ApiError::Unauthorized(_) => "unauthorized",
            ApiError::Forbidden(_) => "forbidden",
            ApiError::NotFound(_) => "not_found",
            ApiError::Conflict(_) => "conflict",
            ApiError::RateLimited { .. } => "rate_limit_exceeded",
            ApiError::Internal(_) => "internal_error",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let code = self.code();

        let (message, details, retry_after) = match self {
            ApiError::BadRequest(message)
            | ApiError::NotFound(message)
            | ApiError::Conflict(message) => (message, None, None),
            ApiError::Validation(details) => {
                ("Validation failed".to_string(), Some(details), None)
            }
            ApiError::Unauthorized(message) => (message.to_string(), None, None),
            ApiError::Forbidden(detail) => {
                debug!(detail = %detail, "Request forbidden");
                ("Insufficient permissions".to_string(), None, None)
            }
            ApiError::RateLimited { retry_after } => (
                "Too many requests. Please slow down.".to_string(),
                None,
                Some(retry_after),
            ),
            ApiError::Internal(detail) => {
                error!(detail = %detail, "Internal error");
                ("Internal server error".to_string(), None, None)
            }
        };

        let body = ErrorBody {
            error: code,
            message,
            details,
            retry_after,
            request_id: current_request_id(),
        };

        (status, Json(body)).into_response()
    }
}

impl From<TokenError> for ApiError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::NotRefreshable => {
                ApiError::BadRequest("Token is not eligible for refresh yet".to_string())
            }
            TokenError::SignFailed => ApiError::Internal(err.to_string()),
            _ => {
                debug!(reason = %err, "Token rejected");
                ApiError::Unauthorized(INVALID_TOKEN)
            }
        }
    }
}

impl From<PasswordError> for ApiError {
    fn from(err: PasswordError) -> Self {
        match err {
            PasswordError::Mismatch => ApiError::Unauthorized(INVALID_CREDENTIALS),
            PasswordError::HashFailed => ApiError::Internal(err.to_string()),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => ApiError::not_found("Resource"),
            StoreError::Conflict(message) => ApiError::Conflict(message),
            StoreError::Sqlite(e) => ApiError::Internal(format!("database: {e}")),
        }
    }
}

impl From<AuthzError> for ApiError {
    fn from(err: AuthzError) -> Self {
        match err {
            AuthzError::Forbidden(detail) => ApiError::Forbidden(detail),
            AuthzError::Store(e) => e.into(),
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InvalidCredentials => ApiError::Unauthorized(INVALID_CREDENTIALS),
            AuthError::Inactive => ApiError::Unauthorized(INVALID_CREDENTIALS),
            AuthError::Validation(details) => ApiError::Validation(details),
            AuthError::Password(e) => e.into(),
            AuthError::Token(e) => e.into(),
            AuthError::Store(e) => e.into(),
            AuthError::Authz(e) => e.into(),
            AuthError::Internal(detail) => ApiError::Internal(detail),
        }
    }
}

impl From<InvalidName> for ApiError {
    fn from(err: InvalidName) -> Self {
        ApiError::BadRequest(err.to_string())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        warn!(reason = %rejection.body_text(), "Rejected request body");
        ApiError::BadRequest("Invalid request body".to_string())
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError::Internal(format!("{err:#}"))
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_token_errors_collapse() {
        for err in [
            TokenError::Malformed,
            TokenError::WrongAlgorithm,
            TokenError::BadSignature,
            TokenError::Expired,
            TokenError::NotYetValid,
        ] {
            let response = ApiError::from(err).into_response();
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
            let body = body_json(response).await;
            assert_eq!(body["message"], INVALID_TOKEN);
        }
    }

    #[tokio::test]
    async fn test_credential_errors_collapse() {
        for err in [AuthError::InvalidCredentials, AuthError::Inactive] {
            let body = body_json(ApiError::from(err).into_response()).await;
            assert_eq!(body["error"], "unauthorized");
            assert_eq!(body["message"], INVALID_CREDENTIALS);
        }
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            ApiError::from(TokenError::NotRefreshable).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::from(AuthzError::Forbidden("x".into())).status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            ApiError::from(StoreError::Conflict("email".into())).status(),
            StatusCode::CONFLICT
        );
        assert_eq!(ApiError::from(StoreError::NotFound).status(), StatusCode::NOT_FOUND);
        assert_eq!(
            ApiError::from(PasswordError::HashFailed).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[tokio::test]
    async fn test_internal_detail_is_scrubbed() {
        let err = ApiError::Internal("database: disk I/O error at /var/lib/x".to_string());
        let body = body_json(err.into_response()).await;
        assert_eq!(body["message"], "Internal server error");
        assert!(!body.to_string().contains("/var/lib"));
    }

    #[tokio::test]
    async fn test_forbidden_detail_is_scrubbed() {
        let err = ApiError::Forbidden("permission manage:system required".to_string());
        let body = body_json(err.into_response()).await;
        assert_eq!(body["message"], "Insufficient permissions");
    }

    #[tokio::test]
    async fn test_rate_limited_body() {
        let body = body_json(ApiError::RateLimited { retry_after: 12 }.into_response()).await;
        assert_eq!(body["retry_after"], 12);
        assert!(body.get("details").is_none());
    }
}
