use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::error::CommerceError;
use crate::services::AuthFailure;

/// Everything a handler can fail with, rendered as
/// `{"success": false, "error": ..., "code": ...}`.
#[derive(Debug)]
pub enum ApiError {
    Commerce(CommerceError),
    Auth(AuthFailure),
    Forbidden(String),
    BadRequest(String),
}

impl ApiError {
    pub fn forbidden(message: impl Into<String>) -> Self {
        ApiError::Forbidden(message.into())
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError::BadRequest(message.into())
    }

    pub fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::Commerce(e) => match e {
                CommerceError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
                CommerceError::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
                CommerceError::Conflict(_) => (StatusCode::CONFLICT, "CONFLICT"),
                CommerceError::CouponRejected(r) => (StatusCode::BAD_REQUEST, r.code()),
                CommerceError::InvalidTransition { .. } => (StatusCode::UNPROCESSABLE_ENTITY, "INVALID_TRANSITION"),
                CommerceError::InsufficientStock(_) => (StatusCode::CONFLICT, "INSUFFICIENT_STOCK"),
                CommerceError::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
                CommerceError::Forbidden(_) => (StatusCode::FORBIDDEN, "FORBIDDEN"),
                CommerceError::Storage(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
            },
            ApiError::Auth(AuthFailure::UserDeactivated) => (StatusCode::FORBIDDEN, AuthFailure::UserDeactivated.code()),
            ApiError::Auth(f) => (StatusCode::UNAUTHORIZED, f.code()),
            ApiError::Forbidden(_) => (StatusCode::FORBIDDEN, "FORBIDDEN"),
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
        }
    }
}

impl From<CommerceError> for ApiError {
    fn from(error: CommerceError) -> Self {
        ApiError::Commerce(error)
    }
}

impl From<AuthFailure> for ApiError {
    fn from(failure: AuthFailure) -> Self {
        ApiError::Auth(failure)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        let message = match &self {
            ApiError::Commerce(CommerceError::Storage(e)) => {
                tracing::error!(error = %e, "Request failed on storage");
                "Internal server error".to_string()
            }
            ApiError::Commerce(e) => e.to_string(),
            ApiError::Auth(f) => f.to_string(),
            ApiError::Forbidden(m) | ApiError::BadRequest(m) => m.clone(),
        };
        (status, Json(json!({ "success": false, "error": message, "code": code }))).into_response()
    }
}

pub type ApiResult = Result<Response, ApiError>;
