//! Application error handling
//!
//! This module provides unified error handling for the API,
//! converting internal errors to appropriate HTTP responses.
//! Client faults carry a fixed message and a machine-readable `kind`;
//! internal faults are logged here and answered with a generic message.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use livecode_shared::{AuthError, ErrorResponse, FieldError};
use thiserror::Error;
use tracing::error;

use crate::services::FlowError;

pub const INTERNAL_ERROR_MESSAGE: &str = "An unexpected error occurred. Please try again.";

/// API error type that can be converted to HTTP responses
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Validation failed")]
    Validation(Vec<FieldError>),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("{0}")]
    Auth(AuthError),

    #[error("Conflict")]
    Conflict(Vec<FieldError>),

    #[error("Internal server error")]
    Internal(#[from] anyhow::Error),
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        ApiError::Auth(err)
    }
}

impl From<FlowError> for ApiError {
    fn from(err: FlowError) -> Self {
        ApiError::Internal(err.into())
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) | ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Auth(AuthError::RateLimited) => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Auth(AuthError::Validation) => StatusCode::BAD_REQUEST,
            ApiError::Auth(AuthError::DuplicateField) | ApiError::Conflict(_) => {
                StatusCode::CONFLICT
            }
            ApiError::Auth(_) => StatusCode::UNAUTHORIZED,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match self {
            ApiError::Validation(field_errors) => ErrorResponse {
                success: false,
                kind: Some(AuthError::Validation),
                message: AuthError::Validation.to_string(),
                field_errors,
            },
            ApiError::Conflict(field_errors) => ErrorResponse {
                success: false,
                kind: Some(AuthError::DuplicateField),
                message: AuthError::DuplicateField.to_string(),
                field_errors,
            },
            ApiError::Auth(kind) => ErrorResponse {
                success: false,
                kind: Some(kind),
                message: kind.to_string(),
                field_errors: Vec::new(),
            },
            ApiError::BadRequest(message) => ErrorResponse {
                success: false,
                kind: None,
                message,
                field_errors: Vec::new(),
            },
            ApiError::Internal(err) => {
                error!("Internal error: {:?}", err);
                ErrorResponse {
                    success: false,
                    kind: None,
                    message: INTERNAL_ERROR_MESSAGE.to_string(),
                    field_errors: Vec::new(),
                }
            }
        };

        (status, Json(body)).into_response()
    }
}

/// Result type alias for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
