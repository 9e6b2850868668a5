//! Service error type and its HTTP mapping.

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use tradeline_contracts::{codes, Problem, ValidationIssue};

use crate::commit::CommitError;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("authentication required")]
    Unauthorized(&'static str),
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error(transparent)]
    Commit(#[from] CommitError),
    #[error(transparent)]
    Db(#[from] sqlx::Error),
}

impl ServiceError {
    fn parts(&self) -> (StatusCode, &'static str, String, Vec<ValidationIssue>) {
        match self {
            ServiceError::Unauthorized(code) => (
                StatusCode::UNAUTHORIZED,
                *code,
                "Authentication failed".to_string(),
                Vec::new(),
            ),
            ServiceError::NotFound(what) => (
                StatusCode::NOT_FOUND,
                codes::NOT_FOUND,
                format!("{what} not found"),
                Vec::new(),
            ),
            ServiceError::Commit(err) => match err {
                CommitError::Validation(issues) => (
                    StatusCode::UNPROCESSABLE_ENTITY,
                    codes::VALIDATION_FAILED,
                    "One or more request fields are invalid".to_string(),
                    issues.clone(),
                ),
                CommitError::InsufficientFunds => (
                    StatusCode::UNPROCESSABLE_ENTITY,
                    codes::INSUFFICIENT_FUNDS,
                    "Balance is insufficient for this order".to_string(),
                    Vec::new(),
                ),
                CommitError::InsufficientHoldings => (
                    StatusCode::UNPROCESSABLE_ENTITY,
                    codes::VALIDATION_FAILED,
                    "Holdings are insufficient for this sell order".to_string(),
                    Vec::new(),
                ),
                CommitError::LockContention => (
                    StatusCode::SERVICE_UNAVAILABLE,
                    codes::LOCK_TIMEOUT,
                    "Account busy, retry with backoff".to_string(),
                    Vec::new(),
                ),
                CommitError::Balance(_) | CommitError::Inventory(_) => (
                    StatusCode::SERVICE_UNAVAILABLE,
                    codes::SERVICE_UNAVAILABLE,
                    "A dependent service is unavailable, retry with backoff".to_string(),
                    Vec::new(),
                ),
                CommitError::Db(_) | CommitError::Lock(_) => (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    codes::INTERNAL,
                    "The request could not be processed".to_string(),
                    Vec::new(),
                ),
            },
            ServiceError::Db(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                codes::INTERNAL,
                "The request could not be processed".to_string(),
                Vec::new(),
            ),
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let (status, code, detail, issues) = self.parts();
        let problem = Problem::new(
            status.as_u16(),
            code,
            status.canonical_reason().unwrap_or("Error"),
            detail,
        )
        .with_errors(issues);

        let mut response = (
            status,
            axum::Json(serde_json::to_value(&problem).unwrap_or_default()),
        )
            .into_response();
        response.headers_mut().insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/problem+json"),
        );
        response
    }
}
