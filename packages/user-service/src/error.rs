//! Service error type and its HTTP mapping.

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use tradeline_contracts::{codes, Problem, ValidationIssue};

use crate::ledger::LedgerError;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("validation failed")]
    Validation(Vec<ValidationIssue>),
    #[error("authentication required")]
    Unauthorized(&'static str),
    #[error("not permitted")]
    Forbidden,
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error(transparent)]
    Db(sqlx::Error),
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<sqlx::Error> for ServiceError {
    fn from(e: sqlx::Error) -> Self {
        if let Some(db_err) = e.as_database_error() {
            // 23505 unique_violation, 23503 foreign_key_violation
            match db_err.code().as_deref() {
                Some("23505") => {
                    return ServiceError::Conflict("username or email already registered".into())
                }
                Some("23503") => return ServiceError::NotFound("subject"),
                _ => {}
            }
        }
        ServiceError::Db(e)
    }
}

impl ServiceError {
    fn status_code_detail(&self) -> (StatusCode, &'static str, String) {
        match self {
            ServiceError::Validation(_) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                codes::VALIDATION_FAILED,
                "One or more request fields are invalid".to_string(),
            ),
            ServiceError::Unauthorized(code) => (
                StatusCode::UNAUTHORIZED,
                *code,
                "Authentication failed".to_string(),
            ),
            ServiceError::Forbidden => (
                StatusCode::FORBIDDEN,
                codes::PERM_FORBIDDEN,
                "Not permitted".to_string(),
            ),
            ServiceError::NotFound(what) => (
                StatusCode::NOT_FOUND,
                codes::NOT_FOUND,
                format!("{what} not found"),
            ),
            ServiceError::Conflict(detail) => {
                (StatusCode::CONFLICT, codes::CONFLICT, detail.clone())
            }
            ServiceError::Ledger(err) => match err {
                LedgerError::NonPositiveAmount => (
                    StatusCode::UNPROCESSABLE_ENTITY,
                    codes::VALIDATION_FAILED,
                    "Amount must be positive".to_string(),
                ),
                LedgerError::InsufficientFunds { available } => (
                    StatusCode::UNPROCESSABLE_ENTITY,
                    codes::INSUFFICIENT_FUNDS,
                    format!("Insufficient funds: available {available}"),
                ),
                LedgerError::AccountNotFound => (
                    StatusCode::NOT_FOUND,
                    codes::NOT_FOUND,
                    "Balance account not found".to_string(),
                ),
                LedgerError::LockContention => (
                    StatusCode::SERVICE_UNAVAILABLE,
                    codes::LOCK_TIMEOUT,
                    "Account busy, retry with backoff".to_string(),
                ),
                LedgerError::LostUpdate => (
                    StatusCode::SERVICE_UNAVAILABLE,
                    codes::SERVICE_UNAVAILABLE,
                    "Concurrent balance update detected, retry".to_string(),
                ),
                LedgerError::Db(_) | LedgerError::Lock(_) => (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    codes::INTERNAL,
                    "The request could not be processed".to_string(),
                ),
            },
            ServiceError::Db(_) | ServiceError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                codes::INTERNAL,
                "The request could not be processed".to_string(),
            ),
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let (status, code, detail) = self.status_code_detail();
        let mut problem = Problem::new(
            status.as_u16(),
            code,
            status.canonical_reason().unwrap_or("Error"),
            detail,
        );
        if let ServiceError::Validation(issues) = self {
            problem = problem.with_errors(issues);
        }

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

#[cfg(test)]
mod tests {
    use super::*;
    use bigdecimal::BigDecimal;

    #[test]
    fn test_insufficient_funds_maps_to_422() {
        let err = ServiceError::Ledger(LedgerError::InsufficientFunds {
            available: BigDecimal::from(20),
        });
        let (status, code, detail) = err.status_code_detail();
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(code, codes::INSUFFICIENT_FUNDS);
        assert!(detail.contains("20"));
    }

    #[test]
    fn test_lock_contention_maps_to_503() {
        let err = ServiceError::Ledger(LedgerError::LockContention);
        let (status, code, _) = err.status_code_detail();
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(code, codes::LOCK_TIMEOUT);
    }

    #[test]
    fn test_internal_errors_stay_generic() {
        let err = ServiceError::Internal("connection pool exhausted".to_string());
        let (_, _, detail) = err.status_code_detail();
        assert!(!detail.contains("pool"));
    }
}
