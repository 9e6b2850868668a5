//! Gateway-edge error type and its HTTP mapping.
//!
//! Components return typed errors; translation to status codes and RFC-7807
//! bodies happens here, at the edge only.

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use tradeline_contracts::{codes, Problem};

use crate::auth::AuthError;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error("role not permitted on this route")]
    Forbidden,
    #[error("source address is blocked")]
    IpBlocked,
    #[error("no route for this method and path")]
    RouteNotFound,
    #[error("rate limit exceeded")]
    RateLimited,
    #[error("downstream {downstream} unavailable")]
    BreakerOpen {
        downstream: &'static str,
        retry_after_secs: u64,
    },
    #[error("downstream {downstream} timed out")]
    UpstreamTimeout { downstream: &'static str },
    #[error("downstream {downstream} unreachable")]
    UpstreamUnreachable { downstream: &'static str },
    #[error("request body too large")]
    BodyTooLarge,
    #[error("internal gateway error: {0}")]
    Internal(String),
}

impl GatewayError {
    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::Auth(_) => StatusCode::UNAUTHORIZED,
            GatewayError::Forbidden | GatewayError::IpBlocked => StatusCode::FORBIDDEN,
            GatewayError::RouteNotFound => StatusCode::NOT_FOUND,
            GatewayError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            GatewayError::BreakerOpen { .. } => StatusCode::SERVICE_UNAVAILABLE,
            GatewayError::UpstreamTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            GatewayError::UpstreamUnreachable { .. } => StatusCode::BAD_GATEWAY,
            GatewayError::BodyTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            GatewayError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            GatewayError::Auth(AuthError::Missing) => codes::AUTH_MISSING,
            GatewayError::Auth(AuthError::Malformed) => codes::AUTH_MALFORMED,
            GatewayError::Auth(AuthError::BadSignature) => codes::AUTH_INVALID,
            GatewayError::Auth(AuthError::Expired) => codes::AUTH_EXPIRED,
            GatewayError::Auth(AuthError::Revoked) => codes::AUTH_REVOKED,
            GatewayError::Forbidden => codes::PERM_FORBIDDEN,
            GatewayError::IpBlocked => codes::IP_BLOCKED,
            GatewayError::RouteNotFound => codes::NOT_FOUND,
            GatewayError::RateLimited => codes::RATE_LIMITED,
            GatewayError::BreakerOpen { .. } => codes::SERVICE_UNAVAILABLE,
            GatewayError::UpstreamTimeout { .. } => codes::UPSTREAM_TIMEOUT,
            GatewayError::UpstreamUnreachable { .. } => codes::UPSTREAM_ERROR,
            GatewayError::BodyTooLarge => codes::VALIDATION_FAILED,
            GatewayError::Internal(_) => codes::INTERNAL,
        }
    }

    fn detail(&self) -> String {
        match self {
            GatewayError::IpBlocked => {
                "Source address is temporarily blocked after repeated failed logins".to_string()
            }
            GatewayError::Internal(_) => "The request could not be processed".to_string(),
            other => other.to_string(),
        }
    }

    /// Build the problem body for this error.
    pub fn problem(&self, instance: &str) -> Problem {
        let status = self.status();
        Problem::new(
            status.as_u16(),
            self.code(),
            status.canonical_reason().unwrap_or("Error"),
            self.detail(),
        )
        .with_instance(instance)
    }

    /// Render with the request path as the problem `instance`.
    pub fn into_response_for(self, instance: &str) -> Response {
        let problem = self.problem(instance);
        let mut response = (
            self.status(),
            axum::Json(serde_json::to_value(&problem).unwrap_or_default()),
        )
            .into_response();
        response.headers_mut().insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/problem+json"),
        );
        if let GatewayError::BreakerOpen {
            retry_after_secs, ..
        } = self
        {
            if let Ok(value) = HeaderValue::from_str(&retry_after_secs.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        self.into_response_for("")
    }
}
