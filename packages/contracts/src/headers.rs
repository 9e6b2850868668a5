//! Header names set by the gateway and trusted by downstream services.

/// Correlation id, generated by the gateway when absent.
pub const X_REQUEST_ID: &str = "x-request-id";

/// Authenticated subject, injected by the gateway after token verification.
pub const X_USER_SUBJECT: &str = "x-user-subject";

/// Authenticated role, injected alongside the subject.
pub const X_USER_ROLE: &str = "x-user-role";

/// Shared secret for service-to-service internal endpoints.
pub const X_INTERNAL_TOKEN: &str = "x-internal-token";

/// Rate-limit response headers (spec: survive the proxy copy).
pub const X_RATELIMIT_LIMIT: &str = "x-ratelimit-limit";
pub const X_RATELIMIT_REMAINING: &str = "x-ratelimit-remaining";
pub const X_RATELIMIT_RESET: &str = "x-ratelimit-reset";
