//! Machine-readable error codes and RFC-7807 problem type URIs.
//!
//! Clients switch on `code`; the `type` URI identifies the problem class.

/// Base URI for problem types
pub const PROBLEM_BASE: &str = "https://tradeline.dev/problems";

// Authentication (401)
pub const AUTH_MISSING: &str = "AUTH_MISSING";
pub const AUTH_MALFORMED: &str = "AUTH_MALFORMED";
pub const AUTH_EXPIRED: &str = "AUTH_EXPIRED";
pub const AUTH_REVOKED: &str = "AUTH_REVOKED";
pub const AUTH_INVALID: &str = "AUTH_INVALID";

// Authorization (403)
pub const PERM_FORBIDDEN: &str = "PERM_FORBIDDEN";
pub const IP_BLOCKED: &str = "IP_BLOCKED";

// Validation (422)
pub const VALIDATION_FAILED: &str = "VALIDATION_FAILED";
pub const INSUFFICIENT_FUNDS: &str = "INSUFFICIENT_FUNDS";

// Not found (404)
pub const NOT_FOUND: &str = "NOT_FOUND";

// Conflict (409)
pub const CONFLICT: &str = "CONFLICT";

// Rate limiting (429)
pub const RATE_LIMITED: &str = "RATE_LIMITED";

// Service unavailable (503)
pub const SERVICE_UNAVAILABLE: &str = "SERVICE_UNAVAILABLE";
pub const LOCK_TIMEOUT: &str = "LOCK_TIMEOUT";

// Gateway errors (502/504)
pub const UPSTREAM_ERROR: &str = "UPSTREAM_ERROR";
pub const UPSTREAM_TIMEOUT: &str = "UPSTREAM_TIMEOUT";

// Internal (500)
pub const INTERNAL: &str = "INTERNAL";

/// Problem type path segment for a given error code
pub fn problem_type(code: &str) -> String {
    let segment = match code {
        // IP blocks are grouped with authentication problems: the block is
        // armed by failed logins and lifted by the auth operators.
        AUTH_MISSING | AUTH_MALFORMED | AUTH_EXPIRED | AUTH_REVOKED | AUTH_INVALID
        | IP_BLOCKED => "authentication-error",
        PERM_FORBIDDEN => "authorization-error",
        VALIDATION_FAILED | INSUFFICIENT_FUNDS => "validation-error",
        NOT_FOUND => "not-found",
        CONFLICT => "conflict",
        RATE_LIMITED => "rate-limited",
        SERVICE_UNAVAILABLE | LOCK_TIMEOUT => "service-unavailable",
        UPSTREAM_ERROR | UPSTREAM_TIMEOUT => "gateway-error",
        _ => "internal-error",
    };
    format!("{PROBLEM_BASE}/{segment}")
}
