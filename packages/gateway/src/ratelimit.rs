//! Per-identity fixed-window rate limiting.
//!
//! One counter per (identity-or-address, rate class) in the coordination
//! store. The increment is a single atomic round trip; the TTL is applied
//! only by the increment that creates the window. On store failure the
//! limiter fails open.

use std::sync::Arc;
use std::time::Duration;

use axum::http::{HeaderMap, HeaderValue};
use tracing::warn;

use tradeline_contracts::headers;
use tradeline_coordination::{keys, CoordStore};

use crate::config::RateConfig;

/// Outcome of a budget check, carried through to the response headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateDecision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    /// Seconds until the current window expires
    pub reset_secs: u64,
}

impl RateDecision {
    fn fail_open(limit: u32, window: Duration) -> Self {
        Self {
            allowed: true,
            limit,
            remaining: limit.saturating_sub(1),
            reset_secs: window.as_secs(),
        }
    }
}

/// Fixed-window limiter over the coordination store.
pub struct RateLimiter {
    store: Arc<dyn CoordStore>,
    config: RateConfig,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn CoordStore>, config: RateConfig) -> Self {
        Self { store, config }
    }

    /// Count this request against `(identity_key, class)` and decide.
    pub async fn check(&self, identity_key: &str, class: &str) -> RateDecision {
        let limit = self.config.limit_for(class);
        let window = self.config.window();
        let key = keys::ratelimit(identity_key, class);

        let count = match self.store.incr(&key, window).await {
            Ok(count) => count,
            Err(e) => {
                warn!(error = %e, key = %key, "Rate counter unavailable, allowing request");
                return RateDecision::fail_open(limit, window);
            }
        };

        let reset_secs = match self.store.ttl_remaining(&key).await {
            Ok(Some(ttl)) => ttl.as_secs().max(1),
            _ => window.as_secs(),
        };

        if count > u64::from(limit) {
            RateDecision {
                allowed: false,
                limit,
                remaining: 0,
                reset_secs,
            }
        } else {
            RateDecision {
                allowed: true,
                limit,
                remaining: limit.saturating_sub(count as u32),
                reset_secs,
            }
        }
    }
}

/// Attach the standard rate headers. Called after the proxy copies
/// downstream headers so the gateway's values always win.
pub fn apply_headers(map: &mut HeaderMap, decision: &RateDecision) {
    let pairs = [
        (headers::X_RATELIMIT_LIMIT, decision.limit.to_string()),
        (headers::X_RATELIMIT_REMAINING, decision.remaining.to_string()),
        (headers::X_RATELIMIT_RESET, decision.reset_secs.to_string()),
    ];
    for (name, value) in pairs {
        if let Ok(value) = HeaderValue::from_str(&value) {
            map.insert(name, value);
        }
    }
}
