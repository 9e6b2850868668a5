//! Well-known key prefixes in the coordination store.
//!
//! Every component builds keys through these helpers; nothing else may write
//! to the store. Operators clear `login_fail:` and `ip_block:` pairs together
//! when lifting a block.

pub const LOGIN_FAIL_PREFIX: &str = "login_fail:";
pub const IP_BLOCK_PREFIX: &str = "ip_block:";
pub const RATELIMIT_PREFIX: &str = "ratelimit:";
pub const LOCK_PREFIX: &str = "lock:";
pub const DENYLIST_PREFIX: &str = "denylist:";
pub const CACHE_PREFIX: &str = "cache:";

/// Failed-login counter for a source address
pub fn login_fail(source_address: &str) -> String {
    format!("{LOGIN_FAIL_PREFIX}{source_address}")
}

/// Active block marker for a source address
pub fn ip_block(source_address: &str) -> String {
    format!("{IP_BLOCK_PREFIX}{source_address}")
}

/// Fixed-window counter for (identity-or-address, rate class)
pub fn ratelimit(identity: &str, class: &str) -> String {
    format!("{RATELIMIT_PREFIX}{class}:{identity}")
}

/// Named lock (e.g. `user:<subject>`)
pub fn lock(name: &str) -> String {
    format!("{LOCK_PREFIX}{name}")
}

/// Revoked-token marker, keyed by token fingerprint
pub fn denylist(token_fingerprint: &str) -> String {
    format!("{DENYLIST_PREFIX}{token_fingerprint}")
}

/// Response-cache entry. The subject is part of the key so authenticated
/// responses never leak across users.
pub fn cache(method: &str, path_and_query: &str, subject: &str) -> String {
    format!("{CACHE_PREFIX}{method}:{subject}:{path_and_query}")
}
