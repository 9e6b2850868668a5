//! Typed client contract for the shared coordination store.
//!
//! The store is the only shared-mutable resource in the platform. Each method
//! is a single atomic round trip; callers must not compose multi-step
//! read-modify-write sequences on top of `get`/`set`.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

/// Errors surfaced by a store backend.
///
/// Callers decide the failure policy: the rate limiter fails open on any
/// store error, lock users surface it as unavailability.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store backend error: {0}")]
    Backend(String),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Atomic primitives of the coordination store.
///
/// TTL semantics: an expired key is indistinguishable from an absent key.
/// `incr` applies the TTL only on the increment that creates the key, so a
/// busy counter's window is never extended by traffic.
#[async_trait]
pub trait CoordStore: Send + Sync {
    /// Atomically increment the counter at `key`, creating it at 1 with
    /// `ttl` when absent. Returns the post-increment value.
    async fn incr(&self, key: &str, ttl: Duration) -> Result<u64, StoreError>;

    /// Read the value at `key`, if present and unexpired.
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Write `value` at `key`. `ttl = None` means no expiry.
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError>;

    /// Set `key` to `value` with `ttl` only if the key is absent.
    /// Returns true when this call created the key.
    async fn set_nx(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, StoreError>;

    /// Delete `key`. Returns true when a live key was removed.
    async fn delete(&self, key: &str) -> Result<bool, StoreError>;

    /// Delete `key` only if its current value equals `expected`.
    /// Returns true when the delete happened.
    async fn compare_and_delete(&self, key: &str, expected: &str) -> Result<bool, StoreError>;

    /// Reset the TTL of `key` to `ttl` only if its current value equals
    /// `expected`. Returns true when the expiry was extended.
    async fn compare_and_expire(
        &self,
        key: &str,
        expected: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError>;

    /// Remaining lifetime of `key`, `None` if absent/expired or without TTL.
    async fn ttl_remaining(&self, key: &str) -> Result<Option<Duration>, StoreError>;

    /// True if `key` is present and unexpired.
    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.get(key).await?.is_some())
    }
}
