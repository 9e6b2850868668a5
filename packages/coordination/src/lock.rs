//! Named, owner-scoped distributed locks.
//!
//! A lock is a `lock:<name>` key holding a fresh random owner id with the
//! lock TTL. Acquisition is atomic set-if-absent with capped exponential
//! retry until `wait_max`; release is compare-and-delete so only the owner
//! can free it. Fairness is not guaranteed; starvation is bounded by
//! `wait_max` only.

use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::keys;
use crate::store::{CoordStore, StoreError};

/// First retry delay after a contended acquisition attempt.
const INITIAL_BACKOFF: Duration = Duration::from_millis(25);

/// Retry delay cap.
const MAX_BACKOFF: Duration = Duration::from_millis(400);

/// Backoff multiplier per attempt.
const BACKOFF_MULTIPLIER: f64 = 2.0;

#[derive(Debug, Error)]
pub enum LockError {
    #[error("lock {name} not acquired within {waited_ms} ms")]
    Timeout { name: String, waited_ms: u64 },
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Proof of a successful acquisition. Holders must stop mutating shared
/// state once `is_live()` turns false, even mid-operation.
#[derive(Debug, Clone)]
pub struct LockOwner {
    pub name: String,
    pub owner_id: String,
    pub acquired_at: Instant,
    pub ttl: Duration,
}

impl LockOwner {
    /// True while the TTL has not elapsed locally. The store may expire the
    /// key slightly later; this side is the conservative one.
    pub fn is_live(&self) -> bool {
        self.acquired_at.elapsed() < self.ttl
    }
}

/// Calculate retry delay for a given attempt (0-indexed)
fn backoff_for_attempt(attempt: u32) -> Duration {
    let backoff_secs =
        INITIAL_BACKOFF.as_secs_f64() * BACKOFF_MULTIPLIER.powi(attempt.min(16) as i32);
    let capped = backoff_secs.min(MAX_BACKOFF.as_secs_f64());
    Duration::from_secs_f64(capped)
}

/// Lock manager over a coordination store.
#[derive(Clone)]
pub struct LockManager {
    store: Arc<dyn CoordStore>,
}

impl LockManager {
    pub fn new(store: Arc<dyn CoordStore>) -> Self {
        Self { store }
    }

    /// Acquire `name` with `ttl`, retrying with capped exponential backoff
    /// until `wait_max` elapses.
    pub async fn acquire(
        &self,
        name: &str,
        ttl: Duration,
        wait_max: Duration,
    ) -> Result<LockOwner, LockError> {
        let key = keys::lock(name);
        let owner_id = Uuid::new_v4().to_string();
        let started = Instant::now();
        let mut attempt: u32 = 0;

        loop {
            if self.store.set_nx(&key, &owner_id, ttl).await? {
                debug!(lock = %name, owner = %owner_id, attempt, "Lock acquired");
                return Ok(LockOwner {
                    name: name.to_string(),
                    owner_id,
                    acquired_at: Instant::now(),
                    ttl,
                });
            }

            let elapsed = started.elapsed();
            if elapsed >= wait_max {
                debug!(lock = %name, waited_ms = elapsed.as_millis() as u64, "Lock wait exhausted");
                return Err(LockError::Timeout {
                    name: name.to_string(),
                    waited_ms: elapsed.as_millis() as u64,
                });
            }

            let backoff = backoff_for_attempt(attempt).min(wait_max - elapsed);
            tokio::time::sleep(backoff).await;
            attempt += 1;
        }
    }

    /// Release an owned lock. Releasing a lost or expired lock is a silent
    /// no-op: the key is already gone or owned by someone else.
    pub async fn release(&self, owner: &LockOwner) -> Result<(), LockError> {
        let key = keys::lock(&owner.name);
        let released = self.store.compare_and_delete(&key, &owner.owner_id).await?;
        if !released {
            warn!(lock = %owner.name, owner = %owner.owner_id, "Release of lost lock ignored");
        }
        Ok(())
    }

    /// True if `name` is currently held by `owner_id`. Lets a callee verify
    /// a lock the caller claims to hold before skipping its own acquisition.
    pub async fn is_held(&self, name: &str, owner_id: &str) -> Result<bool, LockError> {
        let key = keys::lock(name);
        Ok(self.store.get(&key).await?.as_deref() == Some(owner_id))
    }

    /// Extend the TTL of a still-owned lock. Returns false when the lock was
    /// already lost.
    pub async fn heartbeat(&self, owner: &mut LockOwner, ttl: Duration) -> Result<bool, LockError> {
        let key = keys::lock(&owner.name);
        let extended = self
            .store
            .compare_and_expire(&key, &owner.owner_id, ttl)
            .await?;
        if extended {
            owner.acquired_at = Instant::now();
            owner.ttl = ttl;
        }
        Ok(extended)
    }
}
