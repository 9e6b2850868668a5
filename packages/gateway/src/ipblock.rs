//! Source-address abuse blocking.
//!
//! Failed logins are counted per address in the coordination store; once the
//! threshold is reached a block key is armed with the same TTL and every
//! request from that address is rejected before any other processing.
//! Operators lift a block by clearing both keys; clearing only one re-arms
//! the block on the next failure.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{info, warn};

use tradeline_coordination::{keys, CoordStore, StoreError};

use crate::config::BlockConfig;

pub struct IpBlockGuard {
    store: Arc<dyn CoordStore>,
    threshold: u32,
    duration: Duration,
}

impl IpBlockGuard {
    pub fn new(store: Arc<dyn CoordStore>, config: &BlockConfig) -> Self {
        Self {
            store,
            threshold: config.threshold,
            duration: config.duration(),
        }
    }

    /// True if the address currently carries a block. Fails open on store
    /// errors: an unreadable block list must not take the whole edge down.
    pub async fn is_blocked(&self, source_address: &str) -> bool {
        match self.store.exists(&keys::ip_block(source_address)).await {
            Ok(blocked) => blocked,
            Err(e) => {
                warn!(error = %e, source = %source_address, "Block lookup failed, allowing");
                false
            }
        }
    }

    /// Count a failed login for the address; arms the block once the
    /// threshold is reached. Returns the running failure count.
    pub async fn record_login_failure(&self, source_address: &str) -> Result<u32, StoreError> {
        let count = self
            .store
            .incr(&keys::login_fail(source_address), self.duration)
            .await?;

        if count >= u64::from(self.threshold) {
            self.store
                .set(
                    &keys::ip_block(source_address),
                    &Utc::now().to_rfc3339(),
                    Some(self.duration),
                )
                .await?;
            info!(
                source = %source_address,
                failures = count,
                block_secs = self.duration.as_secs(),
                "Source address blocked after repeated login failures"
            );
        }

        Ok(count as u32)
    }

    /// Operator action: clear both the block and the failure counter.
    pub async fn clear(&self, source_address: &str) -> Result<(), StoreError> {
        self.store.delete(&keys::ip_block(source_address)).await?;
        self.store.delete(&keys::login_fail(source_address)).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tradeline_coordination::MemoryStore;

    fn guard(threshold: u32, duration_secs: u64) -> IpBlockGuard {
        IpBlockGuard::new(
            Arc::new(MemoryStore::new()),
            &BlockConfig {
                threshold,
                duration_secs,
            },
        )
    }

    #[tokio::test]
    async fn test_block_arms_at_threshold() {
        let guard = guard(5, 86_400);
        for i in 1..=4 {
            assert_eq!(guard.record_login_failure("10.0.0.1").await.unwrap(), i);
            assert!(!guard.is_blocked("10.0.0.1").await);
        }
        assert_eq!(guard.record_login_failure("10.0.0.1").await.unwrap(), 5);
        assert!(guard.is_blocked("10.0.0.1").await);
    }

    #[tokio::test]
    async fn test_addresses_are_independent() {
        let guard = guard(2, 86_400);
        guard.record_login_failure("10.0.0.1").await.unwrap();
        guard.record_login_failure("10.0.0.1").await.unwrap();
        assert!(guard.is_blocked("10.0.0.1").await);
        assert!(!guard.is_blocked("10.0.0.2").await);
    }

    #[tokio::test]
    async fn test_clear_lifts_block_and_counter() {
        let guard = guard(2, 86_400);
        guard.record_login_failure("10.0.0.1").await.unwrap();
        guard.record_login_failure("10.0.0.1").await.unwrap();
        assert!(guard.is_blocked("10.0.0.1").await);

        guard.clear("10.0.0.1").await.unwrap();
        assert!(!guard.is_blocked("10.0.0.1").await);
        // Counter restarted: one more failure does not re-arm a threshold of 2
        assert_eq!(guard.record_login_failure("10.0.0.1").await.unwrap(), 1);
        assert!(!guard.is_blocked("10.0.0.1").await);
    }

    #[tokio::test]
    async fn test_failures_after_threshold_keep_block_armed() {
        let guard = guard(2, 86_400);
        guard.record_login_failure("10.0.0.1").await.unwrap();
        guard.record_login_failure("10.0.0.1").await.unwrap();
        guard.record_login_failure("10.0.0.1").await.unwrap();
        assert!(guard.is_blocked("10.0.0.1").await);
    }

    #[tokio::test]
    async fn test_block_expires_with_ttl() {
        let guard = IpBlockGuard::new(
            Arc::new(MemoryStore::new()),
            &BlockConfig {
                threshold: 1,
                duration_secs: 1,
            },
        );
        guard.record_login_failure("10.0.0.9").await.unwrap();
        assert!(guard.is_blocked("10.0.0.9").await);
        tokio::time::sleep(Duration::from_millis(1100)).await;
        assert!(!guard.is_blocked("10.0.0.9").await);
    }
}
