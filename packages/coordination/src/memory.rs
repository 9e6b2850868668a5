//! In-process `CoordStore` backend.
//!
//! A mutex-guarded map with per-entry expiry. Every operation takes the lock
//! once, which gives the atomicity the trait demands. Expired entries are
//! dropped lazily on access and swept wholesale once the map grows past a
//! threshold, so idle keys cannot accumulate without bound.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;

use crate::store::{CoordStore, StoreError};

/// Map size above which writes trigger a full sweep of expired entries.
const SWEEP_THRESHOLD: usize = 10_000;

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// Single-node coordination store.
#[derive(Default)]
pub struct MemoryStore {
    map: Mutex<HashMap<String, Entry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live entries (test and metrics helper).
    pub fn len(&self) -> usize {
        let now = Instant::now();
        let map = self.map.lock().expect("store mutex poisoned");
        map.values().filter(|e| !e.is_expired(now)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn sweep_if_large(map: &mut HashMap<String, Entry>, now: Instant) {
        if map.len() > SWEEP_THRESHOLD {
            map.retain(|_, entry| !entry.is_expired(now));
        }
    }

    /// Remove the entry for `key` if expired; returns a live entry clone.
    fn live_entry(map: &mut HashMap<String, Entry>, key: &str, now: Instant) -> Option<Entry> {
        match map.get(key) {
            Some(entry) if entry.is_expired(now) => {
                map.remove(key);
                None
            }
            Some(entry) => Some(entry.clone()),
            None => None,
        }
    }
}

#[async_trait]
impl CoordStore for MemoryStore {
    async fn incr(&self, key: &str, ttl: Duration) -> Result<u64, StoreError> {
        let now = Instant::now();
        let mut map = self.map.lock().expect("store mutex poisoned");
        Self::sweep_if_large(&mut map, now);

        match Self::live_entry(&mut map, key, now) {
            Some(entry) => {
                let current: u64 = entry.value.parse().map_err(|_| {
                    StoreError::Backend(format!("key {key} holds a non-counter value"))
                })?;
                let next = current.saturating_add(1);
                map.insert(
                    key.to_string(),
                    Entry {
                        value: next.to_string(),
                        // TTL set by the creating increment only
                        expires_at: entry.expires_at,
                    },
                );
                Ok(next)
            }
            None => {
                map.insert(
                    key.to_string(),
                    Entry {
                        value: "1".to_string(),
                        expires_at: Some(now + ttl),
                    },
                );
                Ok(1)
            }
        }
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let now = Instant::now();
        let mut map = self.map.lock().expect("store mutex poisoned");
        Ok(Self::live_entry(&mut map, key, now).map(|e| e.value))
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError> {
        let now = Instant::now();
        let mut map = self.map.lock().expect("store mutex poisoned");
        Self::sweep_if_large(&mut map, now);
        map.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: ttl.map(|t| now + t),
            },
        );
        Ok(())
    }

    async fn set_nx(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, StoreError> {
        let now = Instant::now();
        let mut map = self.map.lock().expect("store mutex poisoned");
        Self::sweep_if_large(&mut map, now);

        if Self::live_entry(&mut map, key, now).is_some() {
            return Ok(false);
        }
        map.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: Some(now + ttl),
            },
        );
        Ok(true)
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let now = Instant::now();
        let mut map = self.map.lock().expect("store mutex poisoned");
        let was_live = Self::live_entry(&mut map, key, now).is_some();
        map.remove(key);
        Ok(was_live)
    }

    async fn compare_and_delete(&self, key: &str, expected: &str) -> Result<bool, StoreError> {
        let now = Instant::now();
        let mut map = self.map.lock().expect("store mutex poisoned");
        match Self::live_entry(&mut map, key, now) {
            Some(entry) if entry.value == expected => {
                map.remove(key);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn compare_and_expire(
        &self,
        key: &str,
        expected: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        let now = Instant::now();
        let mut map = self.map.lock().expect("store mutex poisoned");
        match Self::live_entry(&mut map, key, now) {
            Some(entry) if entry.value == expected => {
                map.insert(
                    key.to_string(),
                    Entry {
                        value: entry.value,
                        expires_at: Some(now + ttl),
                    },
                );
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn ttl_remaining(&self, key: &str) -> Result<Option<Duration>, StoreError> {
        let now = Instant::now();
        let mut map = self.map.lock().expect("store mutex poisoned");
        Ok(Self::live_entry(&mut map, key, now)
            .and_then(|e| e.expires_at)
            .map(|at| at.saturating_duration_since(now)))
    }
}
