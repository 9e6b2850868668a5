//! Tradeline-Coordination: Shared Coordination Layer for the Tradeline Platform
//!
//! This crate provides the coordination primitives shared by the gateway and
//! the backend services:
//!
//! - **Store** - `CoordStore`, the typed client contract for the shared
//!   in-memory store: atomic counters with create-time TTL, set-with-TTL,
//!   set-if-absent, and compare-and-delete
//! - **Memory** - `MemoryStore`, the bundled single-node backend
//! - **Lock** - named, owner-scoped distributed locks with TTL and capped
//!   exponential retry
//! - **Keys** - the well-known key prefixes every component must use
//!
//! The concrete production backend is free; anything honoring the
//! `CoordStore` atomicity contract can be substituted at process startup.

pub mod keys;
pub mod lock;
pub mod memory;
pub mod store;

// Re-export commonly used items at the crate root
pub use lock::{LockError, LockManager, LockOwner};
pub use memory::MemoryStore;
pub use store::{CoordStore, StoreError};
