//! Tradeline User Service
//!
//! Owns user accounts, bearer-token issuance, and the balance ledger. Public
//! routes are reached through the gateway; the `/internal` ledger endpoints
//! serve the order service during order commit.
//!
//! The binary wires the router from [`config::Config`]; the library exists
//! so integration tests can drive the ledger against a real database.

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod ledger;
pub mod tokens;
