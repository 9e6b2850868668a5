//! Tradeline-Contracts: Shared Data Contracts for the Tradeline Platform
//!
//! This crate provides the schemas shared across the gateway, user, order,
//! inventory, and E2E test packages:
//!
//! - **Types** - Roles, order/ledger enums, entity records, request bodies
//! - **Problem** - RFC-7807 error envelope with validation issue lists
//! - **Codes** - Machine-readable error codes and problem type URIs
//! - **Headers** - Identity and rate-limit header names set by the gateway
//!
//! It intentionally contains no runtime behaviour: no clients, no storage,
//! no I/O. Services depend on it for the wire contract only.

pub mod codes;
pub mod headers;
pub mod problem;
pub mod types;

// Re-export commonly used items at the crate root
pub use problem::{Problem, ValidationIssue};
pub use types::{
    Asset, AuthResponse, BalanceAccount, BalanceTransaction, CreateOrderRequest, DepositRequest,
    HoldingView, InternalBalanceRequest, InternalBalanceResponse, LoginRequest, Order, OrderSide,
    OrderStatus, OrderType, Portfolio, RegisterRequest, Role, TokenClaims, TransactionReceipt,
    TxKind, TxStatus, UserProfile, WithdrawRequest,
};
