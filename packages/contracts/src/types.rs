use std::fmt;
use std::str::FromStr;

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Authorization role carried in the bearer token and the `X-User-Role`
/// header. Ordered: each role includes the privileges of the ones before it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Public,
    Customer,
    Vip,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Public => "public",
            Role::Customer => "customer",
            Role::Vip => "vip",
            Role::Admin => "admin",
        }
    }

    /// True if this role grants at least the privileges of `required`.
    pub fn at_least(&self, required: Role) -> bool {
        *self >= required
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "public" => Ok(Role::Public),
            "customer" => Ok(Role::Customer),
            "vip" => Ok(Role::Vip),
            "admin" => Ok(Role::Admin),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

/// Buy or sell side of an order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderSide::Buy => "buy",
            OrderSide::Sell => "sell",
        }
    }
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Order execution type. Limit orders are recorded but never matched; the
/// pending-limit index exists for downstream consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum OrderType {
    Market,
    Limit,
}

impl OrderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderType::Market => "market",
            OrderType::Limit => "limit",
        }
    }
}

impl fmt::Display for OrderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Processing status for orders
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Completed,
    Failed,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Completed => "completed",
            OrderStatus::Failed => "failed",
            OrderStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of a ledger transaction. `OrderDebit`/`OrderCredit` are linked to an
/// order id; the signed sum of completed kinds equals the account balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TxKind {
    Deposit,
    Withdraw,
    OrderDebit,
    OrderCredit,
}

impl TxKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TxKind::Deposit => "deposit",
            TxKind::Withdraw => "withdraw",
            TxKind::OrderDebit => "order_debit",
            TxKind::OrderCredit => "order_credit",
        }
    }

    /// Sign applied when summing the ledger: credits +1, debits -1.
    pub fn sign(&self) -> i8 {
        match self {
            TxKind::Deposit | TxKind::OrderCredit => 1,
            TxKind::Withdraw | TxKind::OrderDebit => -1,
        }
    }
}

impl fmt::Display for TxKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Processing status for ledger transactions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum TxStatus {
    Pending,
    Completed,
    Failed,
}

impl TxStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TxStatus::Pending => "pending",
            TxStatus::Completed => "completed",
            TxStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for TxStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Claims carried in a Tradeline bearer token. Issued by the user service,
/// verified by the gateway; both sides share this shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Subject (stable user id / username)
    pub sub: String,
    /// Role for authorization
    pub role: String,
    /// Issued at (unix seconds)
    pub iat: i64,
    /// Expiration (unix seconds)
    pub exp: i64,
    /// Token id, unique per issuance
    pub jti: String,
}

/// Public user profile as returned by `/auth/me`
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct UserProfile {
    pub subject: String,
    pub email: String,
    pub role: String,
    pub created_at: DateTime<Utc>,
}

/// A tradable asset in the inventory catalog
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Asset {
    pub asset_id: String,
    pub name: String,
    pub category: String,
    pub unit_price: BigDecimal,
    pub available: bool,
}

/// A user's balance account. `current_amount` is non-negative after every
/// committed transaction.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct BalanceAccount {
    pub subject: String,
    pub current_amount: BigDecimal,
    pub updated_at: DateTime<Utc>,
}

/// An append-only ledger entry
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct BalanceTransaction {
    pub transaction_id: Uuid,
    pub subject: String,
    pub kind: TxKind,
    pub amount: BigDecimal,
    pub status: TxStatus,
    pub created_at: DateTime<Utc>,
    pub linked_order_id: Option<Uuid>,
}

/// A recorded order. Orders are recorded, not matched.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Order {
    pub order_id: Uuid,
    pub subject: String,
    pub asset_id: String,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub quantity: BigDecimal,
    pub unit_price: BigDecimal,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
}

/// Token + profile pair returned by register and login
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: UserProfile,
}

/// Receipt for a completed ledger write
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionReceipt {
    pub transaction_id: Uuid,
    pub current_amount: BigDecimal,
}

/// Internal ledger mutation, sent by the order service while it holds the
/// user lock. `lock_owner` is the held lock's owner id; the ledger verifies
/// it before skipping its own acquisition.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InternalBalanceRequest {
    pub subject: String,
    pub amount: BigDecimal,
    pub kind: TxKind,
    pub linked_order_id: Option<Uuid>,
    pub lock_owner: Option<String>,
}

/// Response to an internal ledger mutation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InternalBalanceResponse {
    pub transaction_id: Uuid,
}

/// One position in a portfolio view
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HoldingView {
    pub asset_id: String,
    pub quantity: BigDecimal,
}

/// Portfolio view returned by `GET /portfolio/{subject}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Portfolio {
    pub subject: String,
    pub holdings: Vec<HoldingView>,
}

/// Body of `POST /auth/register`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

/// Body of `POST /auth/login`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// Body of `POST /balance/deposit`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DepositRequest {
    pub amount: BigDecimal,
}

/// Body of `POST /balance/withdraw`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WithdrawRequest {
    pub amount: BigDecimal,
}

/// Body of `POST /orders`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateOrderRequest {
    pub asset_id: String,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub quantity: BigDecimal,
    /// Required for limit orders; market orders take the catalog price when absent.
    pub unit_price: Option<BigDecimal>,
}
