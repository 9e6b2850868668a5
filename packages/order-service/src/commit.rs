//! Order commit: validation, user lock, balance movement, order insert.
//!
//! Concurrent orders for one subject serialize on `user:<subject>`; a lock
//! wait that exhausts is a normal, retryable outcome surfaced as 503. Every
//! attempt that reaches the balance step leaves an order row behind, marked
//! completed or failed.

use std::time::Duration;

use bigdecimal::BigDecimal;
use serde_json::json;
use sqlx::PgPool;
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

use tradeline_contracts::{
    CreateOrderRequest, Order, OrderSide, OrderStatus, OrderType, TxKind, ValidationIssue,
};
use tradeline_coordination::{LockError, LockManager, LockOwner};

use crate::clients::{BalanceClient, ClientError, InventoryClient};
use crate::config::CommitConfig;
use crate::db::{self, NewOrder};

#[derive(Debug, Error)]
pub enum CommitError {
    #[error("order validation failed")]
    Validation(Vec<ValidationIssue>),
    #[error("insufficient funds for buy order")]
    InsufficientFunds,
    #[error("insufficient holdings for sell order")]
    InsufficientHoldings,
    #[error("account busy, lock wait exhausted")]
    LockContention,
    #[error("balance service error: {0}")]
    Balance(ClientError),
    #[error("inventory service error: {0}")]
    Inventory(ClientError),
    #[error(transparent)]
    Db(#[from] sqlx::Error),
    #[error(transparent)]
    Lock(#[from] LockError),
}

/// A validated order ready to commit.
struct ValidatedOrder {
    asset_id: String,
    side: OrderSide,
    order_type: OrderType,
    quantity: BigDecimal,
    unit_price: BigDecimal,
    total: BigDecimal,
}

pub struct OrderCommitter {
    db: PgPool,
    locks: LockManager,
    balance: BalanceClient,
    inventory: InventoryClient,
    lock_ttl: Duration,
    lock_wait: Duration,
    max_total: BigDecimal,
}

impl OrderCommitter {
    pub fn new(
        db: PgPool,
        locks: LockManager,
        balance: BalanceClient,
        inventory: InventoryClient,
        config: &CommitConfig,
    ) -> Self {
        Self {
            db,
            locks,
            balance,
            inventory,
            lock_ttl: config.lock_ttl(),
            lock_wait: config.lock_wait(),
            max_total: config.max_total.clone(),
        }
    }

    /// Create an order for `subject`. Returns the recorded order on success.
    pub async fn create_order(
        &self,
        subject: &str,
        request: CreateOrderRequest,
    ) -> Result<Order, CommitError> {
        let validated = self.validate(&request).await?;

        let lock_name = format!("user:{subject}");
        let owner = match self
            .locks
            .acquire(&lock_name, self.lock_ttl, self.lock_wait)
            .await
        {
            Ok(owner) => owner,
            Err(LockError::Timeout { .. }) => return Err(CommitError::LockContention),
            Err(e) => return Err(e.into()),
        };

        let result = self.commit(subject, &validated, &owner).await;

        if let Err(e) = self.locks.release(&owner).await {
            warn!(error = %e, lock = %lock_name, "Lock release failed");
        }

        result
    }

    /// Field and catalog validation (no lock held yet).
    async fn validate(&self, request: &CreateOrderRequest) -> Result<ValidatedOrder, CommitError> {
        let mut issues = Vec::new();

        if request.quantity <= BigDecimal::from(0) {
            issues.push(
                ValidationIssue::new("quantity", "must be positive")
                    .with_value(json!(request.quantity.to_string())),
            );
        }

        let asset = match self.inventory.get_asset(&request.asset_id).await {
            Ok(Some(asset)) => Some(asset),
            Ok(None) => {
                issues.push(
                    ValidationIssue::new("asset_id", "asset does not exist")
                        .with_value(json!(request.asset_id)),
                );
                None
            }
            Err(e) => return Err(CommitError::Inventory(e)),
        };

        if let Some(asset) = &asset {
            if !asset.available {
                issues.push(
                    ValidationIssue::new("asset_id", "asset is not currently tradable")
                        .with_value(json!(request.asset_id)),
                );
            }
        }

        let unit_price = match (&request.unit_price, request.order_type) {
            (Some(price), _) => {
                if *price <= BigDecimal::from(0) {
                    issues.push(
                        ValidationIssue::new("unit_price", "must be positive")
                            .with_value(json!(price.to_string())),
                    );
                }
                price.clone()
            }
            // Market orders take the catalog price
            (None, OrderType::Market) => asset
                .as_ref()
                .map(|a| a.unit_price.clone())
                .unwrap_or_else(|| BigDecimal::from(0)),
            (None, OrderType::Limit) => {
                issues.push(ValidationIssue::new(
                    "unit_price",
                    "required for limit orders",
                ));
                BigDecimal::from(0)
            }
        };

        let total = &request.quantity * &unit_price;
        if total > self.max_total {
            issues.push(
                ValidationIssue::new(
                    "quantity",
                    format!("order total exceeds the ceiling of {}", self.max_total),
                )
                .with_value(json!(total.to_string())),
            );
        }

        if !issues.is_empty() {
            return Err(CommitError::Validation(issues));
        }

        Ok(ValidatedOrder {
            asset_id: request.asset_id.clone(),
            side: request.side,
            order_type: request.order_type,
            quantity: request.quantity.clone(),
            unit_price,
            total,
        })
    }

    /// Balance/holdings movement and order insert, under the held lock.
    async fn commit(
        &self,
        subject: &str,
        order: &ValidatedOrder,
        lock: &LockOwner,
    ) -> Result<Order, CommitError> {
        let order_id = Uuid::new_v4();

        // The order row lands first, pending: money never moves without a
        // record linking the ledger entries back to an order.
        let row = NewOrder {
            order_id,
            subject: subject.to_string(),
            asset_id: order.asset_id.clone(),
            side: order.side,
            order_type: order.order_type,
            quantity: order.quantity.clone(),
            unit_price: order.unit_price.clone(),
            status: OrderStatus::Pending,
        };
        db::insert_order(&self.db, &row).await?;

        let outcome = match order.side {
            OrderSide::Buy => self.settle_buy(subject, order, order_id, lock).await,
            OrderSide::Sell => self.settle_sell(subject, order, order_id, lock).await,
        };

        let status = if outcome.is_ok() {
            OrderStatus::Completed
        } else {
            OrderStatus::Failed
        };
        if let Err(e) = db::update_order_status(&self.db, order_id, status).await {
            error!(error = %e, %order_id, status = %status, "Failed to record order status");
        }

        outcome?;
        info!(%order_id, subject = %subject, side = %order.side, "Order committed");

        db::get_order(&self.db, order_id)
            .await?
            .ok_or_else(|| CommitError::Db(sqlx::Error::RowNotFound))
    }

    /// Buy: debit the account for the order total, then add the position.
    /// A holdings failure after the debit is compensated by crediting the
    /// total back.
    async fn settle_buy(
        &self,
        subject: &str,
        order: &ValidatedOrder,
        order_id: Uuid,
        lock: &LockOwner,
    ) -> Result<(), CommitError> {
        match self
            .balance
            .debit(subject, &order.total, order_id, &lock.owner_id)
            .await
        {
            Ok(_) => {}
            Err(ClientError::InsufficientFunds) => return Err(CommitError::InsufficientFunds),
            Err(ClientError::LockContention) => return Err(CommitError::LockContention),
            Err(e) => return Err(CommitError::Balance(e)),
        }

        match db::add_to_holding(&self.db, subject, &order.asset_id, &order.quantity).await {
            Ok(()) => Ok(()),
            Err(e) => {
                if let Err(undo) = self
                    .balance
                    .credit(
                        subject,
                        &order.total,
                        TxKind::OrderCredit,
                        order_id,
                        &lock.owner_id,
                    )
                    .await
                {
                    error!(
                        error = %undo,
                        subject = %subject,
                        %order_id,
                        "Compensating refund failed after holdings write error"
                    );
                }
                Err(e.into())
            }
        }
    }

    /// Sell: deduct holdings first, then credit the proceeds. A credit
    /// failure after the deduction is compensated by restoring the holding.
    async fn settle_sell(
        &self,
        subject: &str,
        order: &ValidatedOrder,
        order_id: Uuid,
        lock: &LockOwner,
    ) -> Result<(), CommitError> {
        let deducted =
            db::try_deduct_holding(&self.db, subject, &order.asset_id, &order.quantity).await?;
        if !deducted {
            return Err(CommitError::InsufficientHoldings);
        }

        match self
            .balance
            .credit(
                subject,
                &order.total,
                TxKind::OrderCredit,
                order_id,
                &lock.owner_id,
            )
            .await
        {
            Ok(_) => Ok(()),
            Err(e) => {
                if let Err(undo) =
                    db::add_to_holding(&self.db, subject, &order.asset_id, &order.quantity).await
                {
                    error!(
                        error = %undo,
                        subject = %subject,
                        asset = %order.asset_id,
                        "Compensating holding restore failed"
                    );
                }
                match e {
                    ClientError::LockContention => Err(CommitError::LockContention),
                    other => Err(CommitError::Balance(other)),
                }
            }
        }
    }
}
