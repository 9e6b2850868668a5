//! Balance ledger: debit and credit under the per-user lock.
//!
//! Every mutation follows the same shape: take `user:<subject>` (or verify
//! the caller already holds it), read the account, append a pending ledger
//! entry, conditionally move the balance, and complete the entry. Any
//! failure after the append marks the entry failed and leaves the balance
//! untouched.

use std::time::Duration;

use bigdecimal::BigDecimal;
use sqlx::PgPool;
use thiserror::Error;
use tracing::{error, warn};
use uuid::Uuid;

use tradeline_contracts::{TxKind, TxStatus};
use tradeline_coordination::{LockError, LockManager, LockOwner};

use crate::config::LedgerConfig;
use crate::db::{self, NewTransaction};

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("amount must be positive")]
    NonPositiveAmount,
    #[error("balance account not found for subject")]
    AccountNotFound,
    #[error("insufficient funds: available {available}")]
    InsufficientFunds { available: BigDecimal },
    #[error("user lock contended, retry later")]
    LockContention,
    #[error("balance changed underneath the lock holder")]
    LostUpdate,
    #[error(transparent)]
    Db(#[from] sqlx::Error),
    #[error(transparent)]
    Lock(#[from] LockError),
}

/// Direction of a ledger mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Debit,
    Credit,
}

pub struct Ledger {
    db: PgPool,
    locks: LockManager,
    lock_ttl: Duration,
    lock_wait: Duration,
}

impl Ledger {
    pub fn new(db: PgPool, locks: LockManager, config: &LedgerConfig) -> Self {
        Self {
            db,
            locks,
            lock_ttl: config.lock_ttl(),
            lock_wait: config.lock_wait(),
        }
    }

    /// Debit `amount` from `subject`. `held_lock` is the owner id of an
    /// already-held `user:<subject>` lock; when absent the ledger takes the
    /// lock itself.
    pub async fn debit(
        &self,
        subject: &str,
        amount: &BigDecimal,
        kind: TxKind,
        linked_order_id: Option<Uuid>,
        held_lock: Option<&str>,
    ) -> Result<Uuid, LedgerError> {
        self.mutate(subject, amount, kind, linked_order_id, held_lock, Direction::Debit)
            .await
    }

    /// Credit `amount` to `subject`; same locking contract as `debit`.
    pub async fn credit(
        &self,
        subject: &str,
        amount: &BigDecimal,
        kind: TxKind,
        linked_order_id: Option<Uuid>,
        held_lock: Option<&str>,
    ) -> Result<Uuid, LedgerError> {
        self.mutate(subject, amount, kind, linked_order_id, held_lock, Direction::Credit)
            .await
    }

    async fn mutate(
        &self,
        subject: &str,
        amount: &BigDecimal,
        kind: TxKind,
        linked_order_id: Option<Uuid>,
        held_lock: Option<&str>,
        direction: Direction,
    ) -> Result<Uuid, LedgerError> {
        if amount <= &BigDecimal::from(0) {
            return Err(LedgerError::NonPositiveAmount);
        }

        let lock_name = format!("user:{subject}");
        let guard = self.take_lock(&lock_name, held_lock).await?;

        let result = self
            .apply(subject, amount, kind, linked_order_id, direction)
            .await;

        if let Some(owner) = guard {
            if let Err(e) = self.locks.release(&owner).await {
                warn!(error = %e, lock = %lock_name, "Lock release failed");
            }
        }

        result
    }

    /// Acquire the user lock unless the caller proves it already holds it.
    async fn take_lock(
        &self,
        lock_name: &str,
        held_lock: Option<&str>,
    ) -> Result<Option<LockOwner>, LedgerError> {
        if let Some(owner_id) = held_lock {
            if self.locks.is_held(lock_name, owner_id).await? {
                return Ok(None);
            }
            warn!(lock = %lock_name, "Claimed lock not held, acquiring internally");
        }

        match self.locks.acquire(lock_name, self.lock_ttl, self.lock_wait).await {
            Ok(owner) => Ok(Some(owner)),
            Err(LockError::Timeout { .. }) => Err(LedgerError::LockContention),
            Err(e) => Err(e.into()),
        }
    }

    async fn apply(
        &self,
        subject: &str,
        amount: &BigDecimal,
        kind: TxKind,
        linked_order_id: Option<Uuid>,
        direction: Direction,
    ) -> Result<Uuid, LedgerError> {
        let account = db::get_account(&self.db, subject)
            .await?
            .ok_or(LedgerError::AccountNotFound)?;

        if direction == Direction::Debit && account.current_amount < *amount {
            return Err(LedgerError::InsufficientFunds {
                available: account.current_amount,
            });
        }

        let transaction_id = Uuid::new_v4();
        db::insert_transaction(
            &self.db,
            &NewTransaction {
                transaction_id,
                subject: subject.to_string(),
                kind,
                amount: amount.clone(),
                linked_order_id,
            },
        )
        .await?;

        let new_amount = match direction {
            Direction::Debit => &account.current_amount - amount,
            Direction::Credit => &account.current_amount + amount,
        };

        let updated =
            db::update_account_balance(&self.db, subject, &new_amount, account.updated_at).await;
        match updated {
            Ok(true) => {}
            Ok(false) => {
                self.fail_transaction(transaction_id).await;
                return Err(LedgerError::LostUpdate);
            }
            Err(e) => {
                self.fail_transaction(transaction_id).await;
                return Err(e.into());
            }
        }

        if let Err(e) =
            db::set_transaction_status(&self.db, transaction_id, TxStatus::Completed).await
        {
            // The balance moved but the entry is stuck pending; surface the
            // error so operators can resolve the entry.
            error!(error = %e, %transaction_id, "Failed to complete ledger entry");
            return Err(e.into());
        }

        Ok(transaction_id)
    }

    async fn fail_transaction(&self, transaction_id: Uuid) {
        if let Err(e) = db::set_transaction_status(&self.db, transaction_id, TxStatus::Failed).await
        {
            error!(error = %e, %transaction_id, "Failed to mark ledger entry failed");
        }
    }
}
