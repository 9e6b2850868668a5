//! Query functions for the user service tables.
//!
//! Errors come back raw so the API layer can classify constraint violations
//! (duplicate username/email, unknown subject) into the right status codes.

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use eyre::{Result, WrapErr};
use sqlx::postgres::{PgPool, PgPoolOptions};
use uuid::Uuid;

pub mod models;

pub use models::*;

use tradeline_contracts::{BalanceAccount, BalanceTransaction, TxStatus};

/// Create a database connection pool
pub async fn create_pool(database_url: &str) -> Result<PgPool> {
    PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await
        .wrap_err("Failed to connect to database")
}

/// Run pending migrations (uses the migration files in migrations/)
pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .wrap_err("Failed to run database migrations")?;
    Ok(())
}

/// Insert a new user together with their zero-balance account.
pub async fn insert_user(pool: &PgPool, user: &NewUser) -> Result<(), sqlx::Error> {
    let mut tx = pool.begin().await?;
    sqlx::query(
        r#"
        INSERT INTO users (subject, email, password_hash, role)
        VALUES ($1, $2, $3, $4)
        "#,
    )
    .bind(&user.subject)
    .bind(&user.email)
    .bind(&user.password_hash)
    .bind(&user.role)
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        INSERT INTO balance_accounts (subject, current_amount)
        VALUES ($1, 0)
        "#,
    )
    .bind(&user.subject)
    .execute(&mut *tx)
    .await?;

    tx.commit().await
}

/// Find a user by username (= subject)
pub async fn find_user_by_username(
    pool: &PgPool,
    username: &str,
) -> Result<Option<User>, sqlx::Error> {
    sqlx::query_as::<_, User>(
        r#"SELECT subject, email, password_hash, role, created_at
           FROM users WHERE subject = $1"#,
    )
    .bind(username)
    .fetch_optional(pool)
    .await
}

/// Get a balance account
pub async fn get_account(
    pool: &PgPool,
    subject: &str,
) -> Result<Option<BalanceAccount>, sqlx::Error> {
    sqlx::query_as::<_, BalanceAccount>(
        r#"SELECT subject, current_amount, updated_at
           FROM balance_accounts WHERE subject = $1"#,
    )
    .bind(subject)
    .fetch_optional(pool)
    .await
}

/// Conditionally move an account to `new_amount`. The write only lands if
/// `updated_at` still matches the value read under the lock; a false return
/// means a lost update was prevented.
pub async fn update_account_balance(
    pool: &PgPool,
    subject: &str,
    new_amount: &BigDecimal,
    expected_updated_at: DateTime<Utc>,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"UPDATE balance_accounts
           SET current_amount = $1, updated_at = NOW()
           WHERE subject = $2 AND updated_at = $3"#,
    )
    .bind(new_amount)
    .bind(subject)
    .bind(expected_updated_at)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Append a pending ledger entry
pub async fn insert_transaction(pool: &PgPool, tx: &NewTransaction) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO balance_transactions (transaction_id, subject, kind, amount, status, linked_order_id)
        VALUES ($1, $2, $3, $4, 'pending', $5)
        "#,
    )
    .bind(tx.transaction_id)
    .bind(&tx.subject)
    .bind(tx.kind)
    .bind(&tx.amount)
    .bind(tx.linked_order_id)
    .execute(pool)
    .await?;

    Ok(())
}

/// Move a ledger entry to its terminal status
pub async fn set_transaction_status(
    pool: &PgPool,
    transaction_id: Uuid,
    status: TxStatus,
) -> Result<(), sqlx::Error> {
    sqlx::query(r#"UPDATE balance_transactions SET status = $1 WHERE transaction_id = $2"#)
        .bind(status)
        .bind(transaction_id)
        .execute(pool)
        .await?;

    Ok(())
}

/// List a subject's ledger entries, newest first
pub async fn list_transactions(
    pool: &PgPool,
    subject: &str,
    limit: i64,
    offset: i64,
) -> Result<Vec<BalanceTransaction>, sqlx::Error> {
    sqlx::query_as::<_, BalanceTransaction>(
        r#"SELECT transaction_id, subject, kind, amount, status, created_at, linked_order_id
           FROM balance_transactions
           WHERE subject = $1
           ORDER BY created_at DESC
           LIMIT $2 OFFSET $3"#,
    )
    .bind(subject)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await
}

/// Signed sum of completed ledger entries for a subject. Equals the
/// account's `current_amount` after every committed call.
pub async fn completed_signed_sum(pool: &PgPool, subject: &str) -> Result<BigDecimal, sqlx::Error> {
    let row: (Option<BigDecimal>,) = sqlx::query_as(
        r#"SELECT SUM(
               CASE WHEN kind IN ('deposit', 'order_credit') THEN amount ELSE -amount END
           )
           FROM balance_transactions
           WHERE subject = $1 AND status = 'completed'"#,
    )
    .bind(subject)
    .fetch_one(pool)
    .await?;

    Ok(row.0.unwrap_or_else(|| BigDecimal::from(0)))
}
