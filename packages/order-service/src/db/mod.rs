//! Query functions for the order service tables.

use bigdecimal::BigDecimal;
use eyre::{Result, WrapErr};
use sqlx::postgres::{PgPool, PgPoolOptions};
use uuid::Uuid;

pub mod models;

pub use models::*;

use tradeline_contracts::{Order, OrderStatus};

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

const ORDER_SELECT: &str = r#"order_id, subject, asset_id, side, order_type, quantity,
    unit_price, status, created_at"#;

/// Insert an order row
pub async fn insert_order(pool: &PgPool, order: &NewOrder) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO orders (order_id, subject, asset_id, side, order_type, quantity, unit_price, status)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        "#,
    )
    .bind(order.order_id)
    .bind(&order.subject)
    .bind(&order.asset_id)
    .bind(order.side)
    .bind(order.order_type)
    .bind(&order.quantity)
    .bind(&order.unit_price)
    .bind(order.status)
    .execute(pool)
    .await?;

    Ok(())
}

/// Update order status
pub async fn update_order_status(
    pool: &PgPool,
    order_id: Uuid,
    status: OrderStatus,
) -> Result<(), sqlx::Error> {
    sqlx::query(r#"UPDATE orders SET status = $1 WHERE order_id = $2"#)
        .bind(status)
        .bind(order_id)
        .execute(pool)
        .await?;

    Ok(())
}

/// Get an order by id
pub async fn get_order(pool: &PgPool, order_id: Uuid) -> Result<Option<Order>, sqlx::Error> {
    let query = format!("SELECT {ORDER_SELECT} FROM orders WHERE order_id = $1");
    sqlx::query_as::<_, Order>(&query)
        .bind(order_id)
        .fetch_optional(pool)
        .await
}

/// List a subject's orders, newest first
pub async fn list_orders(
    pool: &PgPool,
    subject: &str,
    limit: i64,
    offset: i64,
) -> Result<Vec<Order>, sqlx::Error> {
    let query = format!(
        "SELECT {ORDER_SELECT} FROM orders
         WHERE subject = $1
         ORDER BY created_at DESC
         LIMIT $2 OFFSET $3"
    );
    sqlx::query_as::<_, Order>(&query)
        .bind(subject)
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await
}

/// All non-empty holdings for a subject
pub async fn list_holdings(pool: &PgPool, subject: &str) -> Result<Vec<Holding>, sqlx::Error> {
    sqlx::query_as::<_, Holding>(
        r#"SELECT subject, asset_id, quantity, updated_at
           FROM holdings
           WHERE subject = $1 AND quantity > 0
           ORDER BY asset_id"#,
    )
    .bind(subject)
    .fetch_all(pool)
    .await
}

/// Add `delta` to a holding, creating the row when absent.
pub async fn add_to_holding(
    pool: &PgPool,
    subject: &str,
    asset_id: &str,
    delta: &BigDecimal,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO holdings (subject, asset_id, quantity)
        VALUES ($1, $2, $3)
        ON CONFLICT (subject, asset_id) DO UPDATE SET
            quantity = holdings.quantity + EXCLUDED.quantity,
            updated_at = NOW()
        "#,
    )
    .bind(subject)
    .bind(asset_id)
    .bind(delta)
    .execute(pool)
    .await?;

    Ok(())
}

/// Deduct `quantity` from a holding only if enough is held.
/// Returns false when the position is short.
pub async fn try_deduct_holding(
    pool: &PgPool,
    subject: &str,
    asset_id: &str,
    quantity: &BigDecimal,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"UPDATE holdings
           SET quantity = quantity - $3, updated_at = NOW()
           WHERE subject = $1 AND asset_id = $2 AND quantity >= $3"#,
    )
    .bind(subject)
    .bind(asset_id)
    .bind(quantity)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}
