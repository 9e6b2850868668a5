//! Query functions for the asset catalog.

use eyre::{Result, WrapErr};
use sqlx::postgres::{PgPool, PgPoolOptions};

use tradeline_contracts::Asset;

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

/// List the catalog, optionally filtered by category
pub async fn list_assets(
    pool: &PgPool,
    category: Option<&str>,
) -> Result<Vec<Asset>, sqlx::Error> {
    match category {
        Some(category) => {
            sqlx::query_as::<_, Asset>(
                r#"SELECT asset_id, name, category, unit_price, available
                   FROM assets WHERE category = $1 ORDER BY asset_id"#,
            )
            .bind(category)
            .fetch_all(pool)
            .await
        }
        None => {
            sqlx::query_as::<_, Asset>(
                r#"SELECT asset_id, name, category, unit_price, available
                   FROM assets ORDER BY asset_id"#,
            )
            .fetch_all(pool)
            .await
        }
    }
}

/// Get a single asset
pub async fn get_asset(pool: &PgPool, asset_id: &str) -> Result<Option<Asset>, sqlx::Error> {
    sqlx::query_as::<_, Asset>(
        r#"SELECT asset_id, name, category, unit_price, available
           FROM assets WHERE asset_id = $1"#,
    )
    .bind(asset_id)
    .fetch_optional(pool)
    .await
}
