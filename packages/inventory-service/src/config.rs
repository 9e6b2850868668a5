use std::env;
use std::fmt;
use std::path::Path;

use eyre::{eyre, Result, WrapErr};

/// Main configuration for the inventory service
#[derive(Debug, Clone)]
pub struct Config {
    pub bind: String,
    pub database: DatabaseConfig,
}

/// Database configuration
#[derive(Clone)]
pub struct DatabaseConfig {
    pub url: String,
}

/// Custom Debug that redacts the database URL (may contain credentials).
impl fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("url", &"<redacted>")
            .finish()
    }
}

fn default_bind() -> String {
    "0.0.0.0:8003".to_string()
}

impl Config {
    /// Load configuration from environment variables
    /// Loads .env file if present, then reads from environment
    pub fn load() -> Result<Self> {
        Self::load_from_file(".env").or_else(|_| Self::load_from_env())
    }

    /// Load from a specific .env file path
    pub fn load_from_file(path: &str) -> Result<Self> {
        if Path::new(path).exists() {
            dotenvy::from_filename(path)
                .wrap_err_with(|| format!("Failed to load .env file from {}", path))?;
        }
        Self::load_from_env()
    }

    fn load_from_env() -> Result<Self> {
        let config = Config {
            bind: env::var("BIND").unwrap_or_else(|_| default_bind()),
            database: DatabaseConfig {
                url: env::var("DATABASE_URL")
                    .map_err(|_| eyre!("DATABASE_URL environment variable is required"))?,
            },
        };

        if config.database.url.is_empty() {
            return Err(eyre!("database.url cannot be empty"));
        }
        Ok(config)
    }
}
