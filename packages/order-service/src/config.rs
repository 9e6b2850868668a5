use std::env;
use std::fmt;
use std::path::Path;
use std::time::Duration;

use bigdecimal::BigDecimal;
use eyre::{eyre, Result, WrapErr};

/// Main configuration for the order service
#[derive(Debug, Clone)]
pub struct Config {
    pub bind: String,
    pub database: DatabaseConfig,
    pub services: ServiceUrls,
    pub internal: InternalConfig,
    pub commit: CommitConfig,
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

/// Peer service base URLs
#[derive(Debug, Clone)]
pub struct ServiceUrls {
    pub user_url: String,
    pub inventory_url: String,
}

/// Internal service-to-service credentials
#[derive(Clone)]
pub struct InternalConfig {
    pub token: String,
}

impl fmt::Debug for InternalConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InternalConfig")
            .field("token", &"<redacted>")
            .finish()
    }
}

/// Order commit configuration
#[derive(Debug, Clone)]
pub struct CommitConfig {
    pub lock_ttl_secs: u64,
    pub lock_wait_secs: u64,
    /// Ceiling on quantity × unit_price per order
    pub max_total: BigDecimal,
}

impl CommitConfig {
    pub fn lock_ttl(&self) -> Duration {
        Duration::from_secs(self.lock_ttl_secs)
    }

    pub fn lock_wait(&self) -> Duration {
        Duration::from_secs(self.lock_wait_secs)
    }
}

/// Default functions
fn default_bind() -> String {
    "0.0.0.0:8002".to_string()
}

fn default_lock_ttl_secs() -> u64 {
    30
}

fn default_lock_wait_secs() -> u64 {
    5
}

fn default_max_total() -> BigDecimal {
    BigDecimal::from(1_000_000)
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
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
            services: ServiceUrls {
                user_url: env::var("USER_SERVICE_URL")
                    .map_err(|_| eyre!("USER_SERVICE_URL environment variable is required"))?,
                inventory_url: env::var("INVENTORY_SERVICE_URL")
                    .map_err(|_| eyre!("INVENTORY_SERVICE_URL environment variable is required"))?,
            },
            internal: InternalConfig {
                token: env::var("INTERNAL_TOKEN")
                    .map_err(|_| eyre!("INTERNAL_TOKEN environment variable is required"))?,
            },
            commit: CommitConfig {
                lock_ttl_secs: env_parse("LOCK_TTL_SECS", default_lock_ttl_secs()),
                lock_wait_secs: env_parse("LOCK_WAIT_SECS", default_lock_wait_secs()),
                max_total: env_parse("ORDER_MAX_TOTAL", default_max_total()),
            },
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.database.url.is_empty() {
            return Err(eyre!("database.url cannot be empty"));
        }
        for (name, url) in [
            ("USER_SERVICE_URL", &self.services.user_url),
            ("INVENTORY_SERVICE_URL", &self.services.inventory_url),
        ] {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(eyre!("{name} must be an http(s) URL"));
            }
        }
        if self.internal.token.is_empty() {
            return Err(eyre!("INTERNAL_TOKEN cannot be empty"));
        }
        if self.commit.lock_ttl_secs == 0 {
            return Err(eyre!("LOCK_TTL_SECS cannot be zero"));
        }
        if self.commit.lock_wait_secs >= self.commit.lock_ttl_secs {
            return Err(eyre!("LOCK_WAIT_SECS must be below LOCK_TTL_SECS"));
        }
        if self.commit.max_total <= BigDecimal::from(0) {
            return Err(eyre!("ORDER_MAX_TOTAL must be positive"));
        }
        Ok(())
    }
}
