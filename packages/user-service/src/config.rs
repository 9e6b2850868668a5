use std::env;
use std::fmt;
use std::path::Path;
use std::time::Duration;

use eyre::{eyre, Result, WrapErr};

/// Main configuration for the user service
#[derive(Debug, Clone)]
pub struct Config {
    pub bind: String,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub ledger: LedgerConfig,
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

/// Token issuing configuration
#[derive(Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub token_ttl_secs: u64,
    pub internal_token: String,
}

/// Custom Debug that redacts secrets to prevent accidental log leakage.
impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("jwt_secret", &"<redacted>")
            .field("token_ttl_secs", &self.token_ttl_secs)
            .field("internal_token", &"<redacted>")
            .finish()
    }
}

/// Balance ledger locking configuration
#[derive(Debug, Clone)]
pub struct LedgerConfig {
    pub lock_ttl_secs: u64,
    pub lock_wait_secs: u64,
}

impl LedgerConfig {
    pub fn lock_ttl(&self) -> Duration {
        Duration::from_secs(self.lock_ttl_secs)
    }

    pub fn lock_wait(&self) -> Duration {
        Duration::from_secs(self.lock_wait_secs)
    }
}

/// Default functions
fn default_bind() -> String {
    "0.0.0.0:8001".to_string()
}

fn default_token_ttl_secs() -> u64 {
    86_400
}

fn default_lock_ttl_secs() -> u64 {
    30
}

fn default_lock_wait_secs() -> u64 {
    5
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
            auth: AuthConfig {
                jwt_secret: env::var("JWT_SECRET")
                    .map_err(|_| eyre!("JWT_SECRET environment variable is required"))?,
                token_ttl_secs: env_parse("TOKEN_TTL_SECS", default_token_ttl_secs()),
                internal_token: env::var("INTERNAL_TOKEN")
                    .map_err(|_| eyre!("INTERNAL_TOKEN environment variable is required"))?,
            },
            ledger: LedgerConfig {
                lock_ttl_secs: env_parse("LOCK_TTL_SECS", default_lock_ttl_secs()),
                lock_wait_secs: env_parse("LOCK_WAIT_SECS", default_lock_wait_secs()),
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
        if self.auth.jwt_secret.len() < 16 {
            return Err(eyre!("JWT_SECRET must be at least 16 characters"));
        }
        if self.auth.internal_token.is_empty() {
            return Err(eyre!("INTERNAL_TOKEN cannot be empty"));
        }
        if self.ledger.lock_ttl_secs == 0 {
            return Err(eyre!("LOCK_TTL_SECS cannot be zero"));
        }
        if self.ledger.lock_wait_secs >= self.ledger.lock_ttl_secs {
            return Err(eyre!("LOCK_WAIT_SECS must be below LOCK_TTL_SECS"));
        }
        Ok(())
    }
}
