use std::env;
use std::fmt;
use std::path::Path;
use std::time::Duration;

use eyre::{eyre, Result, WrapErr};

/// Main configuration for the gateway
#[derive(Debug, Clone)]
pub struct Config {
    pub bind: String,
    pub auth: AuthConfig,
    pub downstreams: DownstreamConfig,
    pub rate: RateConfig,
    pub block: BlockConfig,
    pub breaker: BreakerConfig,
    pub proxy: ProxyConfig,
}

/// Token verification configuration
#[derive(Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
}

/// Custom Debug that redacts the signing secret (never logged).
impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("jwt_secret", &"<redacted>")
            .finish()
    }
}

/// Base URLs of the proxied services
#[derive(Debug, Clone)]
pub struct DownstreamConfig {
    pub user_url: String,
    pub order_url: String,
    pub inventory_url: String,
}

/// Fixed-window rate budgets per class
#[derive(Debug, Clone)]
pub struct RateConfig {
    pub window_secs: u64,
    /// Budget for the `default` class (GATEWAY_RATE_LIMIT)
    pub default_limit: u32,
    pub auth_limit: u32,
    pub trading_limit: u32,
    pub public_read_limit: u32,
}

impl RateConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }

    pub fn limit_for(&self, class: &str) -> u32 {
        match class {
            "auth" => self.auth_limit,
            "trading" => self.trading_limit,
            "public_read" => self.public_read_limit,
            _ => self.default_limit,
        }
    }
}

/// Failed-login blocking configuration
#[derive(Debug, Clone)]
pub struct BlockConfig {
    pub threshold: u32,
    pub duration_secs: u64,
}

impl BlockConfig {
    pub fn duration(&self) -> Duration {
        Duration::from_secs(self.duration_secs)
    }
}

/// Circuit breaker thresholds for one downstream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BreakerSettings {
    pub failure_threshold: u32,
    pub window_secs: u64,
    pub cooldown_secs: u64,
    pub probes: u32,
}

/// Breaker thresholds: platform defaults plus per-downstream overrides
/// (`BREAKER_USER_FAILURE_THRESHOLD` and friends).
#[derive(Debug, Clone)]
pub struct BreakerConfig {
    pub default: BreakerSettings,
    pub per_downstream: std::collections::HashMap<String, BreakerSettings>,
}

impl BreakerConfig {
    pub fn for_downstream(&self, name: &str) -> &BreakerSettings {
        self.per_downstream.get(name).unwrap_or(&self.default)
    }
}

/// Proxy timeout budgets
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    pub timeout_secs: u64,
    pub connect_timeout_secs: u64,
    pub idle_timeout_secs: u64,
    pub max_body_bytes: usize,
}

/// Default functions
fn default_bind() -> String {
    "0.0.0.0:8000".to_string()
}

fn default_rate_limit() -> u32 {
    10_000
}

fn default_block_threshold() -> u32 {
    5
}

fn default_block_duration_secs() -> u64 {
    86_400
}

fn default_breaker_failures() -> u32 {
    5
}

fn default_breaker_window_secs() -> u64 {
    60
}

fn default_breaker_cooldown_secs() -> u64 {
    60
}

fn default_breaker_probes() -> u32 {
    3
}

fn default_proxy_timeout_secs() -> u64 {
    30
}

fn default_proxy_connect_timeout_secs() -> u64 {
    2
}

fn default_proxy_idle_timeout_secs() -> u64 {
    10
}

fn default_max_body_bytes() -> usize {
    1024 * 1024
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

/// Per-downstream breaker settings, `None` when no override variable is set
/// for `name` (e.g. `BREAKER_USER_COOLDOWN_SECS`).
fn breaker_overrides_for(name: &str, default: &BreakerSettings) -> Option<BreakerSettings> {
    let upper = name.to_uppercase();
    let keys = [
        format!("BREAKER_{upper}_FAILURE_THRESHOLD"),
        format!("BREAKER_{upper}_WINDOW_SECS"),
        format!("BREAKER_{upper}_COOLDOWN_SECS"),
        format!("BREAKER_{upper}_PROBES"),
    ];
    if keys.iter().all(|k| env::var(k).is_err()) {
        return None;
    }
    Some(BreakerSettings {
        failure_threshold: env_parse(&keys[0], default.failure_threshold),
        window_secs: env_parse(&keys[1], default.window_secs),
        cooldown_secs: env_parse(&keys[2], default.cooldown_secs),
        probes: env_parse(&keys[3], default.probes),
    })
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

    /// Load configuration from environment variables
    fn load_from_env() -> Result<Self> {
        let auth = AuthConfig {
            jwt_secret: env::var("JWT_SECRET")
                .map_err(|_| eyre!("JWT_SECRET environment variable is required"))?,
        };

        let downstreams = DownstreamConfig {
            user_url: env::var("USER_SERVICE_URL")
                .map_err(|_| eyre!("USER_SERVICE_URL environment variable is required"))?,
            order_url: env::var("ORDER_SERVICE_URL")
                .map_err(|_| eyre!("ORDER_SERVICE_URL environment variable is required"))?,
            inventory_url: env::var("INVENTORY_SERVICE_URL")
                .map_err(|_| eyre!("INVENTORY_SERVICE_URL environment variable is required"))?,
        };

        let default_limit = env_parse("GATEWAY_RATE_LIMIT", default_rate_limit());
        let rate = RateConfig {
            window_secs: env_parse("RATE_WINDOW_SECS", 60),
            default_limit,
            auth_limit: env_parse("RATE_LIMIT_AUTH", default_limit),
            trading_limit: env_parse("RATE_LIMIT_TRADING", default_limit),
            public_read_limit: env_parse("RATE_LIMIT_PUBLIC_READ", default_limit),
        };

        let block = BlockConfig {
            threshold: env_parse("BLOCK_THRESHOLD", default_block_threshold()),
            duration_secs: env_parse("BLOCK_DURATION_SECS", default_block_duration_secs()),
        };

        let breaker_default = BreakerSettings {
            failure_threshold: env_parse("BREAKER_FAILURE_THRESHOLD", default_breaker_failures()),
            window_secs: env_parse("BREAKER_WINDOW_SECS", default_breaker_window_secs()),
            cooldown_secs: env_parse("BREAKER_COOLDOWN_SECS", default_breaker_cooldown_secs()),
            probes: env_parse("BREAKER_PROBES", default_breaker_probes()),
        };
        let per_downstream = ["user", "order", "inventory"]
            .into_iter()
            .filter_map(|name| {
                breaker_overrides_for(name, &breaker_default).map(|s| (name.to_string(), s))
            })
            .collect();
        let breaker = BreakerConfig {
            default: breaker_default,
            per_downstream,
        };

        let proxy = ProxyConfig {
            timeout_secs: env_parse("PROXY_TIMEOUT_SECS", default_proxy_timeout_secs()),
            connect_timeout_secs: env_parse(
                "PROXY_CONNECT_TIMEOUT_SECS",
                default_proxy_connect_timeout_secs(),
            ),
            idle_timeout_secs: env_parse(
                "PROXY_IDLE_TIMEOUT_SECS",
                default_proxy_idle_timeout_secs(),
            ),
            max_body_bytes: env_parse("PROXY_MAX_BODY_BYTES", default_max_body_bytes()),
        };

        let config = Config {
            bind: env::var("GATEWAY_BIND").unwrap_or_else(|_| default_bind()),
            auth,
            downstreams,
            rate,
            block,
            breaker,
            proxy,
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.auth.jwt_secret.len() < 16 {
            return Err(eyre!("JWT_SECRET must be at least 16 characters"));
        }

        for (name, url) in [
            ("USER_SERVICE_URL", &self.downstreams.user_url),
            ("ORDER_SERVICE_URL", &self.downstreams.order_url),
            ("INVENTORY_SERVICE_URL", &self.downstreams.inventory_url),
        ] {
            url::Url::parse(url).wrap_err_with(|| format!("{name} is not a valid URL"))?;
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(eyre!("{name} must be an http(s) URL"));
            }
        }

        if self.rate.window_secs == 0 {
            return Err(eyre!("RATE_WINDOW_SECS cannot be zero"));
        }
        if self.rate.default_limit == 0 {
            return Err(eyre!("GATEWAY_RATE_LIMIT cannot be zero"));
        }
        if self.block.threshold == 0 {
            return Err(eyre!("BLOCK_THRESHOLD cannot be zero"));
        }
        let mut breaker_settings = vec![("default", &self.breaker.default)];
        breaker_settings.extend(
            self.breaker
                .per_downstream
                .iter()
                .map(|(name, s)| (name.as_str(), s)),
        );
        for (name, settings) in breaker_settings {
            if settings.failure_threshold == 0 {
                return Err(eyre!("breaker failure threshold for {name} cannot be zero"));
            }
            if settings.probes == 0 {
                return Err(eyre!("breaker probe count for {name} cannot be zero"));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> Config {
        Config {
            bind: default_bind(),
            auth: AuthConfig {
                jwt_secret: "test-secret-at-least-16-chars".to_string(),
            },
            downstreams: DownstreamConfig {
                user_url: "http://localhost:8001".to_string(),
                order_url: "http://localhost:8002".to_string(),
                inventory_url: "http://localhost:8003".to_string(),
            },
            rate: RateConfig {
                window_secs: 60,
                default_limit: default_rate_limit(),
                auth_limit: 100,
                trading_limit: 500,
                public_read_limit: 2000,
            },
            block: BlockConfig {
                threshold: default_block_threshold(),
                duration_secs: default_block_duration_secs(),
            },
            breaker: BreakerConfig {
                default: BreakerSettings {
                    failure_threshold: default_breaker_failures(),
                    window_secs: default_breaker_window_secs(),
                    cooldown_secs: default_breaker_cooldown_secs(),
                    probes: default_breaker_probes(),
                },
                per_downstream: std::collections::HashMap::new(),
            },
            proxy: ProxyConfig {
                timeout_secs: default_proxy_timeout_secs(),
                connect_timeout_secs: default_proxy_connect_timeout_secs(),
                idle_timeout_secs: default_proxy_idle_timeout_secs(),
                max_body_bytes: default_max_body_bytes(),
            },
        }
    }

    #[test]
    fn test_defaults() {
        assert_eq!(default_rate_limit(), 10_000);
        assert_eq!(default_block_threshold(), 5);
        assert_eq!(default_block_duration_secs(), 86_400);
        assert_eq!(default_proxy_timeout_secs(), 30);
        assert_eq!(default_proxy_connect_timeout_secs(), 2);
    }

    #[test]
    fn test_valid_config_passes() {
        assert!(base_config().validate().is_ok());
    }

    #[test]
    fn test_short_secret_rejected() {
        let mut config = base_config();
        config.auth.jwt_secret = "short".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_bad_downstream_url_rejected() {
        let mut config = base_config();
        config.downstreams.order_url = "not a url".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_thresholds_rejected() {
        let mut config = base_config();
        config.breaker.default.failure_threshold = 0;
        assert!(config.validate().is_err());

        let mut config = base_config();
        config.breaker.per_downstream.insert(
            "inventory".to_string(),
            BreakerSettings {
                failure_threshold: 3,
                window_secs: 60,
                cooldown_secs: 60,
                probes: 0,
            },
        );
        assert!(config.validate().is_err());

        let mut config = base_config();
        config.rate.default_limit = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_breaker_overrides_fall_back_to_default() {
        let mut config = base_config();
        assert_eq!(
            config.breaker.for_downstream("inventory"),
            &config.breaker.default
        );

        let tight = BreakerSettings {
            failure_threshold: 2,
            window_secs: 30,
            cooldown_secs: 15,
            probes: 1,
        };
        config
            .breaker
            .per_downstream
            .insert("inventory".to_string(), tight.clone());
        assert_eq!(config.breaker.for_downstream("inventory"), &tight);
        assert_eq!(config.breaker.for_downstream("user"), &config.breaker.default);
    }

    #[test]
    fn test_rate_class_budgets() {
        let config = base_config();
        assert_eq!(config.rate.limit_for("auth"), 100);
        assert_eq!(config.rate.limit_for("trading"), 500);
        assert_eq!(config.rate.limit_for("public_read"), 2000);
        assert_eq!(config.rate.limit_for("default"), 10_000);
        assert_eq!(config.rate.limit_for("unknown-class"), 10_000);
    }

    #[test]
    fn test_debug_redacts_secret() {
        let config = base_config();
        let rendered = format!("{:?}", config.auth);
        assert!(!rendered.contains("test-secret"));
        assert!(rendered.contains("<redacted>"));
    }
}
