//! E2E configuration from environment variables.

use std::env;

use eyre::{eyre, Result};

#[derive(Debug, Clone)]
pub struct E2eConfig {
    /// Gateway base URL, e.g. `http://localhost:8000`
    pub gateway_url: String,
    /// Budget configured for the `public_read` rate class, used by the
    /// rate-limit scenario to know when a 429 is expected.
    pub public_read_limit: Option<u32>,
    /// Enable scenarios that block this host or trip breakers.
    pub destructive: bool,
}

impl E2eConfig {
    pub fn from_env() -> Result<Self> {
        let gateway_url = env::var("GATEWAY_URL")
            .map_err(|_| eyre!("GATEWAY_URL environment variable is required (e.g. http://localhost:8000)"))?
            .trim_end_matches('/')
            .to_string();

        Ok(Self {
            gateway_url,
            public_read_limit: env::var("E2E_PUBLIC_READ_LIMIT")
                .ok()
                .and_then(|v| v.parse().ok()),
            destructive: env::var("E2E_DESTRUCTIVE")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
        })
    }

    pub fn api(&self, path: &str) -> String {
        format!("{}/api/v1{path}", self.gateway_url)
    }
}
