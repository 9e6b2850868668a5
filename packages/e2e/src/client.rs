//! Typed client for driving the platform through the gateway.

use bigdecimal::BigDecimal;
use eyre::{eyre, Result};
use reqwest::StatusCode;
use serde_json::json;
use uuid::Uuid;

use tradeline_contracts::{AuthResponse, BalanceAccount, CreateOrderRequest, Order};

use crate::config::E2eConfig;

pub struct PlatformClient {
    pub http: reqwest::Client,
    pub config: E2eConfig,
}

impl PlatformClient {
    pub fn new(config: E2eConfig) -> Result<Self> {
        Ok(Self {
            http: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(30))
                .build()?,
            config,
        })
    }

    /// Register a throwaway user and return its credentials and token.
    pub async fn register_fresh_user(&self) -> Result<(String, String, String)> {
        let username = format!("e2e-{}", &Uuid::new_v4().to_string()[..8]);
        let password = format!("pw-{}", Uuid::new_v4());
        let email = format!("{username}@e2e.tradeline.dev");

        let response = self
            .http
            .post(self.config.api("/auth/register"))
            .json(&json!({ "username": username, "email": email, "password": password }))
            .send()
            .await?;
        if response.status() != StatusCode::CREATED {
            return Err(eyre!(
                "register failed with {}: {}",
                response.status(),
                response.text().await.unwrap_or_default()
            ));
        }
        let auth: AuthResponse = response.json().await?;
        Ok((username, password, auth.token))
    }

    pub async fn login(&self, username: &str, password: &str) -> Result<AuthResponse> {
        let response = self
            .http
            .post(self.config.api("/auth/login"))
            .json(&json!({ "username": username, "password": password }))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(eyre!("login failed with {}", response.status()));
        }
        Ok(response.json().await?)
    }

    /// Login attempt returning only the status (for failure counting).
    pub async fn login_status(&self, username: &str, password: &str) -> Result<StatusCode> {
        let response = self
            .http
            .post(self.config.api("/auth/login"))
            .json(&json!({ "username": username, "password": password }))
            .send()
            .await?;
        Ok(response.status())
    }

    pub async fn logout(&self, token: &str) -> Result<StatusCode> {
        let response = self
            .http
            .post(self.config.api("/auth/logout"))
            .bearer_auth(token)
            .send()
            .await?;
        Ok(response.status())
    }

    pub async fn me(&self, token: &str) -> Result<reqwest::Response> {
        Ok(self
            .http
            .get(self.config.api("/auth/me"))
            .bearer_auth(token)
            .send()
            .await?)
    }

    pub async fn deposit(&self, token: &str, amount: &BigDecimal) -> Result<StatusCode> {
        let response = self
            .http
            .post(self.config.api("/balance/deposit"))
            .bearer_auth(token)
            .json(&json!({ "amount": amount }))
            .send()
            .await?;
        Ok(response.status())
    }

    pub async fn balance(&self, token: &str) -> Result<BalanceAccount> {
        let response = self
            .http
            .get(self.config.api("/balance"))
            .bearer_auth(token)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(eyre!("balance read failed with {}", response.status()));
        }
        Ok(response.json().await?)
    }

    /// Authenticated GET against an `/api/v1` path.
    pub async fn get_api(&self, token: &str, path: &str) -> Result<reqwest::Response> {
        Ok(self
            .http
            .get(self.config.api(path))
            .bearer_auth(token)
            .send()
            .await?)
    }

    /// Submit an order; returns (status, parsed order when 201).
    pub async fn create_order(
        &self,
        token: &str,
        request: &CreateOrderRequest,
    ) -> Result<(StatusCode, Option<Order>)> {
        let response = self
            .http
            .post(self.config.api("/orders"))
            .bearer_auth(token)
            .json(request)
            .send()
            .await?;
        let status = response.status();
        let order = if status == StatusCode::CREATED {
            Some(response.json().await?)
        } else {
            None
        };
        Ok((status, order))
    }
}
