//! Typed clients for the peer services the order commit depends on.

use std::time::Duration;

use bigdecimal::BigDecimal;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use tradeline_contracts::{
    codes, headers as hdr, Asset, InternalBalanceRequest, InternalBalanceResponse, Problem, TxKind,
};

/// Request/response timeout for service-to-service calls.
const CLIENT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("insufficient funds")]
    InsufficientFunds,
    #[error("user lock contended")]
    LockContention,
    #[error("subject not found")]
    SubjectNotFound,
    #[error("peer returned {status}: {detail}")]
    Api { status: u16, detail: String },
    #[error(transparent)]
    Transport(#[from] reqwest::Error),
}

/// Client for the user service's internal ledger endpoints.
pub struct BalanceClient {
    http: reqwest::Client,
    base_url: String,
    internal_token: String,
}

impl BalanceClient {
    pub fn new(base_url: &str, internal_token: &str) -> eyre::Result<Self> {
        Ok(Self {
            http: reqwest::Client::builder()
                .timeout(CLIENT_TIMEOUT)
                .build()?,
            base_url: base_url.trim_end_matches('/').to_string(),
            internal_token: internal_token.to_string(),
        })
    }

    /// Debit the subject's balance under the lock identified by `lock_owner`.
    pub async fn debit(
        &self,
        subject: &str,
        amount: &BigDecimal,
        linked_order_id: Uuid,
        lock_owner: &str,
    ) -> Result<Uuid, ClientError> {
        self.call(
            "debit",
            &InternalBalanceRequest {
                subject: subject.to_string(),
                amount: amount.clone(),
                kind: TxKind::OrderDebit,
                linked_order_id: Some(linked_order_id),
                lock_owner: Some(lock_owner.to_string()),
            },
        )
        .await
    }

    /// Credit the subject's balance under the lock identified by `lock_owner`.
    pub async fn credit(
        &self,
        subject: &str,
        amount: &BigDecimal,
        kind: TxKind,
        linked_order_id: Uuid,
        lock_owner: &str,
    ) -> Result<Uuid, ClientError> {
        self.call(
            "credit",
            &InternalBalanceRequest {
                subject: subject.to_string(),
                amount: amount.clone(),
                kind,
                linked_order_id: Some(linked_order_id),
                lock_owner: Some(lock_owner.to_string()),
            },
        )
        .await
    }

    async fn call(&self, op: &str, body: &InternalBalanceRequest) -> Result<Uuid, ClientError> {
        let url = format!("{}/internal/balance/{op}", self.base_url);
        debug!(%url, subject = %body.subject, "Calling balance ledger");

        let response = self
            .http
            .post(&url)
            .header(hdr::X_INTERNAL_TOKEN, &self.internal_token)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            let parsed: InternalBalanceResponse = response.json().await?;
            return Ok(parsed.transaction_id);
        }

        let problem: Option<Problem> = response.json().await.ok();
        let code = problem.as_ref().map(|p| p.code.as_str()).unwrap_or("");
        match (status.as_u16(), code) {
            (422, codes::INSUFFICIENT_FUNDS) => Err(ClientError::InsufficientFunds),
            (503, _) => Err(ClientError::LockContention),
            (404, _) => Err(ClientError::SubjectNotFound),
            (status, _) => Err(ClientError::Api {
                status,
                detail: problem.map(|p| p.detail).unwrap_or_default(),
            }),
        }
    }
}

/// Client for the inventory service's public catalog.
pub struct InventoryClient {
    http: reqwest::Client,
    base_url: String,
}

impl InventoryClient {
    pub fn new(base_url: &str) -> eyre::Result<Self> {
        Ok(Self {
            http: reqwest::Client::builder()
                .timeout(CLIENT_TIMEOUT)
                .build()?,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Look up an asset; `None` when the catalog does not know it.
    pub async fn get_asset(&self, asset_id: &str) -> Result<Option<Asset>, ClientError> {
        let url = format!("{}/assets/{asset_id}", self.base_url);
        let response = self.http.get(&url).send().await?;

        match response.status().as_u16() {
            200 => Ok(Some(response.json().await?)),
            404 => Ok(None),
            status => Err(ClientError::Api {
                status,
                detail: "inventory lookup failed".to_string(),
            }),
        }
    }
}
