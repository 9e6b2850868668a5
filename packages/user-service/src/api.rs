//! HTTP surface of the user service.
//!
//! Public paths are reached through the gateway, which strips `/api/v1` and
//! injects `X-User-Subject`/`X-User-Role` after verifying the bearer token.
//! The `/internal` group is service-to-service only and guarded by the
//! shared internal token header.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::json;
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use tradeline_contracts::{
    codes, headers as hdr, AuthResponse, BalanceAccount, BalanceTransaction, DepositRequest,
    InternalBalanceRequest, InternalBalanceResponse, LoginRequest, RegisterRequest, Role,
    TransactionReceipt, TxKind, UserProfile, ValidationIssue, WithdrawRequest,
};

use crate::config::Config;
use crate::db::{self, NewUser};
use crate::error::ServiceError;
use crate::ledger::Ledger;
use crate::tokens;

#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub ledger: Arc<Ledger>,
    pub config: Arc<Config>,
}

/// Build the service router.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/logout", post(logout))
        .route("/auth/me", get(me))
        .route("/balance", get(get_balance))
        .route("/balance/deposit", post(deposit))
        .route("/balance/withdraw", post(withdraw))
        .route("/balance/transactions", get(list_transactions))
        .route("/internal/balance/debit", post(internal_debit))
        .route("/internal/balance/credit", post(internal_credit))
        .with_state(state)
}

async fn health_check() -> Json<serde_json::Value> {
    Json(json!({ "status": "healthy", "service": "tradeline-user-service" }))
}

async fn register(
    State(state): State<AppState>,
    Json(body): Json<RegisterRequest>,
) -> Result<Response, ServiceError> {
    validate_registration(&body)?;

    let password_hash = hash_password(body.password.clone()).await?;
    let user = NewUser {
        subject: body.username.clone(),
        email: body.email.clone(),
        password_hash,
        role: Role::Customer.as_str().to_string(),
    };
    db::insert_user(&state.db, &user).await?;
    info!(subject = %user.subject, "User registered");

    let token = issue_token(&state, &user.subject, &user.role)?;
    let stored = db::find_user_by_username(&state.db, &user.subject)
        .await?
        .ok_or(ServiceError::NotFound("user"))?;

    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            token,
            user: stored.profile(),
        }),
    )
        .into_response())
}

async fn login(
    State(state): State<AppState>,
    Json(body): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, ServiceError> {
    let user = db::find_user_by_username(&state.db, &body.username).await?;

    // Hash comparison runs even for unknown users so response timing does
    // not reveal whether the username exists.
    let hash = user
        .as_ref()
        .map(|u| u.password_hash.clone())
        .unwrap_or_else(placeholder_hash);
    let valid = verify_password(body.password.clone(), hash).await?;

    match user {
        Some(user) if valid => {
            info!(subject = %user.subject, "Login succeeded");
            let token = issue_token(&state, &user.subject, &user.role)?;
            Ok(Json(AuthResponse {
                token,
                user: user.profile(),
            }))
        }
        _ => Err(ServiceError::Unauthorized(codes::AUTH_INVALID)),
    }
}

/// Token revocation happens at the gateway (denylist on 2xx); the service
/// only acknowledges.
async fn logout(headers: HeaderMap) -> Result<Json<serde_json::Value>, ServiceError> {
    let subject = subject_from_headers(&headers)?;
    info!(subject = %subject, "Logout");
    Ok(Json(json!({ "message": "logged out" })))
}

async fn me(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<UserProfile>, ServiceError> {
    let subject = subject_from_headers(&headers)?;
    let user = db::find_user_by_username(&state.db, &subject)
        .await?
        .ok_or(ServiceError::NotFound("user"))?;
    Ok(Json(user.profile()))
}

async fn get_balance(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<BalanceAccount>, ServiceError> {
    let subject = subject_from_headers(&headers)?;
    let account = db::get_account(&state.db, &subject)
        .await?
        .ok_or(ServiceError::NotFound("balance account"))?;
    Ok(Json(account))
}

async fn deposit(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<DepositRequest>,
) -> Result<Json<TransactionReceipt>, ServiceError> {
    let subject = subject_from_headers(&headers)?;
    let transaction_id = state
        .ledger
        .credit(&subject, &body.amount, TxKind::Deposit, None, None)
        .await?;
    receipt(&state.db, &subject, transaction_id).await
}

async fn withdraw(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<WithdrawRequest>,
) -> Result<Json<TransactionReceipt>, ServiceError> {
    let subject = subject_from_headers(&headers)?;
    let transaction_id = state
        .ledger
        .debit(&subject, &body.amount, TxKind::Withdraw, None, None)
        .await?;
    receipt(&state.db, &subject, transaction_id).await
}

async fn receipt(
    db: &PgPool,
    subject: &str,
    transaction_id: Uuid,
) -> Result<Json<TransactionReceipt>, ServiceError> {
    let account = db::get_account(db, subject)
        .await?
        .ok_or(ServiceError::NotFound("balance account"))?;
    Ok(Json(TransactionReceipt {
        transaction_id,
        current_amount: account.current_amount,
    }))
}

#[derive(Debug, Deserialize)]
struct Pagination {
    #[serde(default = "default_limit")]
    limit: i64,
    #[serde(default)]
    offset: i64,
}

fn default_limit() -> i64 {
    50
}

async fn list_transactions(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(page): Query<Pagination>,
) -> Result<Json<Vec<BalanceTransaction>>, ServiceError> {
    let subject = subject_from_headers(&headers)?;
    let limit = page.limit.clamp(1, 200);
    let offset = page.offset.max(0);
    let transactions = db::list_transactions(&state.db, &subject, limit, offset).await?;
    Ok(Json(transactions))
}

async fn internal_debit(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<InternalBalanceRequest>,
) -> Result<Json<InternalBalanceResponse>, ServiceError> {
    require_internal_token(&state, &headers)?;
    let transaction_id = state
        .ledger
        .debit(
            &body.subject,
            &body.amount,
            body.kind,
            body.linked_order_id,
            body.lock_owner.as_deref(),
        )
        .await?;
    Ok(Json(InternalBalanceResponse { transaction_id }))
}

async fn internal_credit(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<InternalBalanceRequest>,
) -> Result<Json<InternalBalanceResponse>, ServiceError> {
    require_internal_token(&state, &headers)?;
    let transaction_id = state
        .ledger
        .credit(
            &body.subject,
            &body.amount,
            body.kind,
            body.linked_order_id,
            body.lock_owner.as_deref(),
        )
        .await?;
    Ok(Json(InternalBalanceResponse { transaction_id }))
}

fn subject_from_headers(headers: &HeaderMap) -> Result<String, ServiceError> {
    headers
        .get(hdr::X_USER_SUBJECT)
        .and_then(|v| v.to_str().ok())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .ok_or(ServiceError::Unauthorized(codes::AUTH_MISSING))
}

fn require_internal_token(state: &AppState, headers: &HeaderMap) -> Result<(), ServiceError> {
    let presented = headers
        .get(hdr::X_INTERNAL_TOKEN)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if presented != state.config.auth.internal_token {
        return Err(ServiceError::Forbidden);
    }
    Ok(())
}

fn issue_token(state: &AppState, subject: &str, role: &str) -> Result<String, ServiceError> {
    tokens::issue(
        subject,
        role,
        &state.config.auth.jwt_secret,
        state.config.auth.token_ttl_secs,
    )
    .map_err(|e| ServiceError::Internal(e.to_string()))
}

async fn hash_password(password: String) -> Result<String, ServiceError> {
    tokio::task::spawn_blocking(move || bcrypt::hash(password, bcrypt::DEFAULT_COST))
        .await
        .map_err(|e| ServiceError::Internal(e.to_string()))?
        .map_err(|e| ServiceError::Internal(e.to_string()))
}

async fn verify_password(password: String, hash: String) -> Result<bool, ServiceError> {
    tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash))
        .await
        .map_err(|e| ServiceError::Internal(e.to_string()))?
        .map_err(|e| ServiceError::Internal(e.to_string()))
}

/// Constant bcrypt hash compared against when the username is unknown.
fn placeholder_hash() -> String {
    // bcrypt of an unguessable placeholder, cost 12
    "$2b$12$C6UzMDM.H6dfI/f/IKcEeO7la1wElRirWNZWjvBQ9HRmlbd61mO2K".to_string()
}

fn validate_registration(body: &RegisterRequest) -> Result<(), ServiceError> {
    let mut issues = Vec::new();

    let username_ok = body.username.len() >= 3
        && body.username.len() <= 32
        && body
            .username
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if !username_ok {
        issues.push(
            ValidationIssue::new(
                "username",
                "3-32 characters, alphanumeric plus '-' and '_'",
            )
            .with_value(json!(body.username)),
        );
    }

    if body.email.len() < 5 || body.email.len() > 255 || !body.email.contains('@') {
        issues.push(ValidationIssue::new("email", "must be a valid email address"));
    }

    if body.password.len() < 8 {
        issues.push(ValidationIssue::new("password", "must be at least 8 characters"));
    }

    if issues.is_empty() {
        Ok(())
    } else {
        Err(ServiceError::Validation(issues))
    }
}
