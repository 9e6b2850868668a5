//! HTTP surface of the order service.
//!
//! All paths are reached through the gateway, which enforces roles and
//! injects `X-User-Subject`/`X-User-Role`. The portfolio route's
//! owner-or-admin policy is enforced at the gateway; this service only
//! scopes data to the requested subject.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::json;
use sqlx::PgPool;
use uuid::Uuid;

use tradeline_contracts::{
    codes, headers as hdr, CreateOrderRequest, HoldingView, Order, Portfolio, Role,
};

use crate::commit::OrderCommitter;
use crate::db;
use crate::error::ServiceError;

#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub committer: Arc<OrderCommitter>,
}

/// Build the service router.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/orders", post(create_order).get(list_orders))
        .route("/orders/{id}", get(get_order))
        .route("/portfolio/{subject}", get(get_portfolio))
        .with_state(state)
}

async fn health_check() -> Json<serde_json::Value> {
    Json(json!({ "status": "healthy", "service": "tradeline-order-service" }))
}

async fn create_order(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<CreateOrderRequest>,
) -> Result<Response, ServiceError> {
    let subject = subject_from_headers(&headers)?;
    let order = state.committer.create_order(&subject, body).await?;
    Ok((StatusCode::CREATED, Json(order)).into_response())
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

async fn list_orders(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(page): Query<Pagination>,
) -> Result<Json<Vec<Order>>, ServiceError> {
    let subject = subject_from_headers(&headers)?;
    let limit = page.limit.clamp(1, 200);
    let offset = page.offset.max(0);
    let orders = db::list_orders(&state.db, &subject, limit, offset).await?;
    Ok(Json(orders))
}

async fn get_order(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<Order>, ServiceError> {
    let subject = subject_from_headers(&headers)?;
    let order = db::get_order(&state.db, id)
        .await?
        .ok_or(ServiceError::NotFound("order"))?;

    // Foreign orders read as absent rather than forbidden
    if order.subject != subject && role_from_headers(&headers) != Some(Role::Admin) {
        return Err(ServiceError::NotFound("order"));
    }
    Ok(Json(order))
}

async fn get_portfolio(
    State(state): State<AppState>,
    Path(subject): Path<String>,
) -> Result<Json<Portfolio>, ServiceError> {
    let holdings = db::list_holdings(&state.db, &subject)
        .await?
        .into_iter()
        .map(|h| HoldingView {
            asset_id: h.asset_id,
            quantity: h.quantity,
        })
        .collect();
    Ok(Json(Portfolio { subject, holdings }))
}

fn subject_from_headers(headers: &HeaderMap) -> Result<String, ServiceError> {
    headers
        .get(hdr::X_USER_SUBJECT)
        .and_then(|v| v.to_str().ok())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .ok_or(ServiceError::Unauthorized(codes::AUTH_MISSING))
}

fn role_from_headers(headers: &HeaderMap) -> Option<Role> {
    headers
        .get(hdr::X_USER_ROLE)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse().ok())
}
