//! HTTP surface of the inventory service. Every route is public read.

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use serde::Deserialize;
use serde_json::json;
use sqlx::PgPool;

use tradeline_contracts::{codes, Asset, Problem};

use crate::db;

/// Build the service router.
pub fn build_router(db: PgPool) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/assets", get(list_assets))
        .route("/assets/{id}", get(get_asset))
        .with_state(db)
}

async fn health_check() -> Json<serde_json::Value> {
    Json(json!({ "status": "healthy", "service": "tradeline-inventory-service" }))
}

#[derive(Debug, Deserialize)]
struct CatalogFilter {
    category: Option<String>,
}

async fn list_assets(
    State(db): State<PgPool>,
    Query(filter): Query<CatalogFilter>,
) -> Result<Json<Vec<Asset>>, Response> {
    db::list_assets(&db, filter.category.as_deref())
        .await
        .map(Json)
        .map_err(|_| internal_problem())
}

async fn get_asset(
    State(db): State<PgPool>,
    Path(id): Path<String>,
) -> Result<Json<Asset>, Response> {
    match db::get_asset(&db, &id).await {
        Ok(Some(asset)) => Ok(Json(asset)),
        Ok(None) => Err(problem_response(
            StatusCode::NOT_FOUND,
            Problem::new(404, codes::NOT_FOUND, "Not Found", "asset not found"),
        )),
        Err(_) => Err(internal_problem()),
    }
}

fn internal_problem() -> Response {
    problem_response(StatusCode::INTERNAL_SERVER_ERROR, Problem::internal())
}

fn problem_response(status: StatusCode, problem: Problem) -> Response {
    let mut response = (
        status,
        Json(serde_json::to_value(&problem).unwrap_or_default()),
    )
        .into_response();
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/problem+json"),
    );
    response
}
