//! HTTP server wiring: gateway-local routes plus the pipeline fallback.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::Request,
    http::header,
    middleware::{self, Next},
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use eyre::{eyre, Result};
use prometheus::{Encoder, TextEncoder};
use serde::Serialize;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::metrics;
use crate::pipeline::{self, Gateway};

/// Health check response
#[derive(Serialize)]
struct HealthResponse {
    status: String,
    service: String,
}

/// Health check endpoint handler
async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: "tradeline-gateway".to_string(),
    })
}

/// Liveness probe (always returns OK if server is running)
async fn liveness() -> &'static str {
    "OK"
}

/// Readiness probe
async fn readiness() -> &'static str {
    "OK"
}

/// Status response: uptime and per-downstream breaker states
#[derive(Serialize)]
struct StatusResponse {
    status: String,
    uptime_seconds: u64,
    breakers: std::collections::BTreeMap<String, &'static str>,
}

/// Operational status endpoint
async fn status(axum::extract::State(gateway): axum::extract::State<Arc<Gateway>>) -> Json<StatusResponse> {
    let breakers = gateway
        .breakers
        .states()
        .into_iter()
        .map(|(name, state)| (name, state.as_str()))
        .collect();
    Json(StatusResponse {
        status: "ok".to_string(),
        uptime_seconds: gateway.started_at.elapsed().as_secs(),
        breakers,
    })
}

/// Prometheus metrics endpoint
async fn prometheus_metrics() -> Response {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if encoder.encode(&metric_families, &mut buffer).is_err() {
        return (
            axum::http::StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to encode metrics",
        )
            .into_response();
    }

    match Response::builder()
        .header(header::CONTENT_TYPE, encoder.format_type())
        .body(axum::body::Body::from(buffer))
    {
        Ok(resp) => resp,
        Err(_) => (
            axum::http::StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to build metrics response",
        )
            .into_response(),
    }
}

/// Security headers on every response
async fn security_headers_middleware(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;

    let headers = response.headers_mut();
    headers.insert("x-content-type-options", "nosniff".parse().unwrap());
    headers.insert("x-frame-options", "DENY".parse().unwrap());
    headers.insert(
        "referrer-policy",
        "strict-origin-when-cross-origin".parse().unwrap(),
    );
    headers.insert(
        "strict-transport-security",
        "max-age=31536000; includeSubDomains".parse().unwrap(),
    );

    response
}

/// Build the gateway router. `/health`, probes, and `/metrics` are local;
/// everything else falls through to the proxy pipeline.
pub fn build_router(gateway: Arc<Gateway>) -> Router {
    // Browser frontends hit the API cross-origin; credentials travel in the
    // Authorization header, not cookies.
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([
            axum::http::Method::GET,
            axum::http::Method::POST,
            axum::http::Method::PUT,
            axum::http::Method::DELETE,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    Router::new()
        .route("/health", get(health_check))
        .route("/healthz", get(liveness))
        .route("/readyz", get(readiness))
        .route("/status", get(status))
        .route("/metrics", get(prometheus_metrics))
        .fallback(pipeline::handle)
        .layer(middleware::from_fn(security_headers_middleware))
        .layer(cors)
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(gateway)
}

/// Start the gateway server, serving until the shutdown channel fires.
pub async fn start_server(
    bind: &str,
    gateway: Arc<Gateway>,
    mut shutdown_rx: tokio::sync::mpsc::Receiver<()>,
) -> Result<()> {
    let addr: SocketAddr = bind
        .parse()
        .map_err(|e| eyre!("Invalid bind address {}: {}", bind, e))?;

    let app = build_router(gateway);

    info!("Gateway listening on {}", addr);
    info!("  /health  - Gateway health (JSON)");
    info!("  /metrics - Prometheus metrics");
    info!("  /api/v1  - Proxied platform routes");

    metrics::UP.set(1.0);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        let _ = shutdown_rx.recv().await;
    })
    .await?;

    Ok(())
}
